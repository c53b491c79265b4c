// handlers/mod.rs - Route tiers and the application router
//
// Public (no access check) → Protected (installation access required)

pub mod protected;
pub mod public;

use std::sync::Arc;

use axum::{
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::access::AccessScoper;
use crate::config::AccessConfig;
use crate::database::{Backend, Database};
use crate::events::EventSink;
use crate::middleware::{installation_access_middleware, tracer_middleware};
use crate::services::ResourceService;

/// Shared handles every route can reach
#[derive(Clone)]
pub struct AppState {
    pub resources: ResourceService,
    pub access: AccessScoper,
    pub database: Arc<dyn Database>,
    pub account_header: String,
}

impl AppState {
    pub fn new(backend: Backend, events: Arc<dyn EventSink>, access: &AccessConfig) -> Self {
        Self {
            resources: ResourceService::new(backend.database.clone(), events),
            access: AccessScoper::new(backend.gate, access.system_installation),
            database: backend.database,
            account_header: access.account_header.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Installation scoped
        .nest("/api/v1", resource_routes(state.clone()))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(tracer_middleware))
        .with_state(state)
}

fn resource_routes(state: AppState) -> Router<AppState> {
    use protected::resources;

    Router::new()
        // Collection and root-level views
        .route("/resources", get(resources::list).post(resources::create_root))
        .route("/resources/children", get(resources::root_children))
        .route("/resources/children/:id", get(resources::children))
        .route("/resources/descendants", get(resources::root_descendants))
        .route("/resources/descendants/:id", get(resources::descendants))
        .route("/resources/tree", get(resources::root_tree))
        .route("/resources/tree/:id", get(resources::tree))
        .route("/resources/links/:id", get(resources::links))
        // Subtree transfer
        .route("/resources/paste", post(resources::paste_root))
        .route("/resources/paste/:id", post(resources::paste))
        // Single resource
        .route(
            "/resources/:id",
            get(resources::get)
                .post(resources::create)
                .put(resources::save)
                .delete(resources::delete),
        )
        .route_layer(from_fn_with_state(state, installation_access_middleware))
}
