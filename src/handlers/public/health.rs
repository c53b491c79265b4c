use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::handlers::AppState;

/// GET / - Service description
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Resource Tree API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health (public)",
                "resources": "/api/v1/resources[/:id] (installation access)",
                "children": "/api/v1/resources/children[/:id]",
                "descendants": "/api/v1/resources/descendants[/:id]",
                "tree": "/api/v1/resources/tree[/:id]",
                "links": "/api/v1/resources/links/:id",
                "paste": "/api/v1/resources/paste[/:id]?copy=ids|cut=ids",
            }
        }
    }))
}

/// GET /health - Opens and rolls back a storage transaction
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let checked = match state.database.begin().await {
        Ok(tx) => tx.rollback().await,
        Err(e) => Err(e),
    };

    if let Err(e) = checked {
        tracing::error!("Health check failed: {}", e);
        return Err(ApiError::service_unavailable(format!("database unavailable: {}", e)));
    }

    Ok(Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "database": "ok"
        }
    })))
}
