use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use resource_tree_api::access::AccessLevel;
use resource_tree_api::config::AccessConfig;
use resource_tree_api::database::{Backend, MemoryDatabase};
use resource_tree_api::events::EventBus;
use resource_tree_api::{router, AppState};

pub const EDITOR: i64 = 1;
pub const VIEWER: i64 = 2;
pub const INSTALLATION: i64 = 10;
pub const OTHER_INSTALLATION: i64 = 20;

/// Router over a fresh in-memory backend with a few grants
pub struct TestApp {
    pub db: MemoryDatabase,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = MemoryDatabase::new();
        db.grant(EDITOR, INSTALLATION, AccessLevel::Editor).await;
        db.grant(EDITOR, OTHER_INSTALLATION, AccessLevel::Owner).await;
        db.grant(VIEWER, INSTALLATION, AccessLevel::Viewer).await;

        let backend = Backend {
            database: Arc::new(db.clone()),
            gate: Arc::new(db.clone()),
        };
        let access = AccessConfig {
            account_header: "x-account-id".to_string(),
            system_installation: None,
        };
        let state = AppState::new(backend, Arc::new(EventBus::default()), &access);

        Self { db, router: router(state) }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        account: Option<i64>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(account) = account {
            builder = builder.header("x-account-id", account.to_string());
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value)?)
            }
            None => Body::empty(),
        };
        self.send(builder.body(body)?).await
    }

    /// Request as the editor on the default installation
    pub async fn editor(&self, method: Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        self.call(method, &scoped(path, INSTALLATION), Some(EDITOR), body).await
    }
}

/// Appends the installation parameter to `path`
pub fn scoped(path: &str, installation: i64) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("/api/v1{}{}installation={}", path, sep, installation)
}

pub fn id_of(value: &Value) -> i64 {
    value["id"].as_i64().unwrap_or_default()
}
