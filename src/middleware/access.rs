use axum::{
    extract::{Query, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::access::{AccessLevel, AccountId};
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::resource::TenantId;

/// Installation id as accepted on the query string
#[derive(Debug, Default, Deserialize)]
pub struct InstallationQuery {
    pub installation: Option<String>,
    pub i: Option<String>,
    pub installationid: Option<String>,
}

impl InstallationQuery {
    pub fn installation(&self) -> Option<TenantId> {
        [&self.installation, &self.i, &self.installationid]
            .into_iter()
            .flatten()
            .find_map(|v| v.trim().parse().ok())
    }
}

/// Reads access are enough for GET, everything else needs editor
fn required_level(method: &Method) -> AccessLevel {
    if *method == Method::GET || *method == Method::HEAD {
        AccessLevel::Viewer
    } else {
        AccessLevel::Editor
    }
}

/// Middleware that resolves the requesting account's access to the
/// installation named on the query string and injects the
/// [`InstallationAccess`](crate::access::InstallationAccess) on success
pub async fn installation_access_middleware(
    State(state): State<AppState>,
    Query(query): Query<InstallationQuery>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account = request
        .headers()
        .get(state.account_header.as_str())
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<AccountId>().ok());

    let required = required_level(request.method());
    let access = state
        .access
        .authorize(account, query.installation(), required)
        .await?;

    request.extensions_mut().insert(access);
    Ok(next.run(request).await)
}
