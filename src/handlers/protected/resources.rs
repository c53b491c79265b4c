use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::access::InstallationAccess;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::resource::{
    LinkDepth, Node, NodeId, NodePayload, PasteMode, PasteRequest, PasteResult, ResolvedLink,
    ResourceError, ResourceFilter,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    /// `links=yes` attaches each node's direct links
    pub links: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> ResourceFilter {
        ResourceFilter {
            search: self.search.clone(),
            node_type: self.node_type.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceQuery {
    /// `links=yes` follows links transitively
    pub links: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinksQuery {
    pub follow: Option<String>,
}

/// `?copy=1,2` or `?cut=1,2`, or the long form `?mode=copy&ids=1,2`
#[derive(Debug, Default, Deserialize)]
pub struct PasteQuery {
    pub copy: Option<String>,
    pub cut: Option<String>,
    pub mode: Option<String>,
    pub ids: Option<String>,
}

impl PasteQuery {
    pub fn into_request(self, parent: Option<NodeId>) -> Result<PasteRequest, ResourceError> {
        let (mode, ids) = match (self.copy, self.cut, self.mode) {
            (Some(ids), None, None) => (PasteMode::Copy, ids),
            (None, Some(ids), None) => (PasteMode::Cut, ids),
            (None, None, Some(mode)) => (mode.parse()?, self.ids.unwrap_or_default()),
            (None, None, None) => {
                return Err(ResourceError::validation("no copy or cut ids passed"));
            }
            _ => {
                return Err(ResourceError::validation("pass exactly one of copy, cut or mode"));
            }
        };
        Ok(PasteRequest::new(mode, parse_ids(&ids)?, parent))
    }
}

fn parse_ids(raw: &str) -> Result<Vec<NodeId>, ResourceError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ResourceError::validation(format!("invalid resource id '{}'", s)))
        })
        .collect()
}

/// GET /api/v1/resources - Every resource of the installation, flat
pub async fn list(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Node>> {
    let links = LinkDepth::from_flag(query.links.as_deref(), LinkDepth::Direct);
    let nodes = state
        .resources
        .list(access.installation, query.filter(), links)
        .await?;
    Ok(ApiResponse::success(nodes))
}

/// GET /api/v1/resources/:id
pub async fn get(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<Node> {
    let links = LinkDepth::from_flag(query.links.as_deref(), LinkDepth::Follow);
    let node = state.resources.get(access.installation, id, links).await?;
    Ok(ApiResponse::success(node))
}

async fn children_of(
    state: AppState,
    access: InstallationAccess,
    parent: Option<NodeId>,
    query: ListQuery,
) -> ApiResult<Vec<Node>> {
    let links = LinkDepth::from_flag(query.links.as_deref(), LinkDepth::Direct);
    let nodes = state
        .resources
        .children(access.installation, parent, query.filter(), links)
        .await?;
    Ok(ApiResponse::success(nodes))
}

/// GET /api/v1/resources/children - Installation roots
pub async fn root_children(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Node>> {
    children_of(state, access, None, query).await
}

/// GET /api/v1/resources/children/:id
pub async fn children(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Node>> {
    children_of(state, access, Some(id), query).await
}

/// GET /api/v1/resources/descendants - Whole installation
pub async fn root_descendants(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Node>> {
    let nodes = state
        .resources
        .descendants(access.installation, None, query.filter())
        .await?;
    Ok(ApiResponse::success(nodes))
}

/// GET /api/v1/resources/descendants/:id
pub async fn descendants(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Node>> {
    let nodes = state
        .resources
        .descendants(access.installation, Some(id), query.filter())
        .await?;
    Ok(ApiResponse::success(nodes))
}

/// GET /api/v1/resources/tree - Installation forest
pub async fn root_tree(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
) -> ApiResult<Vec<Node>> {
    let forest = state.resources.tree(access.installation, None).await?;
    Ok(ApiResponse::success(forest))
}

/// GET /api/v1/resources/tree/:id
pub async fn tree(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
) -> ApiResult<Vec<Node>> {
    let forest = state.resources.tree(access.installation, Some(id)).await?;
    Ok(ApiResponse::success(forest))
}

/// GET /api/v1/resources/links/:id
pub async fn links(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
    Query(query): Query<LinksQuery>,
) -> ApiResult<Vec<ResolvedLink>> {
    let follow = LinkDepth::from_flag(query.follow.as_deref(), LinkDepth::Follow) == LinkDepth::Follow;
    let links = state.resources.links(access.installation, id, follow).await?;
    Ok(ApiResponse::success(links))
}

/// POST /api/v1/resources - Create at the installation root
pub async fn create_root(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<Node> {
    let node = state.resources.create(access.installation, None, payload).await?;
    Ok(ApiResponse::created(node))
}

/// POST /api/v1/resources/:id - Create under an existing resource
pub async fn create(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(parent): Path<NodeId>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<Node> {
    let node = state
        .resources
        .create(access.installation, Some(parent), payload)
        .await?;
    Ok(ApiResponse::created(node))
}

/// PUT /api/v1/resources/:id
pub async fn save(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
    Json(payload): Json<NodePayload>,
) -> ApiResult<Node> {
    let node = state.resources.save(access.installation, id, payload).await?;
    Ok(ApiResponse::success(node))
}

/// DELETE /api/v1/resources/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(id): Path<NodeId>,
) -> ApiResult<Node> {
    let node = state.resources.delete(access.installation, id).await?;
    Ok(ApiResponse::success(node))
}

/// POST /api/v1/resources/paste - Paste at the installation root
pub async fn paste_root(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Query(query): Query<PasteQuery>,
) -> ApiResult<PasteResult> {
    let request = query.into_request(None)?;
    let result = state.resources.paste(access.installation, &request).await?;
    Ok(ApiResponse::created(result))
}

/// POST /api/v1/resources/paste/:id
pub async fn paste(
    State(state): State<AppState>,
    Extension(access): Extension<InstallationAccess>,
    Path(parent): Path<NodeId>,
    Query(query): Query<PasteQuery>,
) -> ApiResult<PasteResult> {
    let request = query.into_request(Some(parent))?;
    let result = state.resources.paste(access.installation, &request).await?;
    Ok(ApiResponse::created(result))
}
