use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resource::path::NodePath;
use crate::resource::types::{
    Link, NodeId, Node, ResolvedLink, ResourceFilter, TenantId, RESOURCE_LINK,
};

use super::manager::DatabaseError;

/// Which slice of a tenant's nodes a select covers
#[derive(Debug, Clone, PartialEq)]
pub enum NodeScope {
    /// Every node of the tenant
    Tenant,
    /// Direct children of a node, or tenant roots for `None`
    Children(Option<NodeId>),
    /// Nodes whose path starts with the given prefix
    Descendants(NodePath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeQuery {
    pub tenant: TenantId,
    pub scope: NodeScope,
    pub filter: ResourceFilter,
}

impl NodeQuery {
    pub fn new(tenant: TenantId, scope: NodeScope) -> Self {
        Self { tenant, scope, filter: ResourceFilter::default() }
    }

    pub fn filter(mut self, filter: ResourceFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Row to insert; `id` is only set when a cut re-creates a node
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub id: Option<NodeId>,
    pub tenant: TenantId,
    pub parent: Option<NodeId>,
    pub path: NodePath,
    pub name: String,
    pub node_type: String,
    pub labels: Vec<String>,
    pub meta: Value,
}

/// Mutable columns; `None` leaves the stored value unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeChanges {
    pub name: Option<String>,
    pub node_type: Option<String>,
    pub labels: Option<Vec<String>>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub parent: NodeId,
    pub child: NodeId,
    pub kind: String,
    pub meta: Value,
}

impl NewLink {
    pub fn resource(parent: NodeId, child: NodeId, meta: Value) -> Self {
        Self { parent, child, kind: RESOURCE_LINK.to_string(), meta }
    }
}

/// One audited command as written to the command log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub installation: TenantId,
    pub channel: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Row-level operations, always executed inside a transaction
#[async_trait]
pub trait Store: Send {
    async fn select_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError>;

    async fn select_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError>;

    async fn insert_node(&mut self, node: &NewNode) -> Result<Node, DatabaseError>;

    async fn update_node(
        &mut self,
        id: NodeId,
        changes: &NodeChanges,
    ) -> Result<Option<Node>, DatabaseError>;

    /// Removes the node, its descendants and every link touching them
    async fn delete_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError>;

    /// `resource` links whose parent is in `parents` and whose child belongs to `tenant`
    async fn select_links(
        &mut self,
        tenant: TenantId,
        parents: &[NodeId],
    ) -> Result<Vec<ResolvedLink>, DatabaseError>;

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link, DatabaseError>;

    async fn delete_links(&mut self, parent: NodeId) -> Result<u64, DatabaseError>;

    async fn insert_command(&mut self, record: &CommandRecord) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait Transaction: Store {
    fn store(&mut self) -> &mut dyn Store;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError>;
}
