//! Fixtures shared by the unit tests

use async_trait::async_trait;
use serde_json::json;

use crate::database::store::{
    CommandRecord, NewLink, NewNode, NodeChanges, NodeQuery, Store,
};
use crate::database::DatabaseError;
use crate::events::{Event, EventError, EventSink};
use crate::resource::path::NodePath;
use crate::resource::types::{Link, Node, NodeId, NodePayload, ResolvedLink, TenantId};

pub fn folder(name: &str) -> NodePayload {
    NodePayload::new(name, "folder")
}

pub fn names(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.name.as_str()).collect()
}

/// Detached root node of tenant 1
pub fn node(id: NodeId, name: &str) -> Node {
    Node {
        id,
        tenant: 1,
        parent: None,
        path: NodePath::root(),
        name: name.to_string(),
        node_type: "folder".to_string(),
        labels: Default::default(),
        meta: json!({}),
        children: vec![],
        links: vec![],
    }
}

/// Sink that rejects every event
pub struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn emit(&self, _store: &mut dyn Store, event: &Event) -> Result<(), EventError> {
        Err(EventError::Handler {
            channel: event.channel.clone(),
            message: "audit unavailable".to_string(),
        })
    }
}

/// Store wrapper whose inserts start failing after `inserts` successes
pub struct FlakyStore<'a> {
    inner: &'a mut dyn Store,
    inserts: usize,
}

impl<'a> FlakyStore<'a> {
    pub fn new(inner: &'a mut dyn Store, inserts: usize) -> Self {
        Self { inner, inserts }
    }
}

#[async_trait]
impl Store for FlakyStore<'_> {
    async fn select_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        self.inner.select_node(id).await
    }

    async fn select_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        self.inner.select_nodes(query).await
    }

    async fn insert_node(&mut self, node: &NewNode) -> Result<Node, DatabaseError> {
        if self.inserts == 0 {
            return Err(DatabaseError::QueryError("connection reset".to_string()));
        }
        self.inserts -= 1;
        self.inner.insert_node(node).await
    }

    async fn update_node(
        &mut self,
        id: NodeId,
        changes: &NodeChanges,
    ) -> Result<Option<Node>, DatabaseError> {
        self.inner.update_node(id, changes).await
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        self.inner.delete_node(id).await
    }

    async fn select_links(
        &mut self,
        tenant: TenantId,
        parents: &[NodeId],
    ) -> Result<Vec<ResolvedLink>, DatabaseError> {
        self.inner.select_links(tenant, parents).await
    }

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link, DatabaseError> {
        self.inner.insert_link(link).await
    }

    async fn delete_links(&mut self, parent: NodeId) -> Result<u64, DatabaseError> {
        self.inner.delete_links(parent).await
    }

    async fn insert_command(&mut self, record: &CommandRecord) -> Result<(), DatabaseError> {
        self.inner.insert_command(record).await
    }
}
