use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path::NodePath;

pub type NodeId = i64;
pub type LinkId = i64;
pub type TenantId = i64;

/// Link type reserved for node-to-node references
pub const RESOURCE_LINK: &str = "resource";

/// A stored resource plus the response-only `children` and `links` it may carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "installation")]
    pub tenant: TenantId,
    pub parent: Option<NodeId>,
    pub path: NodePath,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub meta: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<ResolvedLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub parent: NodeId,
    pub child: NodeId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub meta: Value,
}

/// A link joined with the node it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLink {
    #[serde(flatten)]
    pub link: Link,
    pub resource: Node,
}

/// Client input for create and save.
///
/// Unknown keys (including `parent`, `path` and `installation`) are dropped on
/// deserialization; `id` is only ever set internally when a cut re-creates a
/// subtree under its original identities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub labels: Option<BTreeSet<String>>,
    pub meta: Option<Value>,
    #[serde(default)]
    pub children: Vec<NodePayload>,
    #[serde(default)]
    pub links: Vec<LinkPayload>,
}

impl NodePayload {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            node_type: Some(node_type.into()),
            ..Default::default()
        }
    }

    pub fn with_child(mut self, child: NodePayload) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.get_or_insert_with(BTreeSet::new).insert(label.into());
        self
    }

    pub fn with_link(mut self, target: NodeId) -> Self {
        self.links.push(LinkPayload { id: target, meta: None });
        self
    }
}

/// Outbound link request; `id` is the link target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub id: NodeId,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub search: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
}

impl ResourceFilter {
    pub fn search(search: impl Into<String>) -> Self {
        Self { search: Some(search.into()), node_type: None }
    }

    pub fn of_type(node_type: impl Into<String>) -> Self {
        Self { search: None, node_type: Some(node_type.into()) }
    }

    /// In-process equivalent of the SQL filter, used by the memory backend
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            if !node.name.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        match self.node_type.as_deref().filter(|t| !t.is_empty()) {
            Some(node_type) => node.node_type == node_type,
            None => true,
        }
    }
}

/// How far to resolve links when returning nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDepth {
    #[default]
    None,
    Direct,
    Follow,
}

impl LinkDepth {
    /// Query-string flags are truthy when they start with `y` (`yes`, `y`)
    pub fn from_flag(flag: Option<&str>, depth: LinkDepth) -> LinkDepth {
        match flag {
            Some(v) if v.to_lowercase().starts_with('y') => depth,
            _ => LinkDepth::None,
        }
    }
}
