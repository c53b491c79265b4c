//! Materialized paths.
//!
//! A node's path lists the ids of its ancestors, outermost first. Storage and
//! the wire use the `ltree` label form: `root` for a tree root, `root.10.11`
//! for a node whose parent is 11 and grandparent is 10.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::types::NodeId;

const ROOT_LABEL: &str = "root";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path must start with 'root': {0}")]
    MissingRoot(String),

    #[error("invalid path label '{label}' in {path}")]
    InvalidLabel { path: String, label: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<NodeId>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_ids(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a child placed under the node `parent_id` whose own path is `self`
    pub fn child(&self, parent_id: NodeId) -> NodePath {
        let mut ids = self.0.clone();
        ids.push(parent_id);
        NodePath(ids)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn to_ltree(&self) -> String {
        let mut out = String::from(ROOT_LABEL);
        for id in &self.0 {
            out.push('.');
            out.push_str(&id.to_string());
        }
        out
    }

    pub fn parse(value: &str) -> Result<Self, PathError> {
        let mut labels = value.split('.');
        if labels.next() != Some(ROOT_LABEL) {
            return Err(PathError::MissingRoot(value.to_string()));
        }
        labels
            .map(|label| {
                label.parse::<NodeId>().map_err(|_| PathError::InvalidLabel {
                    path: value.to_string(),
                    label: label.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(NodePath)
    }
}

/// Position a new node will be inserted under: a stored node, or the tenant root
#[derive(Debug, Clone, Copy)]
pub enum ParentRef<'a> {
    Root,
    Node { id: NodeId, path: &'a NodePath },
}

impl ParentRef<'_> {
    pub fn id(&self) -> Option<NodeId> {
        match self {
            ParentRef::Root => None,
            ParentRef::Node { id, .. } => Some(*id),
        }
    }
}

pub fn child_path(parent: ParentRef<'_>) -> NodePath {
    match parent {
        ParentRef::Root => NodePath::root(),
        ParentRef::Node { id, path } => path.child(id),
    }
}

pub fn is_descendant(candidate: &NodePath, ancestor_id: NodeId) -> bool {
    candidate.contains(ancestor_id)
}

/// Every descendant of the node `(id, path)` has a path starting with this prefix
pub fn descendant_prefix(id: NodeId, path: &NodePath) -> NodePath {
    path.child(id)
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ltree())
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodePath::parse(s)
    }
}

impl Serialize for NodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_ltree())
    }
}

impl<'de> Deserialize<'de> for NodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NodePath::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_parent_gives_empty_path() {
        let path = child_path(ParentRef::Root);
        assert!(path.is_root());
        assert_eq!(path.to_ltree(), "root");
    }

    #[test]
    fn child_path_appends_parent_id() {
        let grandparent = NodePath::root().child(10);
        let path = child_path(ParentRef::Node { id: 11, path: &grandparent });
        assert_eq!(path.ids(), &[10, 11]);
        assert_eq!(path.to_ltree(), "root.10.11");
    }

    #[test]
    fn parses_ltree_form() {
        assert_eq!(NodePath::parse("root").unwrap(), NodePath::root());
        assert_eq!(NodePath::parse("root.4.9").unwrap().ids(), &[4, 9]);
        assert!(matches!(NodePath::parse("4.9"), Err(PathError::MissingRoot(_))));
        assert!(matches!(NodePath::parse("root.x"), Err(PathError::InvalidLabel { .. })));
        assert!(matches!(NodePath::parse(""), Err(PathError::MissingRoot(_))));
    }

    #[test]
    fn descendant_checks() {
        let path = NodePath::from_ids(vec![1, 5, 8]);
        assert!(is_descendant(&path, 5));
        assert!(!is_descendant(&path, 2));

        let prefix = descendant_prefix(5, &NodePath::from_ids(vec![1]));
        assert!(path.starts_with(&prefix));
        assert!(!NodePath::from_ids(vec![1, 6]).starts_with(&prefix));
    }

    #[test]
    fn serializes_as_string() {
        let path = NodePath::from_ids(vec![3]);
        assert_eq!(serde_json::to_value(&path).unwrap(), serde_json::json!("root.3"));
        let back: NodePath = serde_json::from_value(serde_json::json!("root.3")).unwrap();
        assert_eq!(back, path);
    }
}
