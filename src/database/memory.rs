use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::access::{AccessLevel, AccountId, TenantGate};
use crate::resource::types::{Link, LinkId, Node, NodeId, ResolvedLink, TenantId, RESOURCE_LINK};

use super::manager::DatabaseError;
use super::store::{
    CommandRecord, Database, NewLink, NewNode, NodeChanges, NodeQuery, NodeScope, Store,
    Transaction,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    commands: Vec<CommandRecord>,
    access: HashMap<(AccountId, TenantId), AccessLevel>,
    last_node_id: NodeId,
    last_link_id: LinkId,
}

/// In-process storage with the same contract as Postgres.
///
/// Transactions are serialized: `begin` holds the state lock until the
/// transaction commits or is dropped, and works on a copy that replaces the
/// shared state only on commit.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, account: AccountId, installation: TenantId, level: AccessLevel) {
        self.state.lock().await.access.insert((account, installation), level);
    }

    pub async fn commands(&self) -> Vec<CommandRecord> {
        self.state.lock().await.commands.clone()
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

#[async_trait]
impl TenantGate for MemoryDatabase {
    async fn access_level(
        &self,
        account: AccountId,
        installation: TenantId,
    ) -> Result<Option<AccessLevel>, DatabaseError> {
        Ok(self.state.lock().await.access.get(&(account, installation)).copied())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn sorted(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    nodes
}

#[async_trait]
impl Store for MemoryTransaction {
    async fn select_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        Ok(self.working.nodes.get(&id).cloned())
    }

    async fn select_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        let nodes = self
            .working
            .nodes
            .values()
            .filter(|n| n.tenant == query.tenant)
            .filter(|n| match &query.scope {
                NodeScope::Tenant => true,
                NodeScope::Children(parent) => n.parent == *parent,
                NodeScope::Descendants(prefix) => n.path.starts_with(prefix),
            })
            .filter(|n| query.filter.matches(n))
            .cloned()
            .collect();
        Ok(sorted(nodes))
    }

    async fn insert_node(&mut self, node: &NewNode) -> Result<Node, DatabaseError> {
        if let Some(parent) = node.parent {
            if !self.working.nodes.contains_key(&parent) {
                return Err(DatabaseError::Constraint(format!(
                    "resource parent {} does not exist",
                    parent
                )));
            }
        }
        let id = match node.id {
            Some(id) if self.working.nodes.contains_key(&id) => {
                return Err(DatabaseError::Constraint(format!("resource {} already exists", id)));
            }
            Some(id) => id,
            None => self.working.last_node_id + 1,
        };
        self.working.last_node_id = self.working.last_node_id.max(id);

        let stored = Node {
            id,
            tenant: node.tenant,
            parent: node.parent,
            path: node.path.clone(),
            name: node.name.clone(),
            node_type: node.node_type.clone(),
            labels: node.labels.iter().cloned().collect(),
            meta: node.meta.clone(),
            children: Vec::new(),
            links: Vec::new(),
        };
        self.working.nodes.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_node(
        &mut self,
        id: NodeId,
        changes: &NodeChanges,
    ) -> Result<Option<Node>, DatabaseError> {
        let Some(node) = self.working.nodes.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            node.name = name.clone();
        }
        if let Some(node_type) = &changes.node_type {
            node.node_type = node_type.clone();
        }
        if let Some(labels) = &changes.labels {
            node.labels = labels.iter().cloned().collect();
        }
        if let Some(meta) = &changes.meta {
            node.meta = meta.clone();
        }
        Ok(Some(node.clone()))
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        let Some(node) = self.working.nodes.remove(&id) else {
            return Ok(None);
        };
        let mut removed: HashSet<NodeId> = self
            .working
            .nodes
            .values()
            .filter(|n| n.path.contains(id))
            .map(|n| n.id)
            .collect();
        self.working.nodes.retain(|node_id, _| !removed.contains(node_id));
        removed.insert(id);
        self.working
            .links
            .retain(|_, l| !removed.contains(&l.parent) && !removed.contains(&l.child));
        Ok(Some(node))
    }

    async fn select_links(
        &mut self,
        tenant: TenantId,
        parents: &[NodeId],
    ) -> Result<Vec<ResolvedLink>, DatabaseError> {
        let mut rows: Vec<ResolvedLink> = self
            .working
            .links
            .values()
            .filter(|l| l.kind == RESOURCE_LINK && parents.contains(&l.parent))
            .filter_map(|l| {
                let child = self.working.nodes.get(&l.child)?;
                (child.tenant == tenant).then(|| ResolvedLink { link: l.clone(), resource: child.clone() })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.resource.name.cmp(&b.resource.name).then(a.link.id.cmp(&b.link.id))
        });
        Ok(rows)
    }

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link, DatabaseError> {
        for endpoint in [link.parent, link.child] {
            if !self.working.nodes.contains_key(&endpoint) {
                return Err(DatabaseError::Constraint(format!(
                    "link endpoint {} does not exist",
                    endpoint
                )));
            }
        }
        self.working.last_link_id += 1;
        let stored = Link {
            id: self.working.last_link_id,
            parent: link.parent,
            child: link.child,
            kind: link.kind.clone(),
            meta: link.meta.clone(),
        };
        self.working.links.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_links(&mut self, parent: NodeId) -> Result<u64, DatabaseError> {
        let before = self.working.links.len();
        self.working.links.retain(|_, l| l.parent != parent);
        Ok((before - self.working.links.len()) as u64)
    }

    async fn insert_command(&mut self, record: &CommandRecord) -> Result<(), DatabaseError> {
        self.working.commands.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn store(&mut self) -> &mut dyn Store {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::path::NodePath;
    use serde_json::json;

    fn new_node(tenant: TenantId, parent: Option<&Node>, name: &str) -> NewNode {
        NewNode {
            id: None,
            tenant,
            parent: parent.map(|p| p.id),
            path: parent.map(|p| p.path.child(p.id)).unwrap_or_default(),
            name: name.to_string(),
            node_type: "folder".to_string(),
            labels: vec![],
            meta: json!({}),
        }
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        tx.insert_node(&new_node(1, None, "a")).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(db.node_count().await, 0);

        let mut tx = db.begin().await.unwrap();
        tx.insert_node(&new_node(1, None, "a")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.node_count().await, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let db = MemoryDatabase::new();
        {
            let mut tx = db.begin().await.unwrap();
            tx.insert_node(&new_node(1, None, "a")).await.unwrap();
        }
        assert_eq!(db.node_count().await, 0);
    }

    #[tokio::test]
    async fn delete_cascades_to_subtree_and_links() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let root = tx.insert_node(&new_node(1, None, "root")).await.unwrap();
        let child = tx.insert_node(&new_node(1, Some(&root), "child")).await.unwrap();
        let grandchild = tx.insert_node(&new_node(1, Some(&child), "grandchild")).await.unwrap();
        let other = tx.insert_node(&new_node(1, None, "other")).await.unwrap();
        tx.insert_link(&NewLink::resource(other.id, grandchild.id, json!({}))).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let deleted = tx.delete_node(root.id).await.unwrap().unwrap();
        assert_eq!(deleted.id, root.id);
        assert!(tx.select_node(grandchild.id).await.unwrap().is_none());
        assert!(tx.select_node(other.id).await.unwrap().is_some());
        tx.commit().await.unwrap();

        assert_eq!(db.node_count().await, 1);
        assert_eq!(db.link_count().await, 0);
    }

    #[tokio::test]
    async fn insert_enforces_parent_and_unique_ids() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();

        let mut orphan = new_node(1, None, "orphan");
        orphan.parent = Some(99);
        orphan.path = NodePath::from_ids(vec![99]);
        assert!(matches!(tx.insert_node(&orphan).await, Err(DatabaseError::Constraint(_))));

        let mut fixed = new_node(1, None, "fixed");
        fixed.id = Some(10);
        tx.insert_node(&fixed).await.unwrap();
        assert!(matches!(tx.insert_node(&fixed).await, Err(DatabaseError::Constraint(_))));

        // generated ids continue past explicitly assigned ones
        let next = tx.insert_node(&new_node(1, None, "next")).await.unwrap();
        assert_eq!(next.id, 11);
    }
}
