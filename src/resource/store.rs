use std::cmp::Reverse;
use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::access::ensure_owned;
use crate::database::store::{NewLink, NewNode, NodeChanges, NodeQuery, NodeScope, Store};

use super::error::ResourceError;
use super::path::{child_path, descendant_prefix, NodePath, ParentRef};
use super::types::{
    LinkDepth, LinkPayload, Node, NodeId, NodePayload, ResolvedLink, ResourceFilter, TenantId,
};

/// Tenant-scoped resource operations over one open transaction.
///
/// Every id passed in is checked against the tenant before it is read,
/// written or used as a parent or link target.
pub struct ResourceStore<'a> {
    pub(super) store: &'a mut dyn Store,
    pub(super) tenant: TenantId,
}

impl<'a> ResourceStore<'a> {
    pub fn new(store: &'a mut dyn Store, tenant: TenantId) -> Self {
        Self { store, tenant }
    }

    /// Loads a node of this tenant or fails with `NotFound` / `TenantMismatch`
    pub async fn require(&mut self, id: NodeId) -> Result<Node, ResourceError> {
        let node = self
            .store
            .select_node(id)
            .await?
            .ok_or(ResourceError::NotFound(id))?;
        ensure_owned(&node, self.tenant)?;
        Ok(node)
    }

    pub async fn get(&mut self, id: NodeId, links: LinkDepth) -> Result<Node, ResourceError> {
        let node = self.require(id).await?;
        let mut nodes = [node];
        self.attach_links(&mut nodes, links).await?;
        let [node] = nodes;
        Ok(node)
    }

    pub async fn list(
        &mut self,
        filter: ResourceFilter,
        links: LinkDepth,
    ) -> Result<Vec<Node>, ResourceError> {
        let query = NodeQuery::new(self.tenant, NodeScope::Tenant).filter(filter);
        let mut nodes = self.store.select_nodes(&query).await?;
        self.attach_links(&mut nodes, links).await?;
        Ok(nodes)
    }

    /// Direct children of `parent`, or the tenant's roots
    pub async fn children(
        &mut self,
        parent: Option<NodeId>,
        filter: ResourceFilter,
        links: LinkDepth,
    ) -> Result<Vec<Node>, ResourceError> {
        if let Some(id) = parent {
            self.require(id).await?;
        }
        let query = NodeQuery::new(self.tenant, NodeScope::Children(parent)).filter(filter);
        let mut nodes = self.store.select_nodes(&query).await?;
        self.attach_links(&mut nodes, links).await?;
        Ok(nodes)
    }

    /// Every node strictly below `root`, or the whole tenant, flat
    pub async fn descendants(
        &mut self,
        root: Option<NodeId>,
        filter: ResourceFilter,
    ) -> Result<Vec<Node>, ResourceError> {
        let scope = match root {
            Some(id) => {
                let root = self.require(id).await?;
                NodeScope::Descendants(descendant_prefix(root.id, &root.path))
            }
            None => NodeScope::Tenant,
        };
        let query = NodeQuery::new(self.tenant, scope).filter(filter);
        Ok(self.store.select_nodes(&query).await?)
    }

    /// Descendants of `root` nested into a forest; the top level holds
    /// `root`'s children (or the tenant roots)
    pub async fn tree(&mut self, root: Option<NodeId>) -> Result<Vec<Node>, ResourceError> {
        let nodes = self.descendants(root, ResourceFilter::default()).await?;
        Ok(build_forest(nodes))
    }

    /// Inserts `payload` and its nested children under `parent`.
    ///
    /// The whole payload is validated before the first write. Children
    /// receive paths derived from their freshly inserted parents.
    pub async fn create(
        &mut self,
        parent: Option<NodeId>,
        payload: NodePayload,
    ) -> Result<Node, ResourceError> {
        validate_tree(&payload)?;

        let anchor = match parent {
            Some(id) => Some(self.require(id).await?),
            None => None,
        };

        let mut slots: Vec<Option<Node>> = Vec::new();
        let mut placement: Vec<(NodeId, NodePath)> = Vec::new();
        let mut children: Vec<Vec<usize>> = Vec::new();
        let mut pending: Vec<(NodePayload, Option<usize>)> = vec![(payload, None)];

        while let Some((mut item, above)) = pending.pop() {
            let parent_ref = match above {
                Some(index) => {
                    let (id, path) = &placement[index];
                    ParentRef::Node { id: *id, path }
                }
                None => match &anchor {
                    Some(node) => ParentRef::Node { id: node.id, path: &node.path },
                    None => ParentRef::Root,
                },
            };
            let new_node = NewNode {
                id: item.id,
                tenant: self.tenant,
                parent: parent_ref.id(),
                path: child_path(parent_ref),
                name: required(&item.name, "name")?.to_string(),
                node_type: required(&item.node_type, "type")?.to_string(),
                labels: item.labels.take().unwrap_or_default().into_iter().collect(),
                meta: item.meta.take().unwrap_or_else(|| json!({})),
            };

            let mut node = self.store.insert_node(&new_node).await?;
            debug!(id = node.id, path = %node.path, "inserted resource");
            node.links = self.insert_links(node.id, std::mem::take(&mut item.links)).await?;

            let index = slots.len();
            placement.push((node.id, node.path.clone()));
            slots.push(Some(node));
            children.push(Vec::new());
            if let Some(above) = above {
                children[above].push(index);
            }
            for child in item.children.into_iter().rev() {
                pending.push((child, Some(index)));
            }
        }

        // children always sit at a higher index than their parent
        let order: Vec<usize> = (0..slots.len()).rev().collect();
        nest(&mut slots, &children, order);
        slots
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| ResourceError::constraint("create inserted no resource"))
    }

    /// Updates the mutable fields present in `payload` and replaces the
    /// node's outbound links with `payload.links`
    pub async fn save(&mut self, id: NodeId, payload: NodePayload) -> Result<Node, ResourceError> {
        self.require(id).await?;
        let name = optional(&payload.name, "name")?;
        let node_type = optional(&payload.node_type, "type")?;

        self.store.delete_links(id).await?;
        let links = self.insert_links(id, payload.links).await?;

        let changes = NodeChanges {
            name,
            node_type,
            labels: payload.labels.map(|labels| labels.into_iter().collect()),
            meta: payload.meta,
        };
        let mut node = self
            .store
            .update_node(id, &changes)
            .await?
            .ok_or(ResourceError::NotFound(id))?;
        node.links = links;
        Ok(node)
    }

    /// Removes the node and its subtree, returning the removed node
    pub async fn delete(&mut self, id: NodeId) -> Result<Node, ResourceError> {
        self.require(id).await?;
        self.store
            .delete_node(id)
            .await?
            .ok_or(ResourceError::NotFound(id))
    }

    async fn insert_links(
        &mut self,
        parent: NodeId,
        links: Vec<LinkPayload>,
    ) -> Result<Vec<ResolvedLink>, ResourceError> {
        let mut inserted = Vec::with_capacity(links.len());
        for request in links {
            let target = self.require(request.id).await?;
            let meta = request.meta.unwrap_or_else(|| json!({}));
            let link = self
                .store
                .insert_link(&NewLink::resource(parent, target.id, meta))
                .await?;
            inserted.push(ResolvedLink { link, resource: target });
        }
        Ok(inserted)
    }
}

fn required<'p>(value: &'p Option<String>, field: &str) -> Result<&'p str, ResourceError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ResourceError::validation(format!("resource {} is required", field))),
    }
}

/// Trimmed value of a field that may be left out, but not blanked
fn optional(value: &Option<String>, field: &str) -> Result<Option<String>, ResourceError> {
    match value {
        Some(_) => required(value, field).map(|v| Some(v.to_string())),
        None => Ok(None),
    }
}

fn validate_tree(payload: &NodePayload) -> Result<(), ResourceError> {
    let mut pending = vec![payload];
    while let Some(item) = pending.pop() {
        required(&item.name, "name")?;
        required(&item.node_type, "type")?;
        pending.extend(item.children.iter());
    }
    Ok(())
}

/// Moves every node into its parent's `children`, visiting `order` so that
/// a node is complete before it is moved.
pub(super) fn nest(slots: &mut [Option<Node>], children: &[Vec<usize>], order: Vec<usize>) {
    for index in order {
        let kids: Vec<Node> = children[index]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        if let Some(node) = slots[index].as_mut() {
            node.children = kids;
        }
    }
}

/// Nests a flat, sorted node list by `parent`. Nodes whose parent is not in
/// the list become roots; sibling order follows the input order.
pub fn build_forest(nodes: Vec<Node>) -> Vec<Node> {
    let index: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match node.parent.and_then(|p| index.get(&p)) {
            Some(&parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by_key(|&i| Reverse(nodes[i].path.depth()));

    let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
    nest(&mut slots, &children, order);
    roots.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::database::store::Database;
    use crate::testing::{folder, names};
    use serde_json::json;

    #[tokio::test]
    async fn create_nested_assigns_paths() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);

        let created = store
            .create(
                None,
                folder("a").with_child(folder("b").with_child(folder("c"))).with_child(folder("d")),
            )
            .await
            .unwrap();

        assert_eq!(created.path, NodePath::root());
        assert_eq!(names(&created.children), vec!["b", "d"]);
        let b = &created.children[0];
        assert_eq!(b.parent, Some(created.id));
        assert_eq!(b.path.to_string(), format!("root.{}", created.id));
        let c = &b.children[0];
        assert_eq!(c.path.ids(), &[created.id, b.id]);
        assert_eq!(c.parent, Some(b.id));
    }

    #[tokio::test]
    async fn create_validates_before_writing() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);

        let mut broken = folder("child");
        broken.name = Some("   ".into());
        let err = store.create(None, folder("a").with_child(broken)).await.unwrap_err();
        assert!(matches!(err, ResourceError::Validation(_)));
        assert!(store.list(ResourceFilter::default(), LinkDepth::None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_under_missing_or_foreign_parent_fails() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let foreign = ResourceStore::new(tx.store(), 2).create(None, folder("x")).await.unwrap();

        let mut store = ResourceStore::new(tx.store(), 1);
        assert!(matches!(
            store.create(Some(404), folder("a")).await,
            Err(ResourceError::NotFound(404))
        ));
        assert!(matches!(
            store.create(Some(foreign.id), folder("a")).await,
            Err(ResourceError::TenantMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn create_with_links_resolves_targets() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let foreign = ResourceStore::new(tx.store(), 2).create(None, folder("x")).await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let target = store.create(None, folder("target")).await.unwrap();

        let created = store
            .create(None, folder("source").with_link(target.id))
            .await
            .unwrap();
        assert_eq!(created.links.len(), 1);
        assert_eq!(created.links[0].resource.id, target.id);
        assert_eq!(created.links[0].link.meta, json!({}));

        assert!(matches!(
            store.create(None, folder("bad").with_link(foreign.id)).await,
            Err(ResourceError::TenantMismatch { .. })
        ));
        assert!(matches!(
            store.create(None, folder("bad").with_link(999)).await,
            Err(ResourceError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn save_updates_fields_and_replaces_links() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let one = store.create(None, folder("one")).await.unwrap();
        let two = store.create(None, folder("two")).await.unwrap();
        let node = store
            .create(None, folder("node").with_meta(json!({"k": 1})).with_link(one.id))
            .await
            .unwrap();

        let payload = NodePayload {
            name: Some("renamed".into()),
            ..Default::default()
        }
        .with_link(two.id);
        let saved = store.save(node.id, payload).await.unwrap();

        assert_eq!(saved.name, "renamed");
        assert_eq!(saved.node_type, "folder");
        assert_eq!(saved.meta, json!({"k": 1}));
        assert_eq!(saved.path, node.path);
        assert_eq!(saved.links.len(), 1);
        assert_eq!(saved.links[0].resource.id, two.id);

        // an absent link list clears the links
        let cleared = store.save(node.id, NodePayload::default()).await.unwrap();
        assert!(cleared.links.is_empty());
        let reloaded = store.get(node.id, LinkDepth::Direct).await.unwrap();
        assert!(reloaded.links.is_empty());
    }

    #[tokio::test]
    async fn save_rejects_blank_name() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let node = store.create(None, folder("node")).await.unwrap();

        let payload = NodePayload { name: Some("".into()), ..Default::default() };
        assert!(matches!(
            store.save(node.id, payload).await,
            Err(ResourceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn save_trims_like_create() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let node = store.create(None, NodePayload::new("  padded  ", " folder ")).await.unwrap();
        assert_eq!(node.name, "padded");
        assert_eq!(node.node_type, "folder");

        let payload = NodePayload::new("  renamed  ", "  document ");
        let saved = store.save(node.id, payload).await.unwrap();
        assert_eq!(saved.name, "renamed");
        assert_eq!(saved.node_type, "document");
    }

    #[tokio::test]
    async fn tree_keeps_types_labels_and_meta() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let a = store
            .create(
                None,
                folder("a").with_child(
                    NodePayload::new("doc", "document")
                        .with_label("draft")
                        .with_label("shared")
                        .with_meta(json!({"pages": 3})),
                ),
            )
            .await
            .unwrap();

        let forest = store.tree(None).await.unwrap();
        let doc = &forest[0].children[0];
        assert_eq!(forest[0].id, a.id);
        assert_eq!(doc.name, "doc");
        assert_eq!(doc.node_type, "document");
        assert_eq!(doc.labels.iter().map(String::as_str).collect::<Vec<_>>(), vec!["draft", "shared"]);
        assert_eq!(doc.meta, json!({"pages": 3}));
        assert_eq!(forest[0].meta, json!({}));
    }

    #[tokio::test]
    async fn list_attaches_links_on_request() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let target = store.create(None, folder("target")).await.unwrap();
        store.create(None, folder("source").with_link(target.id)).await.unwrap();

        let bare = store.list(ResourceFilter::default(), LinkDepth::None).await.unwrap();
        assert!(bare.iter().all(|n| n.links.is_empty()));

        let linked = store.list(ResourceFilter::default(), LinkDepth::Direct).await.unwrap();
        let source = linked.iter().find(|n| n.name == "source").unwrap();
        assert_eq!(source.links.len(), 1);
        assert_eq!(source.links[0].resource.id, target.id);
    }

    #[tokio::test]
    async fn children_descendants_and_tree() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let a = store
            .create(
                None,
                folder("a")
                    .with_child(folder("b").with_child(folder("c")))
                    .with_child(NodePayload::new("d", "document")),
            )
            .await
            .unwrap();
        store.create(None, folder("z")).await.unwrap();

        let roots = store
            .children(None, ResourceFilter::default(), LinkDepth::None)
            .await
            .unwrap();
        assert_eq!(names(&roots), vec!["a", "z"]);

        let kids = store
            .children(Some(a.id), ResourceFilter::default(), LinkDepth::None)
            .await
            .unwrap();
        assert_eq!(names(&kids), vec!["b", "d"]);

        let below = store.descendants(Some(a.id), ResourceFilter::default()).await.unwrap();
        assert_eq!(names(&below), vec!["b", "c", "d"]);
        let documents = store
            .descendants(Some(a.id), ResourceFilter::of_type("document"))
            .await
            .unwrap();
        assert_eq!(names(&documents), vec!["d"]);

        let tree = store.tree(Some(a.id)).await.unwrap();
        assert_eq!(names(&tree), vec!["b", "d"]);
        assert_eq!(names(&tree[0].children), vec!["c"]);

        let forest = store.tree(None).await.unwrap();
        assert_eq!(names(&forest), vec!["a", "z"]);
        assert_eq!(names(&forest[0].children[0].children), vec!["c"]);
    }

    #[tokio::test]
    async fn delete_removes_subtree() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let a = store.create(None, folder("a").with_child(folder("b"))).await.unwrap();
        let b = a.children[0].id;

        let removed = store.delete(a.id).await.unwrap();
        assert_eq!(removed.id, a.id);
        assert!(removed.children.is_empty());
        assert!(matches!(store.get(b, LinkDepth::None).await, Err(ResourceError::NotFound(_))));
        assert!(matches!(store.delete(a.id).await, Err(ResourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let foreign = ResourceStore::new(tx.store(), 2).create(None, folder("x")).await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);

        assert!(matches!(
            store.get(foreign.id, LinkDepth::None).await,
            Err(ResourceError::TenantMismatch { .. })
        ));
        assert!(store.list(ResourceFilter::default(), LinkDepth::None).await.unwrap().is_empty());
        assert!(matches!(
            store.tree(Some(foreign.id)).await,
            Err(ResourceError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn forest_keeps_orphans_as_roots() {
        let mk = |id: NodeId, parent: Option<NodeId>, path: Vec<NodeId>| Node {
            id,
            tenant: 1,
            parent,
            path: NodePath::from_ids(path),
            name: format!("n{}", id),
            node_type: "folder".into(),
            labels: Default::default(),
            meta: json!({}),
            children: vec![],
            links: vec![],
        };
        let forest = build_forest(vec![
            mk(2, Some(1), vec![1]),
            mk(3, Some(2), vec![1, 2]),
            mk(4, Some(1), vec![1]),
        ]);
        assert_eq!(forest.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(forest[0].children[0].id, 3);
    }
}
