use std::collections::{HashMap, HashSet};

use super::error::ResourceError;
use super::store::ResourceStore;
use super::types::{LinkDepth, Node, NodeId, ResolvedLink};

impl ResourceStore<'_> {
    /// Outbound links of `ids`, one level deep
    pub async fn direct_links(&mut self, ids: &[NodeId]) -> Result<Vec<ResolvedLink>, ResourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.select_links(self.tenant, ids).await?)
    }

    /// Outbound links of `ids`, with each target carrying its own links in
    /// turn. A node reached twice is expanded once; cycles terminate.
    pub async fn follow_links(&mut self, ids: &[NodeId]) -> Result<Vec<ResolvedLink>, ResourceError> {
        let mut visited: HashSet<NodeId> = ids.iter().copied().collect();
        let mut frontier: Vec<NodeId> = ids.to_vec();
        let mut levels: Vec<Vec<ResolvedLink>> = Vec::new();

        while !frontier.is_empty() {
            let found = self.direct_links(&frontier).await?;
            frontier = found
                .iter()
                .map(|l| l.resource.id)
                .filter(|id| visited.insert(*id))
                .collect();
            levels.push(found);
        }

        // assemble from the deepest level up so every target is complete
        // before it is attached to the level above
        let mut expanded: HashMap<NodeId, Vec<ResolvedLink>> = HashMap::new();
        let mut top = Vec::new();
        while let Some(level) = levels.pop() {
            let mut by_parent: HashMap<NodeId, Vec<ResolvedLink>> = HashMap::new();
            for mut link in level {
                if let Some(nested) = expanded.get(&link.resource.id) {
                    link.resource.links = nested.clone();
                }
                by_parent.entry(link.link.parent).or_default().push(link);
            }
            if levels.is_empty() {
                top = ids
                    .iter()
                    .flat_map(|id| by_parent.remove(id).unwrap_or_default())
                    .collect();
            } else {
                expanded = by_parent;
            }
        }
        Ok(top)
    }

    /// Fills `links` on every node according to `depth`
    pub async fn attach_links(&mut self, nodes: &mut [Node], depth: LinkDepth) -> Result<(), ResourceError> {
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let links = match depth {
            LinkDepth::None => return Ok(()),
            LinkDepth::Direct => self.direct_links(&ids).await?,
            LinkDepth::Follow => self.follow_links(&ids).await?,
        };
        let mut by_parent: HashMap<NodeId, Vec<ResolvedLink>> = HashMap::new();
        for link in links {
            by_parent.entry(link.link.parent).or_default().push(link);
        }
        for node in nodes.iter_mut() {
            node.links = by_parent.remove(&node.id).unwrap_or_default();
        }
        Ok(())
    }

    /// Outbound links of one node of this tenant
    pub async fn links(&mut self, id: NodeId, follow: bool) -> Result<Vec<ResolvedLink>, ResourceError> {
        self.require(id).await?;
        if follow {
            self.follow_links(&[id]).await
        } else {
            self.direct_links(&[id]).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::database::store::Database;
    use crate::resource::types::NodePayload;
    use crate::testing::folder;

    #[tokio::test]
    async fn direct_links_are_one_level() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let c = store.create(None, folder("c")).await.unwrap();
        let b = store.create(None, folder("b").with_link(c.id)).await.unwrap();
        let a = store.create(None, folder("a").with_link(b.id)).await.unwrap();

        let links = store.links(a.id, false).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].resource.id, b.id);
        assert!(links[0].resource.links.is_empty());
    }

    #[tokio::test]
    async fn follow_links_nests_targets() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let c = store.create(None, folder("c")).await.unwrap();
        let b = store.create(None, folder("b").with_link(c.id)).await.unwrap();
        let a = store.create(None, folder("a").with_link(b.id).with_link(c.id)).await.unwrap();

        let links = store.links(a.id, true).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].resource.id, b.id);
        assert_eq!(links[0].resource.links.len(), 1);
        assert_eq!(links[0].resource.links[0].resource.id, c.id);
        assert_eq!(links[1].resource.id, c.id);
    }

    #[tokio::test]
    async fn follow_links_terminates_on_cycles() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let a = store.create(None, folder("a")).await.unwrap();
        let b = store.create(None, folder("b").with_link(a.id)).await.unwrap();
        store
            .save(a.id, NodePayload::default().with_link(b.id))
            .await
            .unwrap();

        let node = store.get(a.id, LinkDepth::Follow).await.unwrap();
        assert_eq!(node.links.len(), 1);
        assert_eq!(node.links[0].resource.id, b.id);
        // b points back at a, which is not expanded again
        let back = &node.links[0].resource.links;
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].resource.id, a.id);
        assert!(back[0].resource.links.is_empty());
    }

    #[tokio::test]
    async fn attach_links_groups_by_node() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let target = store.create(None, folder("target")).await.unwrap();
        let parent = store
            .create(None, folder("p").with_child(folder("x").with_link(target.id)).with_child(folder("y")))
            .await
            .unwrap();

        let kids = store
            .children(Some(parent.id), Default::default(), LinkDepth::Direct)
            .await
            .unwrap();
        assert_eq!(kids[0].links.len(), 1);
        assert!(kids[1].links.is_empty());
    }

    #[tokio::test]
    async fn foreign_link_targets_are_hidden() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let mut store = ResourceStore::new(tx.store(), 1);
        let a = store.create(None, folder("a")).await.unwrap();
        assert!(store.direct_links(&[]).await.unwrap().is_empty());
        assert!(store.links(a.id, true).await.unwrap().is_empty());

        let mut other = ResourceStore::new(tx.store(), 2);
        assert!(matches!(
            other.links(a.id, false).await,
            Err(ResourceError::TenantMismatch { .. })
        ));
    }
}
