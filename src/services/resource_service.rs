use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::database::store::{Database, Store, Transaction};
use crate::events::{Event, EventError, EventSink};
use crate::resource::{
    paste, LinkDepth, Node, NodeId, NodePayload, PasteRequest, PasteResult, ResolvedLink,
    ResourceError, ResourceFilter, ResourceStore, TenantId,
};

/// Runs every resource operation in its own transaction and reports
/// mutations to the event sink before committing
#[derive(Clone)]
pub struct ResourceService {
    database: Arc<dyn Database>,
    events: Arc<dyn EventSink>,
}

impl ResourceService {
    pub fn new(database: Arc<dyn Database>, events: Arc<dyn EventSink>) -> Self {
        Self { database, events }
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, ResourceError> {
        self.database.begin().await.map_err(|e| {
            error!("Failed to open transaction: {}", e);
            ResourceError::from(e)
        })
    }

    /// Commits on success, rolls back on failure
    async fn finish<T>(
        tx: Box<dyn Transaction>,
        result: Result<T, ResourceError>,
    ) -> Result<T, ResourceError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                warn!("Rolling back: {}", e);
                if let Err(rollback) = tx.rollback().await {
                    error!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn get(&self, tenant: TenantId, id: NodeId, links: LinkDepth) -> Result<Node, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant).get(id, links).await;
        Self::finish(tx, result).await
    }

    pub async fn list(
        &self,
        tenant: TenantId,
        filter: ResourceFilter,
        links: LinkDepth,
    ) -> Result<Vec<Node>, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant).list(filter, links).await;
        Self::finish(tx, result).await
    }

    pub async fn children(
        &self,
        tenant: TenantId,
        parent: Option<NodeId>,
        filter: ResourceFilter,
        links: LinkDepth,
    ) -> Result<Vec<Node>, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant)
            .children(parent, filter, links)
            .await;
        Self::finish(tx, result).await
    }

    pub async fn descendants(
        &self,
        tenant: TenantId,
        root: Option<NodeId>,
        filter: ResourceFilter,
    ) -> Result<Vec<Node>, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant).descendants(root, filter).await;
        Self::finish(tx, result).await
    }

    pub async fn tree(&self, tenant: TenantId, root: Option<NodeId>) -> Result<Vec<Node>, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant).tree(root).await;
        Self::finish(tx, result).await
    }

    pub async fn links(
        &self,
        tenant: TenantId,
        id: NodeId,
        follow: bool,
    ) -> Result<Vec<ResolvedLink>, ResourceError> {
        let mut tx = self.begin().await?;
        let result = ResourceStore::new(tx.store(), tenant).links(id, follow).await;
        Self::finish(tx, result).await
    }

    pub async fn create(
        &self,
        tenant: TenantId,
        parent: Option<NodeId>,
        payload: NodePayload,
    ) -> Result<Node, ResourceError> {
        let mut tx = self.begin().await?;
        let query = json!({ "parent": parent, "data": &payload });
        let result = async {
            let node = ResourceStore::new(tx.store(), tenant).create(parent, payload).await?;
            self.emit(tx.store(), "resource.create", tenant, query, &node).await?;
            Ok::<_, ResourceError>(node)
        }
        .await;
        let node = Self::finish(tx, result).await?;
        info!(installation = tenant, id = node.id, "resource.create");
        Ok(node)
    }

    pub async fn save(
        &self,
        tenant: TenantId,
        id: NodeId,
        payload: NodePayload,
    ) -> Result<Node, ResourceError> {
        let mut tx = self.begin().await?;
        let query = json!({ "id": id, "data": &payload });
        let result = async {
            let node = ResourceStore::new(tx.store(), tenant).save(id, payload).await?;
            self.emit(tx.store(), "resource.save", tenant, query, &node).await?;
            Ok::<_, ResourceError>(node)
        }
        .await;
        let node = Self::finish(tx, result).await?;
        info!(installation = tenant, id, "resource.save");
        Ok(node)
    }

    pub async fn delete(&self, tenant: TenantId, id: NodeId) -> Result<Node, ResourceError> {
        let mut tx = self.begin().await?;
        let result = async {
            let node = ResourceStore::new(tx.store(), tenant).delete(id).await?;
            self.emit(tx.store(), "resource.delete", tenant, json!({ "id": id }), &node)
                .await?;
            Ok::<_, ResourceError>(node)
        }
        .await;
        let node = Self::finish(tx, result).await?;
        info!(installation = tenant, id, "resource.delete");
        Ok(node)
    }

    pub async fn paste(
        &self,
        tenant: TenantId,
        request: &PasteRequest,
    ) -> Result<PasteResult, ResourceError> {
        let mut tx = self.begin().await?;
        let result = paste(tx.store(), self.events.as_ref(), tenant, request).await;
        Self::finish(tx, result).await
    }

    async fn emit(
        &self,
        store: &mut dyn Store,
        channel: &str,
        tenant: TenantId,
        query: Value,
        result: &impl Serialize,
    ) -> Result<(), ResourceError> {
        let result = serde_json::to_value(result).map_err(EventError::from)?;
        let event = Event::command(channel, tenant, query, result);
        self.events.emit(store, &event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::events::EventBus;
    use crate::resource::PasteMode;
    use crate::testing::{folder, FailingSink};

    fn service(db: &MemoryDatabase) -> ResourceService {
        ResourceService::new(Arc::new(db.clone()), Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn commands_are_logged_and_committed() {
        let db = MemoryDatabase::new();
        let service = service(&db);

        let node = service.create(1, None, folder("a")).await.unwrap();
        service
            .save(1, node.id, NodePayload { name: Some("b".into()), ..Default::default() })
            .await
            .unwrap();
        service.delete(1, node.id).await.unwrap();

        let channels: Vec<String> = db.commands().await.into_iter().map(|c| c.channel).collect();
        assert_eq!(channels, vec!["resource.create", "resource.save", "resource.delete"]);
        assert_eq!(db.node_count().await, 0);
    }

    #[tokio::test]
    async fn failures_roll_back() {
        let db = MemoryDatabase::new();
        let service = service(&db);
        let a = service.create(1, None, folder("a")).await.unwrap();

        // link target missing: the node insert before it is undone
        let err = service
            .create(1, Some(a.id), folder("b").with_link(999))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(999)));
        assert_eq!(db.node_count().await, 1);
        assert_eq!(db.commands().await.len(), 1);
    }

    #[tokio::test]
    async fn audit_failure_rolls_back() {
        let db = MemoryDatabase::new();
        let failing = ResourceService::new(Arc::new(db.clone()), Arc::new(FailingSink));
        assert!(matches!(
            failing.create(1, None, folder("a")).await,
            Err(ResourceError::UpstreamAudit(_))
        ));
        assert_eq!(db.node_count().await, 0);

        let service = service(&db);
        let a = service.create(1, None, folder("a")).await.unwrap();
        let request = PasteRequest::new(PasteMode::Copy, vec![a.id], None);
        assert!(failing.paste(1, &request).await.is_err());
        assert_eq!(db.node_count().await, 1);

        let result = service.paste(1, &request).await.unwrap();
        assert_eq!(result.target_items.len(), 1);
        assert_eq!(service.tree(1, None).await.unwrap().len(), 2);
    }
}
