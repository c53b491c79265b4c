use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{FromRow, PgPool, Postgres};
use tracing::debug;

use crate::access::{AccessLevel, AccountId, TenantGate};
use crate::resource::path::NodePath;
use crate::resource::types::{Link, Node, NodeId, ResolvedLink, TenantId};

use super::manager::DatabaseError;
use super::queries::{self, SqlParam, SqlResult};
use super::store::{
    CommandRecord, Database, NewLink, NewNode, NodeChanges, NodeQuery, Store, Transaction,
};

#[derive(Debug, FromRow)]
struct NodeRow {
    id: i64,
    installation: i64,
    parent: Option<i64>,
    path: String,
    name: String,
    #[sqlx(rename = "type")]
    node_type: String,
    labels: Vec<String>,
    meta: Value,
}

impl NodeRow {
    fn into_node(self) -> Result<Node, DatabaseError> {
        let path = NodePath::parse(&self.path)
            .map_err(|e| DatabaseError::QueryError(format!("resource {}: {}", self.id, e)))?;
        Ok(Node {
            id: self.id,
            tenant: self.installation,
            parent: self.parent,
            path,
            name: self.name,
            node_type: self.node_type,
            labels: self.labels.into_iter().collect(),
            meta: self.meta,
            children: Vec::new(),
            links: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    id: i64,
    parent: i64,
    child: i64,
    #[sqlx(rename = "type")]
    kind: String,
    meta: Value,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link { id: row.id, parent: row.parent, child: row.child, kind: row.kind, meta: row.meta }
    }
}

#[derive(Debug, FromRow)]
struct LinkedNodeRow {
    #[sqlx(flatten)]
    node: NodeRow,
    link_id: i64,
    link_parent: i64,
    link_child: i64,
    link_type: String,
    link_meta: Value,
}

impl LinkedNodeRow {
    fn into_resolved(self) -> Result<ResolvedLink, DatabaseError> {
        Ok(ResolvedLink {
            link: Link {
                id: self.link_id,
                parent: self.link_parent,
                child: self.link_child,
                kind: self.link_type,
                meta: self.link_meta,
            },
            resource: self.node.into_node()?,
        })
    }
}

fn bind_query_as<'q, O>(
    mut q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, PgRow>,
{
    for param in params {
        q = match param {
            SqlParam::BigInt(v) => q.bind(*v),
            SqlParam::Text(v) => q.bind(v.clone()),
            SqlParam::TextArray(v) => q.bind(v.clone()),
            SqlParam::BigIntArray(v) => q.bind(v.clone()),
            SqlParam::Json(v) => q.bind(v.clone()),
        };
    }
    q
}

fn bind_query<'q>(
    mut q: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        q = match param {
            SqlParam::BigInt(v) => q.bind(*v),
            SqlParam::Text(v) => q.bind(v.clone()),
            SqlParam::TextArray(v) => q.bind(v.clone()),
            SqlParam::BigIntArray(v) => q.bind(v.clone()),
            SqlParam::Json(v) => q.bind(v.clone()),
        };
    }
    q
}

/// Postgres storage: one pooled connection per transaction
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

#[async_trait]
impl TenantGate for PgDatabase {
    async fn access_level(
        &self,
        account: AccountId,
        installation: TenantId,
    ) -> Result<Option<AccessLevel>, DatabaseError> {
        let sql = queries::select_access_level(account, installation);
        let row: Option<(String,)> = bind_query_as(sqlx::query_as(&sql.query), &sql.params)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((access,)) => access
                .parse::<AccessLevel>()
                .map(Some)
                .map_err(|e| DatabaseError::QueryError(e.to_string())),
            None => Ok(None),
        }
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTransaction {
    async fn fetch_nodes(&mut self, sql: SqlResult) -> Result<Vec<Node>, DatabaseError> {
        debug!(query = %sql.query, "select resources");
        let rows: Vec<NodeRow> = bind_query_as(sqlx::query_as(&sql.query), &sql.params)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn fetch_node(&mut self, sql: SqlResult) -> Result<Option<Node>, DatabaseError> {
        let row: Option<NodeRow> = bind_query_as(sqlx::query_as(&sql.query), &sql.params)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(NodeRow::into_node).transpose()
    }
}

#[async_trait]
impl Store for PgTransaction {
    async fn select_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(queries::select_node(id)).await
    }

    async fn select_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        self.fetch_nodes(queries::select_nodes(query)).await
    }

    async fn insert_node(&mut self, node: &NewNode) -> Result<Node, DatabaseError> {
        self.fetch_node(queries::insert_node(node))
            .await?
            .ok_or_else(|| DatabaseError::QueryError("insert returned no row".to_string()))
    }

    async fn update_node(
        &mut self,
        id: NodeId,
        changes: &NodeChanges,
    ) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(queries::update_node(id, changes)).await
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        self.fetch_node(queries::delete_node(id)).await
    }

    async fn select_links(
        &mut self,
        tenant: TenantId,
        parents: &[NodeId],
    ) -> Result<Vec<ResolvedLink>, DatabaseError> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let sql = queries::select_links(tenant, parents);
        let rows: Vec<LinkedNodeRow> = bind_query_as(sqlx::query_as(&sql.query), &sql.params)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(LinkedNodeRow::into_resolved).collect()
    }

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link, DatabaseError> {
        let sql = queries::insert_link(link);
        let row: LinkRow = bind_query_as(sqlx::query_as(&sql.query), &sql.params)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn delete_links(&mut self, parent: NodeId) -> Result<u64, DatabaseError> {
        let sql = queries::delete_links(parent);
        let result = bind_query(sqlx::query(&sql.query), &sql.params)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_command(&mut self, record: &CommandRecord) -> Result<(), DatabaseError> {
        let sql = queries::insert_command(record);
        bind_query(sqlx::query(&sql.query), &sql.params)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn store(&mut self) -> &mut dyn Store {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
