use sqlx::PgPool;
use tracing::info;

use super::manager::DatabaseError;

/// Idempotent DDL, applied in order inside one transaction.
///
/// Deleting a resource must remove its whole subtree and every link touching
/// it; the `ON DELETE CASCADE` foreign keys carry that, recursively through
/// `parent`.
pub const MIGRATIONS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS ltree",
    r#"CREATE TABLE IF NOT EXISTS resource (
        id BIGSERIAL PRIMARY KEY,
        installation BIGINT NOT NULL,
        parent BIGINT REFERENCES resource(id) ON DELETE CASCADE,
        path LTREE NOT NULL,
        name TEXT NOT NULL,
        "type" TEXT NOT NULL,
        labels TEXT[] NOT NULL DEFAULT '{}',
        meta JSONB NOT NULL DEFAULT '{}'
    )"#,
    "CREATE INDEX IF NOT EXISTS resource_installation_idx ON resource (installation)",
    "CREATE INDEX IF NOT EXISTS resource_parent_idx ON resource (parent)",
    "CREATE INDEX IF NOT EXISTS resource_path_idx ON resource USING GIST (path)",
    r#"CREATE TABLE IF NOT EXISTS resource_link (
        id BIGSERIAL PRIMARY KEY,
        parent BIGINT NOT NULL REFERENCES resource(id) ON DELETE CASCADE,
        child BIGINT NOT NULL REFERENCES resource(id) ON DELETE CASCADE,
        "type" TEXT NOT NULL DEFAULT 'resource',
        meta JSONB NOT NULL DEFAULT '{}'
    )"#,
    "CREATE INDEX IF NOT EXISTS resource_link_parent_idx ON resource_link (parent)",
    r#"CREATE TABLE IF NOT EXISTS command_log (
        id BIGSERIAL PRIMARY KEY,
        installation BIGINT NOT NULL,
        channel TEXT NOT NULL,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS installation_access (
        account BIGINT NOT NULL,
        installation BIGINT NOT NULL,
        access TEXT NOT NULL,
        PRIMARY KEY (account, installation)
    )"#,
];

pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
    let mut tx = pool.begin().await?;
    for statement in MIGRATIONS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    info!("Applied {} schema statements", MIGRATIONS.len());
    Ok(())
}
