use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

use super::memory::MemoryDatabase;
use super::postgres::PgDatabase;
use super::schema;
use super::store::Database;
use crate::access::TenantGate;

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        // 23503 foreign_key_violation, 23505 unique_violation
        let code = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|c| c.into_owned());
        match code.as_deref() {
            Some("23503") | Some("23505") => DatabaseError::Constraint(err.to_string()),
            _ => DatabaseError::Sqlx(err),
        }
    }
}

/// Storage handles shared by the service layer and the access middleware
#[derive(Clone)]
pub struct Backend {
    pub database: Arc<dyn Database>,
    pub gate: Arc<dyn TenantGate>,
}

/// Builds the configured storage backend
pub struct DatabaseManager;

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Backend, DatabaseError> {
        match config.backend {
            DatabaseBackend::Memory => {
                info!("Using in-memory resource storage");
                let db = Arc::new(MemoryDatabase::new());
                Ok(Backend { database: db.clone(), gate: db })
            }
            DatabaseBackend::Postgres => {
                let url = Self::validated_url(config.url.as_deref())?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(config.connection_timeout))
                    .connect(&url)
                    .await?;
                info!("Created database pool ({} connections max)", config.max_connections);

                if config.run_migrations {
                    schema::migrate(&pool).await?;
                }

                let db = Arc::new(PgDatabase::new(pool));
                Ok(Backend { database: db.clone(), gate: db })
            }
        }
    }

    /// Connects straight to Postgres and applies the schema
    pub async fn migrate(config: &DatabaseConfig) -> Result<(), DatabaseError> {
        let url = Self::validated_url(config.url.as_deref())?;
        let pool = PgPoolOptions::new().max_connections(1).connect(&url).await?;
        schema::migrate(&pool).await?;
        pool.close().await;
        Ok(())
    }

    fn validated_url(url: Option<&str>) -> Result<String, DatabaseError> {
        let raw = url.ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let parsed = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(parsed.into()),
            _ => Err(DatabaseError::InvalidDatabaseUrl),
        }
    }
}
