use thiserror::Error;

use crate::database::DatabaseError;
use crate::events::EventError;

use super::types::{NodeId, TenantId};

/// Failures surfaced by the resource store, link resolver and paste engine
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource {0} not found")]
    NotFound(NodeId),

    #[error("Resource {id} belongs to installation {actual}, not {expected}")]
    TenantMismatch {
        id: NodeId,
        expected: TenantId,
        actual: TenantId,
    },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction aborted: {0}")]
    Transaction(DatabaseError),

    #[error("Audit failed: {0}")]
    UpstreamAudit(#[from] EventError),
}

impl ResourceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ResourceError::Validation(message.into())
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        ResourceError::Constraint(message.into())
    }
}

impl From<DatabaseError> for ResourceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Constraint(msg) => ResourceError::Constraint(msg),
            other => ResourceError::Transaction(other),
        }
    }
}
