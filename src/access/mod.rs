//! Installation access control.
//!
//! Two checks gate every resource operation: the requesting account must hold
//! a sufficient access level on the installation, and every entity id touched
//! must belong to that installation. The first is answered by a [`TenantGate`]
//! before any resource work starts; the second is enforced by the resource
//! store itself through [`ensure_owned`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::database::DatabaseError;
use crate::resource::types::{Node, TenantId};
use crate::resource::ResourceError;

pub type AccountId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Viewer,
    Editor,
    Owner,
}

impl FromStr for AccessLevel {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(AccessLevel::Viewer),
            "editor" => Ok(AccessLevel::Editor),
            "owner" => Ok(AccessLevel::Owner),
            other => Err(AccessError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessLevel::Viewer => "viewer",
            AccessLevel::Editor => "editor",
            AccessLevel::Owner => "owner",
        })
    }
}

pub fn can_access(required: AccessLevel, actual: Option<AccessLevel>) -> bool {
    actual.is_some_and(|level| level >= required)
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("user required")]
    NoUser,

    #[error("{0} required")]
    MissingParam(&'static str),

    #[error("insufficient access level")]
    Insufficient,

    #[error("unknown access level: {0}")]
    UnknownLevel(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Resolves an account's access level on an installation
#[async_trait]
pub trait TenantGate: Send + Sync {
    async fn access_level(
        &self,
        account: AccountId,
        installation: TenantId,
    ) -> Result<Option<AccessLevel>, DatabaseError>;
}

/// Outcome of a successful installation check, handed to the route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationAccess {
    pub account: AccountId,
    pub installation: TenantId,
    pub level: AccessLevel,
}

#[derive(Clone)]
pub struct AccessScoper {
    gate: Arc<dyn TenantGate>,
    system_installation: Option<TenantId>,
}

impl AccessScoper {
    pub fn new(gate: Arc<dyn TenantGate>, system_installation: Option<TenantId>) -> Self {
        Self { gate, system_installation }
    }

    pub async fn authorize(
        &self,
        account: Option<AccountId>,
        installation: Option<TenantId>,
        required: AccessLevel,
    ) -> Result<InstallationAccess, AccessError> {
        let account = account.ok_or(AccessError::NoUser)?;
        let installation = installation.ok_or(AccessError::MissingParam("installation id"))?;

        let mut level = self.gate.access_level(account, installation).await?;

        // the system installation is readable by everyone
        if level.is_none() && self.system_installation == Some(installation) {
            level = Some(AccessLevel::Viewer);
        }

        if !can_access(required, level) {
            debug!(account, installation, %required, "installation access denied");
            return Err(AccessError::Insufficient);
        }

        Ok(InstallationAccess {
            account,
            installation,
            level: level.unwrap_or(required),
        })
    }
}

/// Fails unless `node` lives in `tenant`
pub fn ensure_owned(node: &Node, tenant: TenantId) -> Result<(), ResourceError> {
    if node.tenant != tenant {
        return Err(ResourceError::TenantMismatch {
            id: node.id,
            expected: tenant,
            actual: node.tenant,
        });
    }
    Ok(())
}
