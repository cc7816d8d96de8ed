//! Authorization capability consumed by privileged operations
//!
//! The engine never talks to an identity provider directly; it asks this
//! single capability whether a principal holds organizer rights in a scope
//! and fails closed when the capability itself errors.

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
#[error("Authorization backend error: {0}")]
pub struct AuthError(pub String);

/// Answers "does principal X hold organizer rights in scope S?"
#[async_trait]
pub trait Authorization: Send + Sync {
    async fn is_organizer(&self, scope_id: &str, principal_id: &str)
        -> Result<bool, AuthError>;
}

/// Static in-process organizer table.
///
/// Suitable for deployments where organizer grants are configured up front,
/// and as a trivially controllable implementation in tests.
#[derive(Default)]
pub struct StaticOrganizers {
    grants: RwLock<HashSet<(String, String)>>,
}

impl StaticOrganizers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, scope_id: impl Into<String>, principal_id: impl Into<String>) {
        let mut grants = self.grants.write().await;
        grants.insert((scope_id.into(), principal_id.into()));
    }

    pub async fn revoke(&self, scope_id: &str, principal_id: &str) {
        let mut grants = self.grants.write().await;
        grants.remove(&(scope_id.to_string(), principal_id.to_string()));
    }
}

#[async_trait]
impl Authorization for StaticOrganizers {
    async fn is_organizer(
        &self,
        scope_id: &str,
        principal_id: &str,
    ) -> Result<bool, AuthError> {
        let grants = self.grants.read().await;
        Ok(grants.contains(&(scope_id.to_string(), principal_id.to_string())))
    }
}
