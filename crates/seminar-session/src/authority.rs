//! Role authority: the external identity collaborator.
//!
//! The platform's account system owns credentials and roles; this layer
//! only consumes them. [`RoleAuthority`] is the single seam: given a
//! credential it yields who the caller is, or `None` when the credential
//! doesn't resolve. The gateway and the live handler both authenticate
//! through it.

use std::collections::HashMap;

use async_trait::async_trait;

use seminar_protocol::{Role, UserId};

use crate::ServiceError;

/// A resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
    pub name: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role, name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
            name: name.into(),
            email: None,
        }
    }
}

/// Resolves a credential to an [`Identity`].
///
/// `Ok(None)` means the credential is simply not recognized; `Err` means
/// the authority itself failed (and callers may fall back to a
/// gateway-verified identity where the contract allows one).
#[async_trait]
pub trait RoleAuthority: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Option<Identity>, ServiceError>;
}

/// Fixed token-table authority for development and tests.
#[derive(Debug, Default)]
pub struct StaticAuthority {
    tokens: HashMap<String, Identity>,
}

impl StaticAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential, builder style.
    pub fn with_token(mut self, credential: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(credential.into(), identity);
        self
    }
}

#[async_trait]
impl RoleAuthority for StaticAuthority {
    async fn resolve(&self, credential: &str) -> Result<Option<Identity>, ServiceError> {
        Ok(self.tokens.get(credential).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_authority_resolves_known_token() {
        let authority = StaticAuthority::new()
            .with_token("tok-1", Identity::new("u1", Role::Instructor, "Grace"));

        let identity = authority.resolve("tok-1").await.unwrap().unwrap();

        assert_eq!(identity.user_id, UserId::new("u1"));
        assert_eq!(identity.role, Role::Instructor);
    }

    #[tokio::test]
    async fn test_static_authority_unknown_token_resolves_none() {
        let authority = StaticAuthority::new();
        assert!(authority.resolve("nope").await.unwrap().is_none());
    }
}
