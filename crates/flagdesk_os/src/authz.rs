#![forbid(unsafe_code)]

use flagdesk_kernel_contracts::identity::{DisplayName, UserId};
use flagdesk_storage::repo::AdminRepo;
use flagdesk_storage::StorageError;

/// The single configured root identity. Either key alone is enough to match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootIdentity {
    pub username: Option<DisplayName>,
    pub user_id: Option<UserId>,
}

impl RootIdentity {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matches(&self, user_id: UserId, display_name: Option<&DisplayName>) -> bool {
        if self.user_id == Some(user_id) {
            return true;
        }
        match (&self.username, display_name) {
            (Some(root), Some(name)) => root == name,
            _ => false,
        }
    }
}

/// Flat privilege check: root identity or a granted admin name. No roles.
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    root: RootIdentity,
}

impl AuthorizationGuard {
    pub fn new(root: RootIdentity) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &RootIdentity {
        &self.root
    }

    /// Display-name matching is verbatim, so a renamed account gains or loses the grant with
    /// its name. The numeric root id is the only rename-proof key.
    pub fn is_privileged<S: AdminRepo + ?Sized>(
        &self,
        store: &S,
        user_id: UserId,
        display_name: Option<&DisplayName>,
    ) -> Result<bool, StorageError> {
        if self.root.matches(user_id, display_name) {
            return Ok(true);
        }
        match display_name {
            Some(name) => Ok(store.find_admin_row(name)?.is_some()),
            None => Ok(false),
        }
    }
}
