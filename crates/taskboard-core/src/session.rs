//! Explicitly injected session state.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Role of the logged-in user, as the server names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    #[serde(alias = "scrumMaster", alias = "scrum_master")]
    ScrumMaster,
    #[serde(alias = "productOwner", alias = "product_owner")]
    ProductOwner,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "developer" | "dev" => Some(Self::Developer),
            "scrummaster" | "sm" => Some(Self::ScrumMaster),
            "productowner" | "po" => Some(Self::ProductOwner),
            _ => None,
        }
    }

    /// Whether this role may soft-delete a task written by `author` when
    /// logged in as `me`. Developers may only delete their own tasks.
    pub fn can_delete(self, me: &str, author: &str) -> bool {
        match self {
            Self::Developer => me == author,
            Self::ScrumMaster | Self::ProductOwner => true,
        }
    }
}

/// Accessors for the identity the sync layer acts as.
pub trait SessionContext: Send + Sync {
    fn current_user_id(&self) -> Option<String>;

    fn auth_token(&self) -> Option<String>;

    fn role(&self) -> Option<Role>;

    /// Drop every credential. Called on forced logout.
    fn clear(&self);

    /// Whether a user and token are present.
    fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some() && self.auth_token().is_some()
    }

    /// Current user and token, or [`SyncError::NotAuthenticated`].
    fn credentials(&self) -> SyncResult<(String, String)> {
        match (self.current_user_id(), self.auth_token()) {
            (Some(user), Some(token)) => Ok((user, token)),
            _ => Err(SyncError::NotAuthenticated),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Credentials {
    user: Option<String>,
    token: Option<String>,
    role: Option<Role>,
}

/// In-memory session, shared between the engine and the REST client.
#[derive(Debug, Default)]
pub struct MemorySession {
    inner: RwLock<Credentials>,
}

impl MemorySession {
    pub fn new(user: impl Into<String>, token: impl Into<String>, role: Option<Role>) -> Self {
        Self {
            inner: RwLock::new(Credentials {
                user: Some(user.into()),
                token: Some(token.into()),
                role,
            }),
        }
    }

    fn read(&self) -> Credentials {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SessionContext for MemorySession {
    fn current_user_id(&self) -> Option<String> {
        self.read().user
    }

    fn auth_token(&self) -> Option<String> {
        self.read().token
    }

    fn role(&self) -> Option<Role> {
        self.read().role
    }

    fn clear(&self) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Credentials::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_drops_credentials() {
        let session = MemorySession::new("alice", "t0k", Some(Role::Developer));
        assert_eq!(session.credentials().unwrap(), ("alice".into(), "t0k".into()));
        session.clear();
        assert!(!session.is_authenticated());
        assert!(matches!(session.credentials(), Err(SyncError::NotAuthenticated)));
        assert_eq!(session.role(), None);
    }

    #[test]
    fn test_developer_deletes_only_own_tasks() {
        assert!(Role::Developer.can_delete("alice", "alice"));
        assert!(!Role::Developer.can_delete("alice", "bob"));
        assert!(Role::ScrumMaster.can_delete("alice", "bob"));
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(Role::parse("Scrum Master"), Some(Role::ScrumMaster));
        assert_eq!(Role::parse("product_owner"), Some(Role::ProductOwner));
        assert_eq!(Role::parse("dev"), Some(Role::Developer));
        assert_eq!(Role::parse("admin"), None);
    }
}
