//! User context for request-scoped identity.

use serde::{Deserialize, Serialize};

use crate::types::{Subject, UserId};

/// Identity attached to a request once `authenticate` has succeeded.
///
/// Handlers read it from request extensions; `authorize` checks its
/// permissions without validating the token a second time. It is immutable
/// once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Local user key
    user_id: UserId,
    /// `sub` claim of the validated token
    subject: Subject,
    /// `permissions` claim, `None` when the token carries none
    permissions: Option<Vec<String>>,
    username: Option<String>,
    role: Option<String>,
}

impl UserContext {
    pub fn new(
        user_id: UserId,
        subject: Subject,
        permissions: Option<Vec<String>>,
        username: Option<String>,
        role: Option<String>,
    ) -> Self {
        Self {
            user_id,
            subject,
            permissions,
            username,
            role,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn permissions(&self) -> Option<&[String]> {
        self.permissions.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Membership test against the permissions claim. An absent or empty
    /// claim grants nothing.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_deref()
            .is_some_and(|granted| granted.iter().any(|p| p == permission))
    }

    /// Get a display string for logging.
    pub fn display(&self) -> String {
        match &self.username {
            Some(name) => format!("{} ({})", name, self.user_id),
            None => self.user_id.to_string(),
        }
    }
}
