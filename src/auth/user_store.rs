//! Local user storage.
//!
//! Users are mirrored from the identity provider. The record key is the
//! provider's user id, so repeated resolutions update the same record.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::auth::resolver::ResolvedIdentity;
use crate::db::Db;

/// Persisted representation of a local user (table: `user`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub role: Option<String>,
}

const USER_FIELDS: &str = "record::id(id) AS id, username, email, picture, role, created_at";

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create the user on first sight, refresh its profile afterwards.
    pub async fn upsert_user(&self, identity: &ResolvedIdentity) -> Result<UserRecord> {
        self.db
            .query(
                r#"
                UPSERT type::thing('user', $id) MERGE {
                    username: $username,
                    email: $email,
                    picture: $picture,
                    role: $role
                } RETURN NONE
                "#,
            )
            .bind(("id", identity.id.to_string()))
            .bind(("username", identity.username.clone()))
            .bind(("email", identity.email.clone()))
            .bind(("picture", identity.picture.clone()))
            .bind(("role", identity.role.clone()))
            .await?
            .check()?;

        self.get_user(identity.id.as_str())
            .await?
            .ok_or_else(|| anyhow!("Failed to upsert user {}", identity.id))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRecord>> {
        let mut res = self
            .db
            .query(format!("SELECT {USER_FIELDS} FROM type::thing('user', $id)"))
            .bind(("id", id.to_string()))
            .await?;
        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// All users in first-seen order.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut res = self
            .db
            .query(format!("SELECT {USER_FIELDS} FROM user ORDER BY created_at ASC"))
            .await?;
        Ok(res.take(0)?)
    }
}
