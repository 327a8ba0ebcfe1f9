//! Persistent cache of the machine-to-machine access token.
//!
//! Several processes share the `machine_token` table. Each may store a fresh
//! token when it finds none, so duplicates can appear; the next read keeps the
//! token with the latest expiry and deletes the rest.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Db;

/// A stored machine token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineToken {
    pub token: String,
    pub token_type: String,
    /// Unix seconds.
    pub expires_at: i64,
    /// Unix seconds after which the token is replaced instead of reused.
    pub refresh_at: i64,
}

impl MachineToken {
    /// Token granted at `now` for `expires_in` seconds.
    ///
    /// It is replaced `leeway` seconds before expiry, but never earlier than
    /// halfway through its lifetime, so a short-lived grant is still reused.
    pub fn issue(
        token: String,
        token_type: String,
        now: i64,
        expires_in: i64,
        leeway: i64,
    ) -> Self {
        let margin = leeway.min(expires_in / 2).max(0);
        Self {
            token,
            token_type,
            expires_at: now + expires_in,
            refresh_at: now + expires_in - margin,
        }
    }

    /// Value for the `Authorization` header of management API calls.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.refresh_at > now
    }
}

#[derive(Debug, Deserialize)]
struct MachineTokenRow {
    id: String,
    token: String,
    token_type: String,
    expires_at: i64,
    refresh_at: Option<i64>,
}

impl MachineTokenRow {
    fn to_token(&self) -> MachineToken {
        MachineToken {
            token: self.token.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
            refresh_at: self.refresh_at.unwrap_or(self.expires_at),
        }
    }
}

/// Store for machine tokens (table: `machine_token`).
#[derive(Clone)]
pub struct MachineTokenStore {
    db: Db,
}

impl MachineTokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Return the token with the latest expiry if it is still valid at `now`.
    ///
    /// When more than one record exists, every record but the chosen one is
    /// deleted. With no valid token, all records are deleted.
    pub async fn current(&self, now: i64) -> Result<Option<MachineToken>> {
        let mut res = self
            .db
            .query(
                "SELECT record::id(id) AS id, token, token_type, expires_at, refresh_at \
                 FROM machine_token ORDER BY expires_at DESC",
            )
            .await?;
        let rows: Vec<MachineTokenRow> = res.take(0)?;

        let current = rows
            .first()
            .map(|row| (row.id.as_str(), row.to_token()))
            .filter(|(_, token)| token.is_valid_at(now));
        let keep = current.as_ref().map(|(id, _)| *id);
        let stale: Vec<String> = rows
            .iter()
            .filter(|row| Some(row.id.as_str()) != keep)
            .map(|row| row.id.clone())
            .collect();

        if !stale.is_empty() {
            debug!(count = stale.len(), "Purging stale machine tokens");
            self.db
                .query("DELETE machine_token WHERE record::id(id) IN $stale")
                .bind(("stale", stale))
                .await?
                .check()?;
        }

        Ok(current.map(|(_, token)| token))
    }

    pub async fn save(&self, token: &MachineToken) -> Result<()> {
        // `$token` is reserved by the database, hence `$access_token`.
        self.db
            .query(
                "CREATE machine_token SET token = $access_token, token_type = $token_type, \
                 expires_at = $expires_at, refresh_at = $refresh_at RETURN NONE",
            )
            .bind(("access_token", token.token.clone()))
            .bind(("token_type", token.token_type.clone()))
            .bind(("expires_at", token.expires_at))
            .bind(("refresh_at", token.refresh_at))
            .await?
            .check()?;
        Ok(())
    }
}
