//! Resolution of a validated subject into a local user.
//!
//! The management API needs a machine token. One is read from the
//! [`MachineTokenStore`] or, when none is valid, obtained through a
//! client-credentials exchange and stored. Within one process a mutex makes
//! the find-or-exchange step single-flight, so concurrent first requests
//! trigger one exchange. Across processes duplicates are possible and are
//! cleaned up by the store on its next read.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::idp::{IdentityProviderClient, IdpError, IdpUser};
use crate::auth::token_cache::{MachineToken, MachineTokenStore};
use crate::auth::user_store::{UserRecord, UserStore};
use crate::db::Db;
use crate::error::{ApiError, ApiResult, AuthError, AuthErrorKind};
use crate::types::{Subject, UserId};

/// Identity composed from the provider's profile and role list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    /// First role assigned by the provider, if any.
    pub role: Option<String>,
}

impl ResolvedIdentity {
    fn compose(subject: &Subject, profile: IdpUser, role: Option<String>) -> Self {
        let id = profile
            .identities
            .first()
            .and_then(|identity| identity.user_id())
            .or_else(|| profile.user_id.clone())
            .unwrap_or_else(|| subject.to_string());

        let username = profile
            .nickname
            .clone()
            .or_else(|| profile.email.clone())
            .or_else(|| Some(id.clone()));

        Self {
            id: UserId::new(id),
            username,
            email: profile.email,
            picture: profile.picture,
            role,
        }
    }
}

pub struct UserResolver {
    idp: Arc<IdentityProviderClient>,
    tokens: MachineTokenStore,
    users: UserStore,
    refresh: Mutex<()>,
}

impl UserResolver {
    pub fn new(idp: Arc<IdentityProviderClient>, db: Db) -> Self {
        Self {
            idp,
            tokens: MachineTokenStore::new(db.clone()),
            users: UserStore::new(db),
            refresh: Mutex::new(()),
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Current machine token, exchanging client credentials when none is valid.
    pub async fn machine_token(&self) -> ApiResult<MachineToken> {
        let _guard = self.refresh.lock().await;

        let now = Utc::now().timestamp();
        let leeway = self.idp.config().machine_token_leeway_seconds;
        if let Some(token) = self.tokens.current(now).await? {
            debug!("Reusing stored machine token");
            return Ok(token);
        }

        let grant = self
            .idp
            .exchange_client_credentials()
            .await
            .map_err(|e| match e {
                IdpError::Status { status, .. } => {
                    ApiError::server_fault(format!("Server transaction error {}", status))
                }
                other => ApiError::server_fault(other.to_string()),
            })?;

        let token = MachineToken::issue(
            grant.access_token,
            grant.token_type,
            now,
            grant.expires_in,
            leeway,
        );
        self.tokens.save(&token).await?;
        info!(expires_at = token.expires_at, "Stored new machine token");

        Ok(token)
    }

    /// Look up `subject` at the provider and mirror it locally.
    ///
    /// Returns `None` when the provider does not know the subject.
    pub async fn resolve(&self, subject: &Subject) -> ApiResult<Option<ResolvedIdentity>> {
        let token = self.machine_token().await?;
        let authorization = token.authorization();

        let Some(profile) = self
            .idp
            .fetch_user(&authorization, subject.as_str())
            .await
            .map_err(|e| ApiError::server_fault(e.to_string()))?
        else {
            return Ok(None);
        };

        let roles = self
            .idp
            .fetch_user_roles(&authorization, subject.as_str())
            .await
            .map_err(|e| ApiError::server_fault(e.to_string()))?;

        let role = roles.into_iter().next().map(|r| r.name);
        if role.is_none() {
            if self.idp.config().require_role {
                return Err(AuthError::new(AuthErrorKind::Unauthorized, "No role assigned").into());
            }
            warn!(subject = %subject, "Identity provider returned no role, storing user without one");
        }

        let identity = ResolvedIdentity::compose(subject, profile, role);
        self.upsert(&identity).await?;
        debug!(user_id = %identity.id, "Resolved subject {}", subject);

        Ok(Some(identity))
    }

    async fn upsert(&self, identity: &ResolvedIdentity) -> ApiResult<UserRecord> {
        Ok(self.users.upsert_user(identity).await?)
    }
}
