//! HTTP client for the external identity provider.
//!
//! Three remote operations are exposed: fetching the signing-key set,
//! exchanging client credentials for a machine token, and reading a user's
//! profile and roles from the management API. Every call runs with a bounded
//! timeout and is retried with exponential backoff on transport faults and
//! 5xx answers.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::jwks::JwksDocument;
use crate::config::IdentityProviderConfig;

/// Base delay before the first retry.
const INITIAL_BACKOFF_MS: u64 = 100;

/// Successful answer of the client-credentials exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// One linked identity inside a user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpIdentity {
    /// Some connections report numeric ids.
    pub user_id: Option<serde_json::Value>,
    pub provider: Option<String>,
}

impl IdpIdentity {
    pub fn user_id(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// User profile from `users/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpUser {
    pub user_id: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    #[serde(default)]
    pub identities: Vec<IdpIdentity>,
}

/// Role entry from `users/{id}/roles`.
#[derive(Debug, Clone, Deserialize)]
pub struct IdpRole {
    pub id: Option<String>,
    pub name: String,
}

/// Identity-provider client.
pub struct IdentityProviderClient {
    config: IdentityProviderConfig,
    http: reqwest::Client,
}

impl IdentityProviderClient {
    pub fn new(config: IdentityProviderConfig) -> Result<Self, IdpError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| IdpError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &IdentityProviderConfig {
        &self.config
    }

    /// `GET {domain}.well-known/jwks.json`
    pub async fn fetch_jwks(&self) -> Result<JwksDocument, IdpError> {
        let url = self.config.jwks_url();
        debug!("Fetching JWKS from {}", url);

        let response = self.send_with_retry(|| self.http.get(&url)).await?;
        let response = ensure_success(response)?;
        response
            .json::<JwksDocument>()
            .await
            .map_err(|e| IdpError::Decode(format!("Invalid JWKS document: {}", e)))
    }

    /// `POST {domain}oauth/token` with a form-encoded client-credentials grant.
    pub async fn exchange_client_credentials(&self) -> Result<TokenGrant, IdpError> {
        let url = self.config.token_url();
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("client_secret", &self.config.client_secret)
            .append_pair("audience", &self.config.system_audience)
            .append_pair("grant_type", &self.config.grant_type)
            .finish();

        debug!(audience = %self.config.system_audience, "Requesting machine token");

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(&url)
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(form.clone())
            })
            .await?;

        // Only a 200 counts as a grant.
        if response.status() != StatusCode::OK {
            return Err(IdpError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| IdpError::Decode(format!("Invalid token grant: {}", e)))
    }

    /// `GET {domain}api/v2/users/{id}`. Returns `None` when the provider does
    /// not know the user.
    pub async fn fetch_user(
        &self,
        authorization: &str,
        user_id: &str,
    ) -> Result<Option<IdpUser>, IdpError> {
        let url = self
            .config
            .user_url(user_id)
            .map_err(|e| IdpError::Transport(e.to_string()))?;

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(url.clone())
                    .header(reqwest::header::AUTHORIZATION, authorization)
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Identity provider has no user {}", user_id);
            return Ok(None);
        }

        let response = ensure_success(response)?;
        response
            .json::<IdpUser>()
            .await
            .map(Some)
            .map_err(|e| IdpError::Decode(format!("Invalid user profile: {}", e)))
    }

    /// `GET {domain}api/v2/users/{id}/roles`
    pub async fn fetch_user_roles(
        &self,
        authorization: &str,
        user_id: &str,
    ) -> Result<Vec<IdpRole>, IdpError> {
        let url = self
            .config
            .user_roles_url(user_id)
            .map_err(|e| IdpError::Transport(e.to_string()))?;

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(url.clone())
                    .header(reqwest::header::AUTHORIZATION, authorization)
            })
            .await?;

        let response = ensure_success(response)?;
        response
            .json::<Vec<IdpRole>>()
            .await
            .map_err(|e| IdpError::Decode(format!("Invalid role list: {}", e)))
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Response, IdpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = build().send().await;

            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(e) => e.is_timeout() || e.is_connect(),
            };

            if !retryable || attempt >= self.config.max_retries {
                return match outcome {
                    Ok(response) => Ok(response),
                    Err(e) if e.is_timeout() => Err(IdpError::Timeout(e.to_string())),
                    Err(e) => Err(IdpError::Transport(e.to_string())),
                };
            }

            let delay = backoff(attempt);
            match &outcome {
                Ok(response) => warn!(
                    status = response.status().as_u16(),
                    attempt = attempt + 1,
                    "Identity provider answered with server error, retrying in {:?}",
                    delay
                ),
                Err(e) => warn!(
                    attempt = attempt + 1,
                    "Identity provider request failed: {}, retrying in {:?}", e, delay
                ),
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(1u64 << attempt.min(10)))
}

fn ensure_success(response: Response) -> Result<Response, IdpError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(IdpError::Status {
            status: response.status().as_u16(),
            url: response.url().to_string(),
        })
    }
}

/// Errors talking to the identity provider.
#[derive(Debug, Clone)]
pub enum IdpError {
    /// The request did not complete within the configured timeout.
    Timeout(String),
    /// Connection or protocol failure.
    Transport(String),
    /// Non-success answer.
    Status { status: u16, url: String },
    /// Answer body did not have the expected shape.
    Decode(String),
}

impl std::fmt::Display for IdpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(msg) => write!(f, "Identity provider timed out: {}", msg),
            Self::Transport(msg) => write!(f, "Identity provider unreachable: {}", msg),
            Self::Status { status, url } => {
                write!(f, "Identity provider answered HTTP {} for {}", status, url)
            }
            Self::Decode(msg) => write!(f, "Unexpected identity provider payload: {}", msg),
        }
    }
}

impl std::error::Error for IdpError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::idp_config;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(0), Duration::from_millis(100));
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_identity_user_id_accepts_numbers() {
        let identity: IdpIdentity =
            serde_json::from_str(r#"{"user_id": 12345, "provider": "github"}"#).unwrap();
        assert_eq!(identity.user_id(), Some("12345".to_string()));

        let identity: IdpIdentity = serde_json::from_str(r#"{"user_id": ""}"#).unwrap();
        assert_eq!(identity.user_id(), None);
    }

    #[tokio::test]
    async fn test_exchange_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=test-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "machine-token",
                "token_type": "Bearer",
                "expires_in": 86400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        let grant = client.exchange_client_credentials().await.unwrap();
        assert_eq!(grant.access_token, "machine-token");
        assert_eq!(grant.expires_in, 86400);
    }

    #[tokio::test]
    async fn test_exchange_non_200_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        match client.exchange_client_credentials().await {
            Err(IdpError::Status { status, .. }) => assert_eq!(status, 403),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        match client.fetch_jwks().await {
            Err(IdpError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeouts_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"keys": []}))
                    .set_delay(Duration::from_millis(1500)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let mut config = idp_config(&server);
        config.timeout_seconds = 1;
        config.max_retries = 1;
        let client = IdentityProviderClient::new(config).unwrap();
        match client.fetch_jwks().await {
            Err(IdpError::Timeout(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        // Bind then drop a listener so the port refuses connections.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config =
            IdentityProviderConfig::new(format!("http://127.0.0.1:{}/", port), "c", "s", "aud");
        config.timeout_seconds = 1;
        config.max_retries = 1;

        let client = IdentityProviderClient::new(config).unwrap();
        match client.exchange_client_credentials().await {
            Err(IdpError::Transport(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/abc/roles"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        assert!(client.fetch_user_roles("Bearer t", "abc").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_user_sends_machine_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/abc"))
            .and(header("authorization", "Bearer machine-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user_id": "auth0|abc",
                "nickname": "neo",
                "email": "neo@example.com",
                "picture": "https://img.example.com/neo.png",
                "identities": [{"user_id": "abc", "provider": "auth0"}]
            })))
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        let user = client
            .fetch_user("Bearer machine-token", "abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.nickname.as_deref(), Some("neo"));
        assert_eq!(user.identities[0].user_id(), Some("abc".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_unknown_user_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = IdentityProviderClient::new(idp_config(&server)).unwrap();
        assert!(client.fetch_user("Bearer t", "ghost").await.unwrap().is_none());
    }
}
