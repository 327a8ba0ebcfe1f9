//! Shared fixtures: in-memory store, a mock identity provider and tokens
//! signed with the test RSA key.

use axum::http::StatusCode;
use axum::response::Response;
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::api::AppState;
use crate::config::IdentityProviderConfig;
use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};

pub const TEST_KID: &str = "test-key-1";

const TEST_PRIVATE_KEY: &[u8] = include_bytes!("testdata/idp_test_key.pem");

const TEST_MODULUS: &str = "qvCA0Bj4b0JasTUYA8qsdJbV2pQkXTir7eM5axQnLdBuXbfR7QrAzCb1C5I-bYpXD4JQJOQJ_vHsr7itLOO9VcD1IG0eaGjh5xY8okAofM0qAndU3TopzaY-HA3QgDKOu51moggYKU_EWo6llwBSoJTx_jft9eFynbpuNX5IZ0_z5nBk_faIUqJpYiDdXDcFNjkm-LrXwQ2-NnecKqtQqkYclindweLCTFEpSBO1cbjdVtfsIxdTKdpVIElAIBJWTFJfIHs7U91iS7EBYybXNqIYe3c3uj5WinNOj1Gm7GD89A4ds9lVHrjpNZBnb9zcBuC2WTcwY9S8cJVJY2IgqQ";

const TEST_AUDIENCE: &str = "http://127.0.0.1:8000/";

/// Key set holding the public half of the test key.
pub fn jwks_json() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "use": "sig",
            "alg": "RS256",
            "n": TEST_MODULUS,
            "e": "AQAB"
        }]
    })
}

/// Identity provider config pointing at `server`.
pub fn idp_config(server: &MockServer) -> IdentityProviderConfig {
    let mut config = IdentityProviderConfig::new(
        format!("{}/", server.uri()),
        "test-client",
        "test-secret",
        TEST_AUDIENCE,
    );
    config.timeout_seconds = 2;
    config.max_retries = 2;
    config
}

pub async fn mount_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .mount(server)
        .await;
}

/// Token endpoint granting `machine-token`, expected to be hit `expected` times.
pub async fn mount_token_endpoint(server: &MockServer, expected: u64) {
    mount_token_endpoint_expiring(server, 86400, expected).await;
}

/// Like [`mount_token_endpoint`] with grants lasting `expires_in` seconds.
pub async fn mount_token_endpoint_expiring(server: &MockServer, expires_in: i64, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "machine-token",
            "token_type": "Bearer",
            "expires_in": expires_in
        })))
        .expect(expected)
        .mount(server)
        .await;
}

/// A user as the management API describes it.
pub struct IdpUserFixture {
    subject: String,
    nickname: String,
    roles: Vec<String>,
}

impl IdpUserFixture {
    pub fn new(subject: &str, nickname: &str) -> Self {
        Self {
            subject: subject.to_string(),
            nickname: nickname.to_string(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    fn profile(&self) -> Value {
        let local_id = self
            .subject
            .split_once('|')
            .map(|(_, id)| id)
            .unwrap_or(&self.subject);
        json!({
            "user_id": self.subject,
            "nickname": self.nickname,
            "email": format!("{}@example.com", self.nickname),
            "picture": format!("https://img.example.com/{}.png", self.nickname),
            "identities": [{"user_id": local_id, "provider": "auth0"}]
        })
    }

    fn role_list(&self) -> Value {
        self.roles
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"id": format!("rol_{}", i), "name": name}))
            .collect()
    }
}

pub async fn mount_user(server: &MockServer, user: &IdpUserFixture) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/users/{}", user.subject)))
        .respond_with(ResponseTemplate::new(200).set_body_json(user.profile()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/users/{}/roles", user.subject)))
        .respond_with(ResponseTemplate::new(200).set_body_json(user.role_list()))
        .mount(server)
        .await;
}

/// Claims of an end-user token issued by the mock provider.
#[derive(Debug, Clone, Serialize)]
pub struct TestClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl TestClaims {
    /// Valid for an hour, issued by `server` for the test audience.
    pub fn new(server: &MockServer, sub: &str) -> Self {
        Self {
            sub: sub.to_string(),
            iss: format!("{}/", server.uri()),
            aud: TEST_AUDIENCE.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            permissions: None,
        }
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = Some(permissions.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn expired(mut self) -> Self {
        self.exp = chrono::Utc::now().timestamp() - 3600;
        self
    }
}

pub fn sign_token(claims: &TestClaims) -> String {
    sign_token_with_kid(claims, TEST_KID)
}

pub fn sign_token_with_kid(claims: &TestClaims, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY).expect("test key parses");
    encode(&header, claims, &key).expect("test token signs")
}

/// Fresh in-memory store with the schema applied.
pub async fn memory_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        namespace: "test".to_string(),
        database: "test".to_string(),
        username: None,
        password: None,
    };
    let db = create_connection(config).await.expect("memory store connects");
    ensure_schema(&db).await.expect("schema applies");
    db
}

/// Number of rows in the machine token table, expired ones included.
pub async fn stored_machine_tokens(db: &Db) -> usize {
    let mut res = db
        .query("SELECT VALUE record::id(id) FROM machine_token")
        .await
        .expect("token query runs");
    let ids: Vec<String> = res.take(0).expect("token ids decode");
    ids.len()
}

pub async fn test_state(server: &MockServer) -> AppState {
    AppState::new(memory_db().await, &idp_config(server)).expect("state builds")
}

/// Status and JSON body of `response`; an empty body reads as `null`.
pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    if bytes.is_empty() {
        return (status, Value::Null);
    }
    (status, serde_json::from_slice(&bytes).expect("body is JSON"))
}
