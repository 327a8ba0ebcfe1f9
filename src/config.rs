//! Application configuration.
//!
//! Values come from the process environment. In development mode a local
//! `.env` file is loaded first so the identity-provider secrets can live
//! outside the shell profile; production reads the environment only.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::db::DatabaseConfig;

/// Default timeout for a single identity-provider request.
pub const DEFAULT_IDP_TIMEOUT_SECONDS: u64 = 10;

/// Default number of retries after a transient identity-provider failure.
pub const DEFAULT_IDP_MAX_RETRIES: u32 = 2;

/// Machine tokens are replaced this long before expiry, at most half their lifetime.
pub const DEFAULT_MACHINE_TOKEN_LEEWAY_SECONDS: i64 = 30;

/// Deployment mode switch (`APP_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Development,
    Production,
}

impl FromStr for DeploymentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow!("Unknown deployment mode `{}`", other)),
        }
    }
}

/// Settings for the external identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// Issuer domain, always with a trailing slash (`https://tenant.auth0.com/`).
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    /// Audience requested for machine tokens (the management API).
    pub system_audience: String,
    /// Audience end-user bearer tokens must carry.
    pub api_audience: String,
    /// Accepted signing algorithms.
    pub algorithms: Vec<Algorithm>,
    pub grant_type: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    /// Signing-key cache TTL; `0` refetches the key set on every validation.
    pub jwks_cache_seconds: u64,
    pub machine_token_leeway_seconds: i64,
    /// Reject users without any role instead of storing `role = null`.
    pub require_role: bool,
}

impl IdentityProviderConfig {
    /// Create a config with defaults for everything but the identity values.
    pub fn new(
        domain: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_audience: impl Into<String>,
    ) -> Self {
        let domain = normalize_domain(&domain.into());
        Self {
            system_audience: format!("{}api/v2/", domain),
            domain,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_audience: api_audience.into(),
            algorithms: vec![Algorithm::RS256],
            grant_type: "client_credentials".to_string(),
            timeout_seconds: DEFAULT_IDP_TIMEOUT_SECONDS,
            max_retries: DEFAULT_IDP_MAX_RETRIES,
            jwks_cache_seconds: 0,
            machine_token_leeway_seconds: DEFAULT_MACHINE_TOKEN_LEEWAY_SECONDS,
            require_role: false,
        }
    }

    /// Expected `iss` claim.
    pub fn issuer(&self) -> &str {
        &self.domain
    }

    pub fn jwks_url(&self) -> String {
        format!("{}.well-known/jwks.json", self.domain)
    }

    pub fn token_url(&self) -> String {
        format!("{}oauth/token", self.domain)
    }

    /// `{domain}api/v2/users/{id}`, with `id` encoded as one path segment.
    pub fn user_url(&self, user_id: &str) -> Result<Url> {
        self.management_url(&["api", "v2", "users", user_id])
    }

    /// `{domain}api/v2/users/{id}/roles`.
    pub fn user_roles_url(&self, user_id: &str) -> Result<Url> {
        self.management_url(&["api", "v2", "users", user_id, "roles"])
    }

    fn management_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.domain)
            .with_context(|| format!("Invalid identity provider domain `{}`", self.domain))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Identity provider domain cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn normalize_domain(domain: &str) -> String {
    let trimmed = domain.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: DeploymentMode,
    pub identity_provider: IdentityProviderConfig,
    pub database: DatabaseConfig,
    /// Session secret; unused by the bearer-token flow but kept with the rest
    /// of the deployment secrets.
    pub secret_key: Option<String>,
}

impl AppConfig {
    /// Load configuration for `mode`, reading `.env` first in development.
    pub fn load(mode: DeploymentMode) -> Result<Self> {
        if mode == DeploymentMode::Development {
            match dotenv::dotenv() {
                Ok(path) => info!("Loaded environment from {}", path.display()),
                Err(e) => debug!("No .env file loaded: {}", e),
            }
        }
        Self::from_lookup(mode, |key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(mode: DeploymentMode, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| anyhow!("Missing required configuration `{}`", key))
        };

        let mut idp = IdentityProviderConfig::new(
            required("AUTH0_DOMAIN")?,
            required("AUTH0_CLIENT_ID")?,
            required("AUTH0_CLIENT_SECRET")?,
            required("API_AUDIENCE")?,
        );

        if let Some(audience) = optional("AUTH0_SYSTEM_AUDIENCE") {
            idp.system_audience = audience;
        }
        if let Some(algorithms) = optional("AUTH_ALGORITHMS") {
            idp.algorithms = parse_algorithms(&algorithms)?;
        }
        if let Some(grant_type) = optional("AUTH_GRANT_TYPE") {
            idp.grant_type = grant_type;
        }
        if let Some(v) = optional("IDP_TIMEOUT_SECONDS") {
            idp.timeout_seconds = parse_value("IDP_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = optional("IDP_MAX_RETRIES") {
            idp.max_retries = parse_value("IDP_MAX_RETRIES", &v)?;
        }
        if let Some(v) = optional("JWKS_CACHE_SECONDS") {
            idp.jwks_cache_seconds = parse_value("JWKS_CACHE_SECONDS", &v)?;
        }
        if let Some(v) = optional("MACHINE_TOKEN_LEEWAY_SECONDS") {
            idp.machine_token_leeway_seconds = parse_value("MACHINE_TOKEN_LEEWAY_SECONDS", &v)?;
        }
        if let Some(v) = optional("REQUIRE_ROLE") {
            idp.require_role = parse_value("REQUIRE_ROLE", &v)?;
        }

        Ok(Self {
            mode,
            identity_provider: idp,
            database: DatabaseConfig::from_lookup(&lookup),
            secret_key: lookup("SECRET_KEY"),
        })
    }
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>> {
    let algorithms = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Algorithm::from_str(s).map_err(|e| anyhow!("Invalid algorithm `{}`: {}", s, e)))
        .collect::<Result<Vec<_>>>()?;

    if algorithms.is_empty() {
        return Err(anyhow!("AUTH_ALGORITHMS must name at least one algorithm"));
    }
    Ok(algorithms)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Invalid value for `{}`: {}", key, e))
}
