pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod types;

#[cfg(test)]
mod test_support;

pub use api::{AppState, create_router};
pub use config::{AppConfig, DeploymentMode, IdentityProviderConfig};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use error::{ApiError, ApiResult, AuthError, AuthErrorKind, RequestError};
