//! Authentication and authorization.
//!
//! Leaf to root:
//!
//! - [`token_cache`]: persisted machine-to-machine token
//! - [`idp`]: HTTP client for the identity provider
//! - [`jwks`]: signing keys used to verify bearer tokens
//! - [`validator`]: bearer token verification
//! - [`resolver`]: subject to local user, through the management API
//! - [`guard`]: `authenticate` / `authorize` route layers
//!
//! ## Usage
//!
//! ```ignore
//! let route = guarded(get(handler), &state, &["get:me"]);
//!
//! async fn handler(Extension(user): Extension<UserContext>) -> impl IntoResponse {
//!     user.user_id().to_string()
//! }
//! ```

mod context;
pub mod guard;
pub mod idp;
pub mod jwks;
pub mod resolver;
pub mod token_cache;
mod user_store;
pub mod validator;

pub use context::UserContext;
pub use guard::{RequiredPermissions, authenticate, authorize, guarded, parse_bearer};
pub use idp::{IdentityProviderClient, IdpError};
pub use jwks::{JwksCache, JwksCacheError};
pub use resolver::{ResolvedIdentity, UserResolver};
pub use token_cache::{MachineToken, MachineTokenStore};
pub use user_store::{UserRecord, UserStore};
pub use validator::{Claims, TokenValidator};
