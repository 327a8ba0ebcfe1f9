// REST API for the game catalog.
//
// Catalog reads are public; everything else sits behind the `guarded`
// authenticate/authorize route layers. Every error response, including the
// ones the framework produces on its own (unknown route, wrong method,
// extractor rejection, panic), leaves as the JSON error envelope.

pub mod admin;
pub mod body;
pub mod pagination;
pub mod public;
pub mod user;

use std::any::Any;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{IdentityProviderClient, IdpError, TokenValidator, UserResolver, guarded};
use crate::config::IdentityProviderConfig;
use crate::db::Db;
use crate::error::ApiError;

/// State shared by every handler and guard.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub validator: Arc<TokenValidator>,
    pub resolver: Arc<UserResolver>,
}

impl AppState {
    pub fn new(db: Db, config: &IdentityProviderConfig) -> Result<Self, IdpError> {
        let idp = Arc::new(IdentityProviderClient::new(config.clone())?);
        Ok(Self {
            validator: Arc::new(TokenValidator::new(idp.clone())),
            resolver: Arc::new(UserResolver::new(idp, db.clone())),
            db,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/api/gamelists",
            get(public::list_games).merge(guarded(
                post(admin::create_game),
                &state,
                &["post:game"],
            )),
        )
        .route(
            "/api/gamelist/{id}",
            get(public::game_detail).merge(guarded(
                patch(admin::update_game).delete(admin::delete_game),
                &state,
                &["patch:game", "delete:game"],
            )),
        )
        .route(
            "/api/vendors",
            get(public::list_vendors).merge(guarded(
                post(admin::create_vendor),
                &state,
                &["post:vendor"],
            )),
        )
        .route(
            "/api/vendor/{id}",
            get(public::vendor_detail).merge(guarded(
                patch(admin::update_vendor).delete(admin::delete_vendor),
                &state,
                &["patch:vendor", "delete:vendor"],
            )),
        )
        .route(
            "/api/users",
            guarded(get(admin::list_users), &state, &["get:user", "get:user-game"]),
        )
        .route(
            "/api/user/{user}",
            guarded(
                get(admin::user_detail),
                &state,
                &["get:user-info", "get:user-game"],
            ),
        )
        .route("/api/user/me", guarded(get(user::me), &state, &["get:me"]))
        .route(
            "/api/user/me/games",
            guarded(
                get(user::list_my_games).post(user::add_my_game),
                &state,
                &["get:my-game", "post:my-game"],
            ),
        )
        .route(
            "/api/user/me/games/{id}",
            guarded(
                patch(user::update_my_game).delete(user::delete_my_game),
                &state,
                &["patch:my-game", "delete:my-game"],
            ),
        )
        .layer(CorsLayer::permissive());

    let router = Router::new()
        .route("/", get(public::index))
        .merge(api)
        .fallback(unknown_route);

    with_error_layers(router).with_state(state)
}

/// Tracing, panic recovery and the error envelope, outermost first.
fn with_error_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::map_response(envelope_errors)),
    )
}

async fn unknown_route() -> ApiError {
    ApiError::from_status(StatusCode::NOT_FOUND)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::server_fault(format!("panic: {}", detail)).into_response()
}

/// Rewrite plain-text error bodies produced by the framework into the
/// envelope. Responses that are already JSON pass through untouched.
async fn envelope_errors(response: Response) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    let (envelope, body) = ApiError::from_status(status).into_response().into_parts();
    parts.status = envelope.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, body)
}
