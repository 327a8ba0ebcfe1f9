// Endpoints acting on the caller's own profile and game list.
//
// Every query here is scoped by the owner key taken from the request's
// `UserContext`, so a caller can never read or touch another user's records.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::AppState;
use crate::api::body::{parse_object, require_bool, require_date, require_id};
use crate::api::pagination::{PageQuery, paginate};
use crate::auth::{UserContext, UserRecord};
use crate::db::{MyGameCreate, OwnedGameRow, QueryBuilder};
use crate::error::{ApiError, ApiResult};

fn owned_vendor_json(row: &OwnedGameRow) -> Value {
    json!({
        "vendor_id": row.vendor_id,
        "name": row.vendor_name,
        "distributor": row.vendor_distributor,
    })
}

/// Profile with the full owned-game summary. Shared by `/api/user/me` and
/// the admin user detail.
pub(crate) async fn profile_json(state: &AppState, user: &UserRecord) -> ApiResult<Value> {
    let rows = QueryBuilder::list_owned_games(&state.db, &user.id).await?;
    let games: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "list_id": row.list_id,
                "game_id": row.game_id,
                "name": row.name,
                "cover": row.cover,
                "vendor": owned_vendor_json(row),
            })
        })
        .collect();

    Ok(json!({
        "username": user.username,
        "email": user.email,
        "avatar": user.picture,
        "role": user.role,
        "game": {
            "games": games,
            "totalGame": rows.len(),
        },
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> ApiResult<Json<Value>> {
    let user = state
        .resolver
        .users()
        .get_user(ctx.user_id().as_str())
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(profile_json(&state, &user).await?))
}

pub async fn list_my_games(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let rows = QueryBuilder::list_owned_games(&state.db, ctx.user_id().as_str()).await?;
    let page: Vec<Value> = paginate(&rows, query.page())
        .iter()
        .map(|row| {
            json!({
                "list_id": row.list_id,
                "game_id": row.game_id,
                "name": row.name,
                "platform": row.platform,
                "genres": row.genres,
                "cover": row.cover,
                "purchased_on": row.purchased_on,
                "play_status": row.play_status,
                "vendor": owned_vendor_json(row),
            })
        })
        .collect();

    Ok(Json(json!({
        "myGames": page,
        "totalGames": rows.len(),
    })))
}

pub async fn add_my_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = parse_object(&body)?;
    let data = MyGameCreate {
        purchased_on: require_date(&body, "purchased_on")?,
        game_id: require_id(&body, "game_id")?,
        vendor_id: require_id(&body, "vendor_id")?,
    };

    if QueryBuilder::find_game(&state.db, &data.game_id).await?.is_none()
        || QueryBuilder::find_vendor(&state.db, &data.vendor_id).await?.is_none()
    {
        return Err(ApiError::not_found());
    }

    let owner = ctx.user_id().as_str();
    if QueryBuilder::owns_game(&state.db, owner, &data.game_id).await? {
        return Err(ApiError::Conflict("Game already in list".to_string()));
    }

    let record = QueryBuilder::create_owned_game(&state.db, owner, &data).await?;
    info!(user = %ctx.display(), list_id = %record.id, "Added game to list");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "literal_status": "saved",
            "list_id": record.id,
        })),
    ))
}

pub async fn update_my_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let body = parse_object(&body)?;
    let play_status = require_bool(&body, "play_status")?;

    let record =
        QueryBuilder::set_play_status(&state.db, ctx.user_id().as_str(), &id, play_status)
            .await?
            .ok_or_else(ApiError::not_found)?;

    Ok(Json(json!({
        "literal_status": "updated",
        "content": record,
    })))
}

pub async fn delete_my_game(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let owner = ctx.user_id().as_str();
    let record = QueryBuilder::find_owned_game(&state.db, owner, &id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    QueryBuilder::delete_owned_game(&state.db, owner, &record.id).await?;
    info!(user = %ctx.display(), list_id = %record.id, "Removed game from list");

    Ok(Json(json!({
        "literal_status": "deleted",
        "list_id": record.id,
    })))
}
