// User management and catalog maintenance. Every route here is guarded by
// the permissions listed in the router.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::AppState;
use crate::api::body::{
    JsonObject, parse_object, require_date, require_id, require_int, require_str,
    require_string_list,
};
use crate::api::pagination::{PageQuery, paginate};
use crate::api::public::{game_json, vendor_json};
use crate::api::user::profile_json;
use crate::db::{GameFields, QueryBuilder, VendorWrite};
use crate::error::{ApiError, ApiResult, RequestError};

// ----- users -----

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let users = state.resolver.users().list_users().await?;
    let page: Vec<Value> = paginate(&users, query.page())
        .iter()
        .map(|u| {
            json!({
                "user_id": u.id,
                "user": u.username,
                "email": u.email,
            })
        })
        .collect();

    Ok(Json(json!({
        "users": page,
        "totalUsers": users.len(),
    })))
}

pub async fn user_detail(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state
        .resolver
        .users()
        .get_user(&user)
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(profile_json(&state, &record).await?))
}

// ----- vendors -----

fn vendor_write(body: &JsonObject) -> Result<VendorWrite, RequestError> {
    Ok(VendorWrite {
        name: require_str(body, "name")?,
        distributor: require_str(body, "distributor")?,
        publisher: require_str(body, "publisher")?,
        developer: require_str(body, "developer")?,
        release_date: require_date(body, "release_date")?,
    })
}

pub async fn create_vendor(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let data = vendor_write(&parse_object(&body)?)?;
    let vendor = QueryBuilder::create_vendor(&state.db, &data).await?;
    info!(vendor_id = %vendor.id, name = %vendor.name, "Created vendor");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "literal_status": "saved",
            "content": vendor_json(&vendor),
        })),
    ))
}

pub async fn update_vendor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if QueryBuilder::find_vendor(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found());
    }

    let data = vendor_write(&parse_object(&body)?)?;
    let vendor = QueryBuilder::update_vendor(&state.db, &id, &data)
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(json!({
        "literal_status": "updated",
        "content": vendor_json(&vendor),
    })))
}

pub async fn delete_vendor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let vendor = QueryBuilder::find_vendor(&state.db, &id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    QueryBuilder::delete_vendor(&state.db, &vendor.id).await?;
    info!(vendor_id = %vendor.id, "Deleted vendor with its games");

    Ok(Json(json!({
        "literal_status": "deleted",
        "list_id": vendor.id,
    })))
}

// ----- games -----

fn game_fields(body: &JsonObject) -> Result<GameFields, RequestError> {
    Ok(GameFields {
        name: require_str(body, "name")?,
        price: require_int(body, "price")?,
        rating: require_int(body, "rating")?,
        platform: require_string_list(body, "platform")?,
        genre: require_string_list(body, "genre")?,
        cover_link: require_str(body, "cover_link")?,
    })
}

fn name_conflict(name: &str) -> ApiError {
    ApiError::Conflict(format!("Game '{}' already exists", name))
}

pub async fn create_game(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let body = parse_object(&body)?;
    let data = game_fields(&body)?;
    let vendor_id = require_id(&body, "vendor_id")?;

    if QueryBuilder::find_vendor(&state.db, &vendor_id).await?.is_none() {
        return Err(ApiError::not_found());
    }
    if QueryBuilder::game_name_taken(&state.db, &data.name, None).await? {
        return Err(name_conflict(&data.name));
    }

    let game = QueryBuilder::create_game(&state.db, &vendor_id, &data).await?;
    info!(game_id = %game.id, name = %game.name, "Created game");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "literal_status": "saved",
            "content": game_json(&game),
        })),
    ))
}

pub async fn update_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if QueryBuilder::find_game(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found());
    }

    let data = game_fields(&parse_object(&body)?)?;
    if QueryBuilder::game_name_taken(&state.db, &data.name, Some(&id)).await? {
        return Err(name_conflict(&data.name));
    }

    let game = QueryBuilder::update_game(&state.db, &id, &data)
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(json!({
        "literal_status": "updated",
        "content": game_json(&game),
    })))
}

pub async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let game = QueryBuilder::find_game(&state.db, &id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    QueryBuilder::delete_game(&state.db, &game.id).await?;
    info!(game_id = %game.id, "Deleted game");

    Ok(Json(json!({
        "literal_status": "deleted",
        "list_id": game.id,
    })))
}
