// Catalog endpoints readable without a token.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};

use crate::api::AppState;
use crate::api::pagination::{PageQuery, paginate};
use crate::db::{GameRecord, QueryBuilder, VendorRecord};
use crate::error::{ApiError, ApiResult};

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Game as listed in the catalog and echoed back by admin writes.
pub(crate) fn game_json(game: &GameRecord) -> Value {
    json!({
        "game_id": game.id,
        "name": game.name,
        "price": game.price,
        "rating": game.rating,
        "platform": game.platform,
        "genre": game.genre,
        "cover": game.cover_link,
        "vendor_id": game.vendor,
    })
}

pub(crate) fn vendor_json(vendor: &VendorRecord) -> Value {
    json!({
        "vendor_id": vendor.id,
        "name": vendor.name,
        "distributor": vendor.distributor,
        "publisher": vendor.publisher,
        "developer": vendor.developer,
        "release_date": vendor.release_date,
    })
}

pub async fn list_games(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let games = QueryBuilder::list_games(&state.db).await?;
    let page: Vec<Value> = paginate(&games, query.page()).iter().map(game_json).collect();

    Ok(Json(json!({
        "games": page,
        "totalGames": games.len(),
    })))
}

pub async fn game_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let game = QueryBuilder::find_game(&state.db, &id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let vendor = QueryBuilder::find_vendor(&state.db, &game.vendor).await?;

    let mut body = game_json(&game);
    body["vendor"] = match vendor {
        Some(v) => json!({
            "vendor_id": v.id,
            "name": v.name,
            "distributor": v.distributor,
        }),
        None => Value::Null,
    };

    Ok(Json(body))
}

pub async fn list_vendors(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let vendors = QueryBuilder::list_vendors(&state.db).await?;
    let page: Vec<Value> = paginate(&vendors, query.page()).iter().map(vendor_json).collect();

    Ok(Json(json!({
        "vendors": page,
        "totalVendors": vendors.len(),
    })))
}

pub async fn vendor_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let vendor = QueryBuilder::find_vendor(&state.db, &id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    let games = QueryBuilder::list_games_by_vendor(&state.db, &vendor.id).await?;

    let mut body = vendor_json(&vendor);
    body["games"] = games
        .iter()
        .map(|g| {
            json!({
                "game_id": g.id,
                "name": g.name,
                "cover": g.cover_link,
            })
        })
        .collect();
    body["totalGames"] = json!(games.len());

    Ok(Json(body))
}
