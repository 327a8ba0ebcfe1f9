use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted representation of a game vendor (table: `vendor`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRecord {
    /// Record key, surfaced in URLs as `/api/vendor/{id}`.
    pub id: String,
    pub name: String,
    pub distributor: String,
    pub publisher: String,
    pub developer: String,
    /// RFC 3339 timestamp.
    pub release_date: String,
}

/// Payload used to create or replace a vendor.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorWrite {
    pub name: String,
    pub distributor: String,
    pub publisher: String,
    pub developer: String,
    pub release_date: DateTime<Utc>,
}

/// Persisted representation of a catalog game (table: `game`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    /// Unique across the catalog.
    pub name: String,
    pub price: i64,
    pub rating: i64,
    pub platform: Vec<String>,
    pub genre: Vec<String>,
    pub cover_link: Option<String>,
    /// Key of the owning vendor.
    pub vendor: String,
}

/// Mutable attributes of a game. The vendor link is fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GameFields {
    pub name: String,
    pub price: i64,
    pub rating: i64,
    pub platform: Vec<String>,
    pub genre: Vec<String>,
    pub cover_link: String,
}

/// A user's ownership of one game (table: `my_game`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyGameRecord {
    pub id: String,
    /// Key of the owning local user.
    pub owner: String,
    pub game: String,
    pub vendor: String,
    pub purchased_on: String,
    pub play_status: bool,
}

/// Payload used to record a newly owned game.
#[derive(Debug, Clone, PartialEq)]
pub struct MyGameCreate {
    pub game_id: String,
    pub vendor_id: String,
    pub purchased_on: DateTime<Utc>,
}

/// Ownership record joined with its game and vendor, as listed to users.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OwnedGameRow {
    pub list_id: String,
    pub game_id: String,
    pub name: String,
    pub platform: Vec<String>,
    pub genres: Vec<String>,
    pub cover: Option<String>,
    pub vendor_id: String,
    pub vendor_name: String,
    pub vendor_distributor: String,
    pub purchased_on: String,
    pub play_status: bool,
}
