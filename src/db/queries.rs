// Catalog and ownership queries.
//
// Record keys cross this boundary as plain strings; links are rebuilt with
// `type::thing` inside each statement. Every listing projects `created_at`
// so it can order by insertion.

use anyhow::{Result, anyhow};
use surrealdb::{Surreal, engine::any::Any};

use crate::db::schema::*;

const VENDOR_FIELDS: &str = r#"
    record::id(id) AS id,
    name,
    distributor,
    publisher,
    developer,
    release_date,
    created_at
"#;

const GAME_FIELDS: &str = r#"
    record::id(id) AS id,
    name,
    price,
    rating,
    platform,
    genre,
    cover_link,
    record::id(vendor) AS vendor,
    created_at
"#;

const MY_GAME_FIELDS: &str = r#"
    record::id(id) AS id,
    record::id(owner) AS owner,
    record::id(game) AS game,
    record::id(vendor) AS vendor,
    purchased_on,
    play_status,
    created_at
"#;

const OWNED_GAME_FIELDS: &str = r#"
    record::id(id) AS list_id,
    record::id(game) AS game_id,
    game.name AS name,
    game.platform AS platform,
    game.genre AS genres,
    game.cover_link AS cover,
    record::id(vendor) AS vendor_id,
    vendor.name AS vendor_name,
    vendor.distributor AS vendor_distributor,
    purchased_on,
    play_status,
    created_at
"#;

pub struct QueryBuilder;

impl QueryBuilder {
    // ----- vendors -----

    pub async fn list_vendors(db: &Surreal<Any>) -> Result<Vec<VendorRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {VENDOR_FIELDS} FROM vendor ORDER BY created_at ASC"
            ))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn find_vendor(db: &Surreal<Any>, id: &str) -> Result<Option<VendorRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {VENDOR_FIELDS} FROM type::thing('vendor', $id)"
            ))
            .bind(("id", id.to_string()))
            .await?;
        let vendors: Vec<VendorRecord> = res.take(0)?;
        Ok(vendors.into_iter().next())
    }

    pub async fn create_vendor(db: &Surreal<Any>, data: &VendorWrite) -> Result<VendorRecord> {
        let mut res = db
            .query(
                r#"
                LET $created = CREATE ONLY vendor SET
                    name = $name,
                    distributor = $distributor,
                    publisher = $publisher,
                    developer = $developer,
                    release_date = $release_date;
                RETURN record::id($created.id);
                "#,
            )
            .bind(("name", data.name.clone()))
            .bind(("distributor", data.distributor.clone()))
            .bind(("publisher", data.publisher.clone()))
            .bind(("developer", data.developer.clone()))
            .bind(("release_date", data.release_date.to_rfc3339()))
            .await?
            .check()?;

        let id: Option<String> = res.take(1)?;
        let id = id.ok_or_else(|| anyhow!("failed to create vendor record"))?;
        Self::find_vendor(db, &id)
            .await?
            .ok_or_else(|| anyhow!("created vendor {} not readable", id))
    }

    pub async fn update_vendor(
        db: &Surreal<Any>,
        id: &str,
        data: &VendorWrite,
    ) -> Result<Option<VendorRecord>> {
        db.query(
            r#"
            UPDATE type::thing('vendor', $id) SET
                name = $name,
                distributor = $distributor,
                publisher = $publisher,
                developer = $developer,
                release_date = $release_date
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("name", data.name.clone()))
        .bind(("distributor", data.distributor.clone()))
        .bind(("publisher", data.publisher.clone()))
        .bind(("developer", data.developer.clone()))
        .bind(("release_date", data.release_date.to_rfc3339()))
        .await?
        .check()?;

        Self::find_vendor(db, id).await
    }

    /// Delete a vendor together with its games and every ownership record
    /// pointing at either.
    pub async fn delete_vendor(db: &Surreal<Any>, id: &str) -> Result<()> {
        db.query(
            r#"
            BEGIN TRANSACTION;
            LET $vendor = type::thing('vendor', $id);
            DELETE my_game WHERE vendor = $vendor OR game.vendor = $vendor;
            DELETE game WHERE vendor = $vendor;
            DELETE $vendor;
            COMMIT TRANSACTION;
            "#,
        )
        .bind(("id", id.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    // ----- games -----

    pub async fn list_games(db: &Surreal<Any>) -> Result<Vec<GameRecord>> {
        let mut res = db
            .query(format!("SELECT {GAME_FIELDS} FROM game ORDER BY created_at ASC"))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn list_games_by_vendor(
        db: &Surreal<Any>,
        vendor_id: &str,
    ) -> Result<Vec<GameRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {GAME_FIELDS} FROM game \
                 WHERE vendor = type::thing('vendor', $vendor) \
                 ORDER BY created_at ASC"
            ))
            .bind(("vendor", vendor_id.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    pub async fn find_game(db: &Surreal<Any>, id: &str) -> Result<Option<GameRecord>> {
        let mut res = db
            .query(format!("SELECT {GAME_FIELDS} FROM type::thing('game', $id)"))
            .bind(("id", id.to_string()))
            .await?;
        let games: Vec<GameRecord> = res.take(0)?;
        Ok(games.into_iter().next())
    }

    /// Whether another game (other than `except`) already uses `name`.
    pub async fn game_name_taken(
        db: &Surreal<Any>,
        name: &str,
        except: Option<&str>,
    ) -> Result<bool> {
        let mut res = db
            .query("SELECT VALUE record::id(id) FROM game WHERE name = $name")
            .bind(("name", name.to_string()))
            .await?;
        let ids: Vec<String> = res.take(0)?;
        Ok(ids.iter().any(|found| Some(found.as_str()) != except))
    }

    pub async fn create_game(
        db: &Surreal<Any>,
        vendor_id: &str,
        data: &GameFields,
    ) -> Result<GameRecord> {
        let mut res = db
            .query(
                r#"
                LET $created = CREATE ONLY game SET
                    name = $name,
                    price = $price,
                    rating = $rating,
                    platform = $platform,
                    genre = $genre,
                    cover_link = $cover_link,
                    vendor = type::thing('vendor', $vendor);
                RETURN record::id($created.id);
                "#,
            )
            .bind(("name", data.name.clone()))
            .bind(("price", data.price))
            .bind(("rating", data.rating))
            .bind(("platform", data.platform.clone()))
            .bind(("genre", data.genre.clone()))
            .bind(("cover_link", data.cover_link.clone()))
            .bind(("vendor", vendor_id.to_string()))
            .await?
            .check()?;

        let id: Option<String> = res.take(1)?;
        let id = id.ok_or_else(|| anyhow!("failed to create game record"))?;
        Self::find_game(db, &id)
            .await?
            .ok_or_else(|| anyhow!("created game {} not readable", id))
    }

    pub async fn update_game(
        db: &Surreal<Any>,
        id: &str,
        data: &GameFields,
    ) -> Result<Option<GameRecord>> {
        db.query(
            r#"
            UPDATE type::thing('game', $id) SET
                name = $name,
                price = $price,
                rating = $rating,
                platform = $platform,
                genre = $genre,
                cover_link = $cover_link
            RETURN NONE
            "#,
        )
        .bind(("id", id.to_string()))
        .bind(("name", data.name.clone()))
        .bind(("price", data.price))
        .bind(("rating", data.rating))
        .bind(("platform", data.platform.clone()))
        .bind(("genre", data.genre.clone()))
        .bind(("cover_link", data.cover_link.clone()))
        .await?
        .check()?;

        Self::find_game(db, id).await
    }

    /// Delete a game and every ownership record pointing at it.
    pub async fn delete_game(db: &Surreal<Any>, id: &str) -> Result<()> {
        db.query(
            r#"
            BEGIN TRANSACTION;
            LET $game = type::thing('game', $id);
            DELETE my_game WHERE game = $game;
            DELETE $game;
            COMMIT TRANSACTION;
            "#,
        )
        .bind(("id", id.to_string()))
        .await?
        .check()?;
        Ok(())
    }

    // ----- ownership -----

    pub async fn list_owned_games(db: &Surreal<Any>, owner: &str) -> Result<Vec<OwnedGameRow>> {
        let mut res = db
            .query(format!(
                "SELECT {OWNED_GAME_FIELDS} FROM my_game \
                 WHERE owner = type::thing('user', $owner) \
                 ORDER BY created_at ASC"
            ))
            .bind(("owner", owner.to_string()))
            .await?;
        Ok(res.take(0)?)
    }

    /// Find an ownership record, only if it belongs to `owner`.
    pub async fn find_owned_game(
        db: &Surreal<Any>,
        owner: &str,
        id: &str,
    ) -> Result<Option<MyGameRecord>> {
        let mut res = db
            .query(format!(
                "SELECT {MY_GAME_FIELDS} FROM type::thing('my_game', $id) \
                 WHERE owner = type::thing('user', $owner)"
            ))
            .bind(("id", id.to_string()))
            .bind(("owner", owner.to_string()))
            .await?;
        let records: Vec<MyGameRecord> = res.take(0)?;
        Ok(records.into_iter().next())
    }

    pub async fn owns_game(db: &Surreal<Any>, owner: &str, game_id: &str) -> Result<bool> {
        let mut res = db
            .query(
                "SELECT VALUE record::id(id) FROM my_game \
                 WHERE owner = type::thing('user', $owner) \
                 AND game = type::thing('game', $game)",
            )
            .bind(("owner", owner.to_string()))
            .bind(("game", game_id.to_string()))
            .await?;
        let ids: Vec<String> = res.take(0)?;
        Ok(!ids.is_empty())
    }

    pub async fn create_owned_game(
        db: &Surreal<Any>,
        owner: &str,
        data: &MyGameCreate,
    ) -> Result<MyGameRecord> {
        let mut res = db
            .query(
                r#"
                LET $created = CREATE ONLY my_game SET
                    owner = type::thing('user', $owner),
                    game = type::thing('game', $game),
                    vendor = type::thing('vendor', $vendor),
                    purchased_on = $purchased_on,
                    play_status = false;
                RETURN record::id($created.id);
                "#,
            )
            .bind(("owner", owner.to_string()))
            .bind(("game", data.game_id.clone()))
            .bind(("vendor", data.vendor_id.clone()))
            .bind(("purchased_on", data.purchased_on.to_rfc3339()))
            .await?
            .check()?;

        let id: Option<String> = res.take(1)?;
        let id = id.ok_or_else(|| anyhow!("failed to create ownership record"))?;
        Self::find_owned_game(db, owner, &id)
            .await?
            .ok_or_else(|| anyhow!("created ownership record {} not readable", id))
    }

    pub async fn set_play_status(
        db: &Surreal<Any>,
        owner: &str,
        id: &str,
        play_status: bool,
    ) -> Result<Option<MyGameRecord>> {
        db.query(
            "UPDATE type::thing('my_game', $id) SET play_status = $play_status \
             WHERE owner = type::thing('user', $owner) RETURN NONE",
        )
        .bind(("id", id.to_string()))
        .bind(("owner", owner.to_string()))
        .bind(("play_status", play_status))
        .await?
        .check()?;

        Self::find_owned_game(db, owner, id).await
    }

    pub async fn delete_owned_game(db: &Surreal<Any>, owner: &str, id: &str) -> Result<()> {
        db.query(
            "DELETE type::thing('my_game', $id) WHERE owner = type::thing('user', $owner)",
        )
        .bind(("id", id.to_string()))
        .bind(("owner", owner.to_string()))
        .await?
        .check()?;
        Ok(())
    }
}
