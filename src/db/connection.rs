use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DatabaseConfig {
    /// Read `SURREALDB_*` keys through `lookup`, falling back to an in-memory store.
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            url: lookup("SURREALDB_URL").unwrap_or_else(|| "memory".to_string()),
            namespace: lookup("SURREALDB_NAMESPACE").unwrap_or_else(|| "gamelist".to_string()),
            database: lookup("SURREALDB_DATABASE").unwrap_or_else(|| "catalog".to_string()),
            username: lookup("SURREALDB_USERNAME"),
            password: lookup("SURREALDB_PASSWORD"),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables, defaults and unique indexes. Safe to run on every start.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Catalog
        "DEFINE TABLE IF NOT EXISTS vendor SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE vendor TYPE int DEFAULT time::nano(time::now());",
        "DEFINE TABLE IF NOT EXISTS game SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS vendor ON TABLE game TYPE record<vendor>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE game TYPE int DEFAULT time::nano(time::now());
         DEFINE INDEX IF NOT EXISTS game_name ON TABLE game COLUMNS name UNIQUE;
         DEFINE INDEX IF NOT EXISTS game_vendor ON TABLE game COLUMNS vendor;",
        // Ownership
        "DEFINE TABLE IF NOT EXISTS my_game SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS owner ON TABLE my_game TYPE record<user>;
         DEFINE FIELD IF NOT EXISTS game ON TABLE my_game TYPE record<game>;
         DEFINE FIELD IF NOT EXISTS vendor ON TABLE my_game TYPE record<vendor>;
         DEFINE FIELD IF NOT EXISTS play_status ON TABLE my_game TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE my_game TYPE int DEFAULT time::nano(time::now());
         DEFINE INDEX IF NOT EXISTS my_game_owner_game ON TABLE my_game COLUMNS owner, game UNIQUE;",
        // Local users mirrored from the identity provider
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE int DEFAULT time::nano(time::now());
         DEFINE INDEX IF NOT EXISTS user_username ON TABLE user COLUMNS username UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_picture ON TABLE user COLUMNS picture UNIQUE;",
        // Machine-to-machine token cache
        "DEFINE TABLE IF NOT EXISTS machine_token SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS expires_at ON TABLE machine_token TYPE int;
         DEFINE INDEX IF NOT EXISTS machine_token_expiry ON TABLE machine_token COLUMNS expires_at;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    debug!("Database schema ensured");
    Ok(())
}
