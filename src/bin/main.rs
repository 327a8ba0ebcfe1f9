use anyhow::Result;
use clap::{Parser, Subcommand};
use gamelist_backend::{
    AppConfig, AppState, DatabaseConfig, DeploymentMode, create_connection, create_router,
    ensure_schema,
};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gamelist-backend")]
#[command(about = "Game catalog and ownership tracker REST backend")]
struct Cli {
    /// Deployment mode; development also reads a local `.env` file
    #[arg(long, env = "APP_ENV", default_value = "development", global = true)]
    mode: DeploymentMode,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST server
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
        /// Overrides SURREALDB_URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gamelist_backend=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, db_url } => {
            let mut config = AppConfig::load(cli.mode)?;
            if let Some(url) = db_url {
                config.database.url = url;
            }
            info!(mode = ?config.mode, "Starting gamelist backend on {}", bind);
            info!("Using database url: {}", config.database.url);

            let db = create_connection(config.database.clone()).await?;
            ensure_schema(&db).await?;

            let state = AppState::new(db, &config.identity_provider)?;
            let app = create_router(state);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            if cli.mode == DeploymentMode::Development {
                dotenv::dotenv().ok();
            }
            let mut db_config = DatabaseConfig::default();
            if let Some(url) = db_url {
                db_config.url = url;
            }
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = create_connection(db_config).await?;
            ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}
