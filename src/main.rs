use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use resource_tree_api::config::{self, AppConfig};
use resource_tree_api::database::DatabaseManager;
use resource_tree_api::events::EventBus;
use resource_tree_api::{router, AppState};

#[derive(Parser)]
#[command(name = "resource-tree-api")]
#[command(about = "Multi-tenant hierarchical resource API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Override SERVER_PORT")]
        port: Option<u16>,
    },

    #[command(about = "Apply the database schema and exit")]
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL and friends
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::config();
    tracing::info!("Starting Resource Tree API in {:?} mode", config.environment);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Migrate => {
            DatabaseManager::migrate(&config.database)
                .await
                .context("failed to apply schema")?;
            tracing::info!("Schema is up to date");
            Ok(())
        }
    }
}

async fn serve(config: &AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    let backend = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect storage backend")?;

    let state = AppState::new(backend, Arc::new(EventBus::default()), &config.access);
    let mut app = router(state);
    if config.server.enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    let bind_addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Resource Tree API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
