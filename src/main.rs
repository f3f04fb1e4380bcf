use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use arena_sync::client::HttpApiClient;
use arena_sync::config::Config;
use arena_sync::db::gateway::SqliteGateway;
use arena_sync::error::Result;
use arena_sync::orchestrator::Orchestrator;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite:{}?mode=rwc", cfg.db_path))
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let client = Arc::new(HttpApiClient::new(
        &cfg.api_base_url,
        cfg.page_size,
        cfg.http_timeout(),
    )?);
    let gateway = Arc::new(SqliteGateway::new(pool));

    info!(
        api = %cfg.api_base_url,
        match_interval_mins = cfg.match_poll_interval_mins,
        catalog_interval_mins = cfg.catalog_poll_interval_mins,
        http_timeout_secs = cfg.http_timeout_secs,
        "Starting sync: backfill first, then incremental polling",
    );

    let mut orchestrator = Orchestrator::new(cfg, client, gateway);
    orchestrator.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping pollers");
    orchestrator.stop().await;

    Ok(())
}
