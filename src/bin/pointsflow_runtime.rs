//! Pointsflow Runtime
//!
//! Wires the whole mirror into one process:
//! - runs schema migrations and opens the SQLite store
//! - builds the JSON-RPC chain reader and the shared rate limiter
//! - spawns the token, points and counter-watch triggers
//! - serves the HTTP API until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin pointsflow_runtime
//!
//! Environment variables (see `SyncConfig::from_env`):
//!   RPC_URL, CONTRACT_ADDRESS, POINTS_CONTRACT_ADDRESS, POINTSFLOW_DB_PATH (required)
//!   PORT, CALL_SPACING_MS, POINTS_ADDRESS_DELAY_MS, *_INTERVAL_MS, ... (optional)

use dotenv::dotenv;
use log::{error, info};
use pointsflow::api::{create_router, AppState};
use pointsflow::query::QueryService;
use pointsflow::sync::{
    run_schema_migrations, ChainReader, PointsSyncJob, PollTrigger, ProgressStore,
    RateLimitedScheduler, RecordStore, RpcChainReader, SqliteStore, SyncConfig, TokenSyncJob,
    TriggerIntervals,
};
use rusqlite::Connection;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Pointsflow Runtime");

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("✅ Configuration loaded");
    info!("   ├─ RPC: {}", config.rpc_url);
    info!("   ├─ Token contract: {}", config.token_contract);
    info!("   ├─ Points contract: {}", config.points_contract);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Call spacing: {}ms", config.call_spacing_ms);
    info!("   ├─ Points address delay: {}ms", config.points_address_delay_ms);
    info!("   └─ Points lock TTL: {}s", config.points_lock_ttl_secs);

    info!("🔧 Initializing database...");
    let mut conn = Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    drop(conn);

    let store = Arc::new(SqliteStore::new(&config.db_path)?.with_lock_ttl(config.points_lock_ttl()));
    let records: Arc<dyn RecordStore> = store.clone();
    let progress: Arc<dyn ProgressStore> = store;
    info!("✅ Database initialized");

    let chain: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(
        &config.rpc_url,
        &config.token_contract,
        &config.points_contract,
        config.rpc_timeout(),
    )?);
    let scheduler = Arc::new(RateLimitedScheduler::new(config.call_spacing()));

    let token_job = Arc::new(TokenSyncJob::new(
        chain.clone(),
        records.clone(),
        progress.clone(),
        scheduler.clone(),
    ));
    let points_job = Arc::new(PointsSyncJob::new(
        chain,
        records.clone(),
        progress.clone(),
        scheduler,
        config.points_address_delay(),
    ));

    let trigger = PollTrigger::new(
        token_job.clone(),
        points_job.clone(),
        TriggerIntervals::from_config(&config),
    );
    let trigger_handles = trigger.spawn();

    let state = AppState::new(
        Arc::new(QueryService::new(records, progress)),
        token_job,
        points_job,
    );
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("🌐 HTTP API listening on {}", listener.local_addr()?);
    info!("🔄 Press CTRL+C to shutdown gracefully");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in &trigger_handles {
        handle.abort();
    }

    info!("✅ Pointsflow runtime stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }
}
