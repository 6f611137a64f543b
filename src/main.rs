use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warp::Filter;

mod address;
mod cache;
mod config;
mod dashboard;
mod error;
mod filter;
mod gc;
mod geocode;
mod persistence;
mod presentation;
mod server;
mod source;
mod state;
mod table;

use cache::SystemClock;
use config::Config;
use persistence::{load_geocodes, save_geocodes};
use state::LiveState;

const PERSIST_EVERY: Duration = Duration::from_secs(60);
const GC_EVERY: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Config and state
    let cfg = Config::load()?;
    info!(table = %cfg.table_name, port = cfg.port, "Starting bus stop dashboard");
    let state = Arc::new(LiveState::live(&cfg, Arc::new(SystemClock))?);

    // 2. Warm the geocode cache from disk
    if let Err(e) = load_geocodes(&state.geocodes, &cfg.data_dir) {
        warn!("Failed to load saved geocodes: {:#}", e);
    }

    // 3. Persistence loop
    let state_persist = state.clone();
    let data_dir = cfg.data_dir.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(PERSIST_EVERY).await;
            if let Err(e) = save_geocodes(&state_persist.geocodes, &data_dir) {
                error!("Error saving geocodes: {:#}", e);
            }
        }
    });

    // 4. Cache GC loop
    let state_gc = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(GC_EVERY).await;
            gc::purge_expired(&*state_gc);
        }
    });

    // 5. HTTP server
    let routes = server::routes(state.clone()).with(warp::trace::request());
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], cfg.port), async {
            let _ = tokio::signal::ctrl_c().await;
        })?;
    info!("Server running at http://{}", addr);
    server.await;

    info!("Shutting down, saving geocodes");
    save_geocodes(&state.geocodes, &cfg.data_dir)?;
    Ok(())
}
