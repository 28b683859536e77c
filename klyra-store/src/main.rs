//! `klyra-store` — in-memory board store served over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Empty store on 127.0.0.1:9400
//! klyra-store
//!
//! # Load projects from a seed file
//! klyra-store --seed boards.toml --bind 0.0.0.0:9400
//! ```

use std::sync::Arc;

use clap::Parser;
use klyra_store::config::{StoreCliArgs, StoreConfig};
use klyra_store::seed::Seed;
use klyra_store::server::{self, StoreState};
use klyra_store::store::BoardDb;

#[tokio::main]
async fn main() {
    let cli = StoreCliArgs::parse();

    let config = match StoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let db = match config.seed_file.as_deref() {
        Some(path) => match Seed::load(path).and_then(BoardDb::from_seed) {
            Ok(db) => db,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load seed");
                std::process::exit(1);
            }
        },
        None => BoardDb::new(),
    };

    tracing::info!(addr = %config.bind_addr, "starting klyra store");
    let state = Arc::new(StoreState::with_config(db, config.max_frame_size));

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "store listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "store server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start store server");
            std::process::exit(1);
        }
    }
}
