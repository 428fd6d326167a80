// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cadenza Core - renewal daemon
//!
//! Opens the goal database, brings every goal up to date and then keeps
//! renewing goals on a schedule until interrupted.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use cadenza_core::config::Config;
use cadenza_core::goal_handlers::GoalHandlerState;
use cadenza_core::maintenance_worker::{MaintenanceWorker, MaintenanceWorkerConfig};
use cadenza_core::persistence::{GoalPersistence, SqlitePersistence};
use cadenza_core::time::{SystemTimeProvider, TimeProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cadenza_core=info".parse()?),
        )
        .init();

    info!("Starting Cadenza Core");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    let worker_config = MaintenanceWorkerConfig::from_env();

    let time = match config.utc_offset {
        Some(offset) => SystemTimeProvider::new(offset),
        None => SystemTimeProvider::local(),
    };

    info!(
        database_url = %config.database_url,
        utc_offset = %time.local_offset(),
        sort_mode = %config.sort_preference.mode,
        "Configuration loaded"
    );

    let persistence = Arc::new(SqlitePersistence::connect(&config.sqlite_url()).await?);
    persistence.health_check_db().await?;
    info!("Database ready");

    let state = Arc::new(GoalHandlerState::new(
        persistence.clone(),
        persistence.clone(),
        Arc::new(time),
    ));

    let worker = Arc::new(MaintenanceWorker::new(state, worker_config));

    // Catch up on everything that went outdated while we were not running
    let summary = worker.run_once().await?;
    info!(
        finalized = summary.finalized,
        renewed = summary.renewed,
        archived = summary.archived,
        "Initial renewal pass completed"
    );

    let shutdown = worker.shutdown_handle();
    let worker_handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    shutdown.notify_one();
    if let Err(e) = worker_handle.await {
        error!("Maintenance worker task failed: {}", e);
    }

    persistence.pool().close().await;
    info!("Shutdown complete");

    Ok(())
}
