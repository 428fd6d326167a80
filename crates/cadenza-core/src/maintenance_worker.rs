// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that keeps goals current.
//!
//! Each pass:
//! 1. Renews, finalizes or archives every outdated goal
//! 2. Hard-deletes goals that were soft-deleted longer ago than the retention
//!    period (when a retention is configured)
//!
//! A failed pass is logged and the next one runs on schedule.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::error::{CoreError, Result};
use crate::goal_handlers::{GoalHandlerState, RenewalSummary, handle_update_outdated_goals};

/// Configuration for the maintenance worker.
#[derive(Debug, Clone)]
pub struct MaintenanceWorkerConfig {
    /// Whether the worker runs at all.
    pub enabled: bool,
    /// How often to run a pass.
    pub poll_interval: Duration,
    /// How long soft-deleted goals are kept; `None` keeps them forever.
    pub purge_deleted_after: Option<Duration>,
}

impl Default for MaintenanceWorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
            purge_deleted_after: Some(Duration::from_secs(30 * 24 * 3600)), // 30 days
        }
    }
}

impl MaintenanceWorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CADENZA_MAINTENANCE_ENABLED`: "false" or "0" to disable (default: true)
    /// - `CADENZA_MAINTENANCE_POLL_INTERVAL_SECS`: seconds between passes (default: 60)
    /// - `CADENZA_PURGE_DELETED_AFTER_DAYS`: days before deleted goals are purged,
    ///   0 disables purging (default: 30)
    pub fn from_env() -> Self {
        let enabled = std::env::var("CADENZA_MAINTENANCE_ENABLED")
            .map(|v| !(v == "false" || v == "0"))
            .unwrap_or(true);

        let poll_interval_secs = std::env::var("CADENZA_MAINTENANCE_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(60);

        let purge_days = std::env::var("CADENZA_PURGE_DELETED_AFTER_DAYS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        Self {
            enabled,
            poll_interval: Duration::from_secs(poll_interval_secs),
            purge_deleted_after: (purge_days > 0)
                .then(|| Duration::from_secs(purge_days * 24 * 3600)),
        }
    }
}

/// Background worker that periodically runs goal maintenance.
pub struct MaintenanceWorker {
    state: Arc<GoalHandlerState>,
    config: MaintenanceWorkerConfig,
    shutdown: Arc<Notify>,
}

impl MaintenanceWorker {
    /// Create a new maintenance worker.
    pub fn new(state: Arc<GoalHandlerState>, config: MaintenanceWorkerConfig) -> Self {
        Self {
            state,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the worker loop until the shutdown signal is received.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Goal maintenance worker disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            purge_after_days = self
                .config
                .purge_deleted_after
                .map(|d| d.as_secs() / 86400),
            "Goal maintenance worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Goal maintenance worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, code = e.error_code(), "Goal maintenance pass failed");
                    }
                }
            }
        }

        info!("Goal maintenance worker stopped");
    }

    /// Run a single maintenance pass.
    pub async fn run_once(&self) -> Result<RenewalSummary> {
        let summary = handle_update_outdated_goals(&self.state).await?;

        if let Some(retention) = self.config.purge_deleted_after {
            let cutoff = self.state.time.now()
                - chrono::Duration::from_std(retention).map_err(|e| {
                    CoreError::illegal_argument(format!("Invalid retention period: {}", e))
                })?;

            let purged = self.state.persistence.purge_deleted_goals(cutoff).await?;
            if purged > 0 {
                info!(purged, cutoff = %cutoff, "Purged deleted goals");
            } else {
                debug!("No deleted goals to purge");
            }
        }

        Ok(summary)
    }
}
