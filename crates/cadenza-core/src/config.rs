// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use chrono::FixedOffset;

use crate::sorting::{GoalSortMode, GoalSortPreference, SortDirection};

/// Cadenza Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL or database file path
    pub database_url: String,
    /// Local zone offset used for period boundaries; `None` uses the host's
    pub utc_offset: Option<FixedOffset>,
    /// Ordering applied to goal lists
    pub sort_preference: GoalSortPreference,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CADENZA_DATABASE_URL`: SQLite connection string or file path
    ///
    /// Optional (with defaults):
    /// - `CADENZA_UTC_OFFSET_MINUTES`: local offset east of UTC (default: host offset)
    /// - `CADENZA_GOAL_SORT_MODE`: `date_added`, `target`, `period` or `custom` (default: `date_added`)
    /// - `CADENZA_GOAL_SORT_DIRECTION`: `ascending` or `descending` (default: `descending`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("CADENZA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CADENZA_DATABASE_URL"))?;

        let utc_offset = match std::env::var("CADENZA_UTC_OFFSET_MINUTES") {
            Ok(raw) => {
                let minutes: i32 = raw.trim().parse().map_err(|_| {
                    ConfigError::Invalid("CADENZA_UTC_OFFSET_MINUTES", "must be an integer")
                })?;
                let offset = minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or(ConfigError::Invalid(
                        "CADENZA_UTC_OFFSET_MINUTES",
                        "must be within +/- 24 hours",
                    ))?;
                Some(offset)
            }
            Err(_) => None,
        };

        let mode: GoalSortMode = std::env::var("CADENZA_GOAL_SORT_MODE")
            .unwrap_or_else(|_| "date_added".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CADENZA_GOAL_SORT_MODE",
                    "must be one of date_added, target, period, custom",
                )
            })?;

        let direction: SortDirection = std::env::var("CADENZA_GOAL_SORT_DIRECTION")
            .unwrap_or_else(|_| "descending".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CADENZA_GOAL_SORT_DIRECTION",
                    "must be ascending or descending",
                )
            })?;

        Ok(Self {
            database_url,
            utc_offset,
            sort_preference: GoalSortPreference::new(mode, direction),
        })
    }

    /// `database_url` as a `sqlite:` URL; bare paths are opened read-write and
    /// created if missing.
    pub fn sqlite_url(&self) -> String {
        if self.database_url.starts_with("sqlite:") {
            self.database_url.clone()
        } else {
            format!("sqlite:{}?mode=rwc", self.database_url)
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
