// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for cadenza-core.
//!
//! Applications embedding the engine can run these to set up the goal schema
//! on a pool they manage themselves.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::SqlitePool;
//! use cadenza_core::migrations;
//!
//! let pool = SqlitePool::connect("sqlite:cadenza.db?mode=rwc").await?;
//! migrations::run_sqlite(&pool).await?;
//! ```

use sqlx::migrate::MigrateError;

/// SQLite migrator with all goal migrations embedded.
pub static SQLITE: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// Run SQLite migrations.
///
/// Applies all pending migrations to the database. Safe to call multiple times;
/// already-applied migrations are skipped.
pub async fn run_sqlite(pool: &sqlx::SqlitePool) -> Result<(), MigrateError> {
    SQLITE.run(pool).await
}
