// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cadenza Core - Goal Lifecycle Engine
//!
//! This crate owns the rules for practice goals: how a goal description
//! produces a chain of time-bounded goal instances, how that chain advances as
//! time passes, and how archiving, pausing and editing change it without
//! corrupting history.
//!
//! # Data Model
//!
//! ```text
//!  GoalDescription (repeat, period, paused, archived, ...)
//!        │ owns
//!        ▼
//!  ┌──────────┐  previous  ┌──────────┐  previous  ┌──────────┐
//!  │ first    │◄───────────│ instance │◄───────────│ latest   │
//!  │ end: set │            │ end: set │            │ end: NULL│
//!  └──────────┘            └──────────┘            └──────────┘
//! ```
//!
//! Instances only point backwards. The first instance is never deleted, start
//! timestamps strictly increase along the chain, and exactly one instance per
//! goal is open.
//!
//! # Operations
//!
//! | Operation | Handler |
//! |-----------|---------|
//! | `AddGoal` | [`goal_handlers::handle_add_goal`] |
//! | `ArchiveGoals` | [`goal_handlers::handle_archive_goals`] |
//! | `UnarchiveGoals` | [`goal_handlers::handle_unarchive_goals`] |
//! | `CleanFutureGoalInstances` | [`goal_handlers::handle_clean_future_goal_instances`] |
//! | `UpdateOutdatedGoals` | [`goal_handlers::handle_update_outdated_goals`] |
//! | `EditGoal` | [`goal_handlers::handle_edit_goal`] |
//! | `PauseGoals` / `UnpauseGoals` | [`goal_handlers::handle_pause_goals`] / [`goal_handlers::handle_unpause_goals`] |
//! | `DeleteGoals` / `RestoreGoals` | [`goal_handlers::handle_delete_goals`] / [`goal_handlers::handle_restore_goals`] |
//!
//! Every operation runs in a single storage transaction.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CADENZA_DATABASE_URL` | Yes | - | SQLite connection string or file path |
//! | `CADENZA_UTC_OFFSET_MINUTES` | No | host offset | Local zone for period boundaries |
//! | `CADENZA_GOAL_SORT_MODE` | No | `date_added` | Goal list ordering |
//! | `CADENZA_GOAL_SORT_DIRECTION` | No | `descending` | Goal list direction |
//! | `CADENZA_MAINTENANCE_ENABLED` | No | `true` | Run the renewal worker |
//! | `CADENZA_MAINTENANCE_POLL_INTERVAL_SECS` | No | `60` | Seconds between renewal passes |
//! | `CADENZA_PURGE_DELETED_AFTER_DAYS` | No | `30` | Retention of deleted goals, `0` keeps them |

#![deny(missing_docs)]

/// Goal instance chains and their invariants.
pub mod chain;

/// Configuration loaded from environment variables.
pub mod config;

/// Error types for goal operations.
pub mod error;

/// Goal lifecycle use cases.
pub mod goal_handlers;

/// Background renewal and purge worker.
pub mod maintenance_worker;

/// Embedded database migrations.
pub mod migrations;

/// Goal descriptions, instances and their attribute sets.
pub mod models;

/// Storage gateway traits and the SQLite backend.
pub mod persistence;

/// Practice progress towards goal instances.
pub mod progress;

/// Read-side goal queries.
pub mod query_handlers;

/// Goal list ordering.
pub mod sorting;

/// Clock and calendar period arithmetic.
pub mod time;
