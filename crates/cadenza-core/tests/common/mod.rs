// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for cadenza-core scenario tests.
//!
//! Provides TestContext wiring an in-memory store, a fake clock and every
//! handler state together.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use cadenza_core::goal_handlers::{AddGoalRequest, GoalHandlerState, handle_add_goal};
use cadenza_core::models::{
    GoalDescriptionCreationAttributes, GoalInstance, GoalInstanceCreationAttributes,
    GoalInstanceWithDescriptionAndItems, GoalPeriodUnit, GoalProgressType, GoalType,
    PracticeSection,
};
use cadenza_core::persistence::{GoalPersistence, SqlitePersistence};
use cadenza_core::progress::ProgressCalculator;
use cadenza_core::query_handlers::QueryHandlerState;
use cadenza_core::sorting::GoalSortPreference;
use cadenza_core::time::FakeTimeProvider;

/// Test context sharing one store and one clock between all handlers.
pub struct TestContext {
    pub persistence: Arc<SqlitePersistence>,
    pub time: Arc<FakeTimeProvider>,
    pub goals: Arc<GoalHandlerState>,
    pub queries: Arc<QueryHandlerState>,
    pub progress: Arc<ProgressCalculator>,
}

impl TestContext {
    /// Create a context over a fresh in-memory database with the clock at `now`.
    pub async fn new(now: DateTime<Utc>) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        cadenza_core::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        Self::with_persistence(Arc::new(SqlitePersistence::new(pool)), now)
    }

    /// Create a context over an existing store.
    pub fn with_persistence(persistence: Arc<SqlitePersistence>, now: DateTime<Utc>) -> Self {
        let time = Arc::new(FakeTimeProvider::new(now));
        let goals = Arc::new(GoalHandlerState::new(
            persistence.clone(),
            persistence.clone(),
            time.clone(),
        ));
        let queries = Arc::new(QueryHandlerState::new(
            persistence.clone(),
            Arc::new(GoalSortPreference::default()),
        ));
        let progress = Arc::new(ProgressCalculator::new(persistence.clone(), time.clone()));

        Self {
            persistence,
            time,
            goals,
            queries,
            progress,
        }
    }

    /// Add a goal and return its description id.
    pub async fn add(&self, request: AddGoalRequest) -> Uuid {
        handle_add_goal(&self.goals, request)
            .await
            .expect("Failed to add goal")
            .description
            .id
    }

    /// Add a repeating daily goal with the given target.
    pub async fn add_daily(&self, target_minutes: u64) -> Uuid {
        self.add(daily_goal(target_minutes)).await
    }

    /// Every instance of a goal, ordered by start.
    pub async fn instances(&self, description_id: Uuid) -> Vec<GoalInstance> {
        let mut instances = self
            .persistence
            .get_goal(description_id)
            .await
            .expect("Failed to load goal")
            .expect("Goal should exist")
            .instances;
        instances.sort_by_key(|i| i.start_timestamp);
        instances
    }

    /// Record a library item named after its id.
    pub async fn add_library_item(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.persistence
            .insert_library_item(id, &format!("item-{}", id), self.time_now())
            .await
            .expect("Failed to insert library item");
        id
    }

    /// Record practice on `item`.
    pub async fn practice(&self, item: Uuid, start: DateTime<Utc>, minutes: u64) {
        self.persistence
            .insert_section(&PracticeSection {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                library_item_id: item,
                start_timestamp: start,
                duration: Duration::from_secs(minutes * 60),
            })
            .await
            .expect("Failed to insert practice section");
    }

    /// Latest instances of every goal, including archived ones.
    pub async fn latest(&self) -> Vec<GoalInstanceWithDescriptionAndItems> {
        self.persistence
            .list_latest_instances()
            .await
            .expect("Failed to list latest instances")
    }

    fn time_now(&self) -> DateTime<Utc> {
        use cadenza_core::time::TimeProvider;
        self.time.now()
    }
}

/// A UTC timestamp.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

/// `2024-01-10T15:00Z`, a Wednesday afternoon.
pub fn wednesday_afternoon() -> DateTime<Utc> {
    at(2024, 1, 10, 15, 0)
}

pub fn minutes(count: u64) -> Duration {
    Duration::from_secs(count * 60)
}

/// A repeating, non-specific, one-day goal.
pub fn daily_goal(target_minutes: u64) -> AddGoalRequest {
    AddGoalRequest {
        description: GoalDescriptionCreationAttributes {
            goal_type: GoalType::NonSpecific,
            repeat: true,
            period_in_period_units: 1,
            period_unit: GoalPeriodUnit::Day,
            progress_type: GoalProgressType::Time,
        },
        instance: GoalInstanceCreationAttributes::new(minutes(target_minutes)),
        library_item_ids: Vec::new(),
    }
}

/// An item-specific goal over `items`.
pub fn item_goal(target_minutes: u64, items: Vec<Uuid>) -> AddGoalRequest {
    let mut request = daily_goal(target_minutes);
    request.description.goal_type = GoalType::ItemSpecific;
    request.library_item_ids = items;
    request
}
