// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-side handlers for goals.
//!
//! These never write. Lists are ordered by the configured sort preference,
//! and [`watch_current_goals`] re-runs its query after every committed goal
//! write, emitting a full snapshot each time.

use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result, format_ids};
use crate::models::{
    GoalInstance, GoalInstanceWithDescription, GoalInstanceWithDescriptionAndItems,
};
use crate::persistence::{GoalPersistence, GoalRecord};
use crate::sorting::{SortPreferenceSource, sort_goals};

/// Shared state for query handlers.
pub struct QueryHandlerState {
    /// Goal storage.
    pub persistence: Arc<dyn GoalPersistence>,
    /// Ordering applied to goal lists.
    pub sort: Arc<dyn SortPreferenceSource>,
}

impl QueryHandlerState {
    /// Create query state from its collaborators.
    pub fn new(persistence: Arc<dyn GoalPersistence>, sort: Arc<dyn SortPreferenceSource>) -> Self {
        Self { persistence, sort }
    }
}

/// Every goal that is not deleted, with its instances in chain order.
#[instrument(skip(state))]
pub async fn get_all_goals(state: &QueryHandlerState) -> Result<Vec<GoalRecord>> {
    let mut goals = state.persistence.list_goals().await?;

    for goal in &mut goals {
        let ordered: Vec<GoalInstance> = goal.chain().in_order().into_iter().cloned().collect();
        if ordered.len() == goal.instances.len() {
            goal.instances = ordered;
        } else {
            warn!(
                description_id = %goal.description.id,
                "Goal chain does not reach every instance, ordering by start"
            );
            goal.instances.sort_by_key(|i| i.start_timestamp);
        }
    }

    sort_goals(&mut goals, state.sort.goal_sort_preference());
    debug!(count = goals.len(), "Listed goals");
    Ok(goals)
}

/// The latest instance of every goal that is not archived.
#[instrument(skip(state))]
pub async fn get_current_goals(
    state: &QueryHandlerState,
    exclude_paused: bool,
) -> Result<Vec<GoalInstanceWithDescriptionAndItems>> {
    let mut goals: Vec<_> = state
        .persistence
        .list_latest_instances()
        .await?
        .into_iter()
        .filter(|goal| !goal.description.archived)
        .filter(|goal| !(exclude_paused && goal.description.paused))
        .collect();

    sort_goals(&mut goals, state.sort.goal_sort_preference());
    Ok(goals)
}

/// The `count` most recently finalized instances, newest first.
#[instrument(skip(state))]
pub async fn get_last_completed_goals(
    state: &QueryHandlerState,
    count: usize,
) -> Result<Vec<GoalInstanceWithDescription>> {
    let limit = i64::try_from(count).unwrap_or(i64::MAX);
    state.persistence.list_finalized_instances(limit).await
}

/// One goal's instances from first to latest, after checking the chain is
/// intact.
///
/// # Errors
///
/// - [`CoreError::IllegalArgument`] if the goal does not exist or is deleted
/// - [`CoreError::IllegalState`] if its chain is corrupted
#[instrument(skip(state))]
pub async fn get_goal_history(
    state: &QueryHandlerState,
    description_id: Uuid,
) -> Result<Vec<GoalInstance>> {
    let record = state
        .persistence
        .get_goal(description_id)
        .await?
        .filter(|record| !record.description.is_deleted())
        .ok_or_else(|| {
            CoreError::illegal_argument(format!(
                "Could not find goal(s): {}",
                format_ids([&description_id])
            ))
        })?;

    let chain = record.chain();
    chain
        .verify()
        .map_err(|violation| CoreError::illegal_state(violation.to_string()))?;

    Ok(chain.in_order().into_iter().cloned().collect())
}

/// Stream of [`get_current_goals`] results, emitted once immediately and again
/// after every committed goal write.
pub fn watch_current_goals(
    state: Arc<QueryHandlerState>,
    exclude_paused: bool,
) -> impl Stream<Item = Result<Vec<GoalInstanceWithDescriptionAndItems>>> + Send {
    let revisions = state.persistence.subscribe_goals();

    stream::unfold(
        (state, revisions, true),
        move |(state, mut revisions, first)| async move {
            if !first && revisions.changed().await.is_err() {
                return None;
            }
            let _ = revisions.borrow_and_update();

            let snapshot = get_current_goals(&state, exclude_paused).await;
            Some((snapshot, (state, revisions, false)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;
    use crate::sorting::GoalSortPreference;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_state() -> QueryHandlerState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        crate::migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        QueryHandlerState::new(
            Arc::new(SqlitePersistence::new(pool)),
            Arc::new(GoalSortPreference::default()),
        )
    }

    #[tokio::test]
    async fn test_empty_store() {
        let state = test_state().await;
        assert!(get_all_goals(&state).await.unwrap().is_empty());
        assert!(get_current_goals(&state, false).await.unwrap().is_empty());
        assert!(get_last_completed_goals(&state, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_of_unknown_goal() {
        let state = test_state().await;
        let id = Uuid::new_v4();

        let err = get_goal_history(&state, id).await.unwrap_err();
        assert_eq!(err.error_code(), "ILLEGAL_ARGUMENT");
        assert!(err.to_string().contains(&id.to_string()));
    }
}
