// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Practice progress towards goal instances.
//!
//! Progress is the sum of the practice sections starting inside an instance's
//! window: from its start to its end timestamp, or to the computed end of its
//! period while it is still open. Item-specific goals only count sections on
//! their library items.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::chain::instance_window;
use crate::error::Result;
use crate::models::{GoalInstanceWithDescriptionAndItems, GoalType, PracticeSection};
use crate::persistence::SessionSource;
use crate::time::TimeProvider;

/// Practiced time for one goal instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    /// The instance progress was computed for.
    pub instance_id: Uuid,
    /// Practice counted towards the instance.
    pub practiced: Duration,
    /// The instance's target.
    pub target: Duration,
}

impl GoalProgress {
    /// Whether the target has been reached.
    pub fn achieved(&self) -> bool {
        self.practiced >= self.target
    }
}

/// Sum the sections that count towards `goal`.
///
/// Sections outside the instance window are ignored, so the caller may pass a
/// superset covering several goals.
///
/// # Errors
///
/// [`crate::error::CoreError::IllegalState`] if the window of an open
/// instance cannot be computed.
pub fn calculate_progress(
    goal: &GoalInstanceWithDescriptionAndItems,
    sections: &[PracticeSection],
    offset: FixedOffset,
) -> Result<GoalProgress> {
    let (start, end) = instance_window(&goal.instance, &goal.description, offset)?;
    let items: Option<HashSet<Uuid>> = match goal.description.goal_type {
        GoalType::ItemSpecific => Some(goal.library_item_ids.iter().copied().collect()),
        GoalType::NonSpecific => None,
    };

    let practiced = sections
        .iter()
        .filter(|s| s.start_timestamp >= start && s.start_timestamp < end)
        .filter(|s| items.as_ref().is_none_or(|ids| ids.contains(&s.library_item_id)))
        .map(|s| s.duration)
        .sum();

    Ok(GoalProgress {
        instance_id: goal.instance.id,
        practiced,
        target: goal.instance.target,
    })
}

/// Computes progress from recorded practice.
pub struct ProgressCalculator {
    sessions: Arc<dyn SessionSource>,
    time: Arc<dyn TimeProvider>,
}

impl ProgressCalculator {
    /// Create a calculator over a practice source.
    pub fn new(sessions: Arc<dyn SessionSource>, time: Arc<dyn TimeProvider>) -> Self {
        Self { sessions, time }
    }

    /// Progress of every goal, in the order given.
    #[instrument(skip(self, goals), fields(count = goals.len()))]
    pub async fn progress(
        &self,
        goals: &[GoalInstanceWithDescriptionAndItems],
    ) -> Result<Vec<GoalProgress>> {
        let offset = self.time.local_offset();
        let windows = goals
            .iter()
            .map(|g| instance_window(&g.instance, &g.description, offset))
            .collect::<Result<Vec<_>>>()?;

        let (Some(start), Some(end)) = (
            windows.iter().map(|(start, _)| *start).min(),
            windows.iter().map(|(_, end)| *end).max(),
        ) else {
            return Ok(Vec::new());
        };

        let sections = self.sessions.sections_in_range(start, end).await?;
        debug!(sections = sections.len(), %start, %end, "Loaded practice sections");

        goals
            .iter()
            .map(|goal| calculate_progress(goal, &sections, offset))
            .collect()
    }

    /// Stream of [`Self::progress`] results, emitted once immediately and
    /// again whenever practice data changes.
    pub fn watch_progress(
        self: Arc<Self>,
        goals: Vec<GoalInstanceWithDescriptionAndItems>,
    ) -> impl Stream<Item = Result<Vec<GoalProgress>>> + Send {
        let revisions = self.sessions.subscribe_sections();

        stream::unfold(
            (self, goals, revisions, true),
            |(calculator, goals, mut revisions, first)| async move {
                if !first && revisions.changed().await.is_err() {
                    return None;
                }
                let _ = revisions.borrow_and_update();

                let snapshot = calculator.progress(&goals).await;
                Some((snapshot, (calculator, goals, revisions, false)))
            },
        )
    }
}
