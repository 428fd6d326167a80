// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Goal lifecycle handlers for cadenza-core.
//!
//! Every handler runs inside exactly one storage transaction: it validates its
//! input (collecting all violations of a batch before failing), mutates the
//! goal chains and commits. A failure at any point drops the transaction and
//! leaves storage untouched.
//!
//! The two convergence loops, [`handle_clean_future_goal_instances`] and
//! [`handle_update_outdated_goals`], re-read the latest instances through the
//! same transaction on every pass and fail with [`CoreError::IllegalState`] if
//! a pass sees exactly the same work as the one before it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::chain::end_of_instance;
use crate::error::{CoreError, Result, Violations, format_ids};
use crate::models::{
    GoalDescription, GoalDescriptionCreationAttributes, GoalDescriptionUpdateAttributes,
    GoalInstance, GoalInstanceCreationAttributes, GoalInstanceUpdateAttributes,
    GoalInstanceWithDescription, GoalInstanceWithDescriptionAndItems, GoalProgressType, GoalType,
};
use crate::persistence::{GoalPersistence, GoalTransaction, LibraryItemSource};
use crate::time::TimeProvider;

/// Longest period a goal may span, in period units.
pub const MAX_PERIOD_IN_PERIOD_UNITS: i32 = 1000;

/// Shared state for goal handlers.
pub struct GoalHandlerState {
    /// Goal storage.
    pub persistence: Arc<dyn GoalPersistence>,
    /// Library items that item-specific goals may reference.
    pub library_items: Arc<dyn LibraryItemSource>,
    /// Clock and local period boundaries.
    pub time: Arc<dyn TimeProvider>,
}

impl GoalHandlerState {
    /// Create handler state from its collaborators.
    pub fn new(
        persistence: Arc<dyn GoalPersistence>,
        library_items: Arc<dyn LibraryItemSource>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            persistence,
            library_items,
            time,
        }
    }
}

/// Input of [`handle_add_goal`].
#[derive(Debug, Clone)]
pub struct AddGoalRequest {
    /// The new description.
    pub description: GoalDescriptionCreationAttributes,
    /// The first instance.
    pub instance: GoalInstanceCreationAttributes,
    /// Library items for item-specific goals.
    pub library_item_ids: Vec<Uuid>,
}

/// Input of [`handle_edit_goal`].
#[derive(Debug, Clone)]
pub struct EditGoalRequest {
    /// The goal to edit.
    pub description_id: Uuid,
    /// Changes to the description.
    pub description: Option<GoalDescriptionUpdateAttributes>,
    /// Changes to the goal's current instance.
    pub instance: Option<GoalInstanceUpdateAttributes>,
}

/// What a renewal pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalSummary {
    /// Outdated instances of archived goals that were finalized.
    pub finalized: usize,
    /// Instances of repeating goals that got a successor.
    pub renewed: usize,
    /// One-shot goals that were archived.
    pub archived: usize,
}

impl RenewalSummary {
    /// Whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.finalized == 0 && self.renewed == 0 && self.archived == 0
    }
}

// ============================================================================
// Adding
// ============================================================================

/// Create a goal description together with its first instance.
///
/// The first instance starts at the beginning of the current period, so every
/// goal added during the same day (week, month) shares one period boundary.
///
/// # Errors
///
/// - [`CoreError::InvalidGoalDescription`] for a period outside
///   `1..=MAX_PERIOD_IN_PERIOD_UNITS` or a library item list that does not fit
///   the goal type
/// - [`CoreError::InvalidGoalInstance`] for a zero target
/// - [`CoreError::IllegalArgument`] if the caller pre-set engine-assigned fields
/// - [`CoreError::NotImplemented`] for session-count goals
#[instrument(skip(state, request), fields(goal_type = ?request.description.goal_type))]
pub async fn handle_add_goal(
    state: &GoalHandlerState,
    request: AddGoalRequest,
) -> Result<GoalInstanceWithDescriptionAndItems> {
    let AddGoalRequest {
        description: attributes,
        instance: first,
        library_item_ids,
    } = request;

    if attributes.period_in_period_units <= 0 {
        return Err(CoreError::invalid_description(
            "Period in period units must be greater than 0",
        ));
    }
    if attributes.period_in_period_units > MAX_PERIOD_IN_PERIOD_UNITS {
        return Err(CoreError::invalid_description(format!(
            "Period in period units must be at most {}",
            MAX_PERIOD_IN_PERIOD_UNITS
        )));
    }
    validate_target(first.target)?;
    if first.start_timestamp.is_some() {
        return Err(CoreError::illegal_argument(
            "Start timestamp of the first instance is assigned by the engine",
        ));
    }
    if first.description_id.is_some() {
        return Err(CoreError::illegal_argument(
            "Description id of the first instance is assigned by the engine",
        ));
    }

    let library_item_ids = dedup(&library_item_ids);
    match attributes.goal_type {
        GoalType::NonSpecific if !library_item_ids.is_empty() => {
            return Err(CoreError::invalid_description(
                "Library items must be empty for non-specific goals",
            ));
        }
        GoalType::ItemSpecific if library_item_ids.is_empty() => {
            return Err(CoreError::invalid_description(
                "Item specific goals must have at least one library item",
            ));
        }
        _ => {}
    }
    if !library_item_ids.is_empty() {
        let existing = state.library_items.existing_library_item_ids().await?;
        let missing: Vec<Uuid> = library_item_ids
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::invalid_description(format!(
                "Library items do not exist: {}",
                format_ids(&missing)
            )));
        }
    }

    if attributes.progress_type == GoalProgressType::SessionCount {
        return Err(CoreError::NotImplemented {
            feature: "Session count goals".to_string(),
        });
    }

    let now = state.time.now();
    let description = GoalDescription {
        id: Uuid::new_v4(),
        goal_type: attributes.goal_type,
        repeat: attributes.repeat,
        period_in_period_units: attributes.period_in_period_units,
        period_unit: attributes.period_unit,
        progress_type: attributes.progress_type,
        paused: false,
        archived: false,
        custom_order: None,
        created_at: now,
        modified_at: now,
        deleted_at: None,
    };
    let instance = GoalInstance {
        id: Uuid::new_v4(),
        description_id: description.id,
        previous_instance_id: None,
        start_timestamp: state.time.start_of_period(description.period_unit, now),
        target: first.target,
        end_timestamp: None,
        created_at: now,
        modified_at: now,
    };

    let mut tx = state.persistence.begin().await?;
    tx.insert_description(&description, &library_item_ids)
        .await?;
    tx.insert_instance(&instance).await?;
    tx.commit().await?;

    info!(
        description_id = %description.id,
        start = %instance.start_timestamp,
        target_secs = instance.target.as_secs(),
        "Goal added"
    );

    Ok(GoalInstanceWithDescriptionAndItems {
        instance,
        description,
        library_item_ids,
    })
}

// ============================================================================
// Archiving
// ============================================================================

/// Archive goals.
///
/// Future instances are cleaned up first. Paused goals then lose their open
/// instance unless it is their first one, so no unused period is kept.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist, is
/// already archived or has no open instance.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_archive_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    archive_in(tx.as_mut(), &dedup(ids), now).await?;
    tx.commit().await
}

async fn archive_in(tx: &mut dyn GoalTransaction, ids: &[Uuid], now: DateTime<Utc>) -> Result<()> {
    let targets = load_targets(tx, ids, false).await?;

    let mut already_archived = Vec::new();
    let mut not_open = Vec::new();
    for description in &targets.found {
        if description.archived {
            already_archived.push(description.id);
        } else if !tx
            .latest_instance_for(description.id)
            .await?
            .is_some_and(|latest| latest.is_open())
        {
            not_open.push(description.id);
        }
    }

    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    violations.check(&already_archived, "Goal(s) already archived");
    violations.check(&not_open, "Goal(s) without an open instance");
    violations.into_result()?;

    clean_future_in(tx, now).await?;

    for description in &targets.found {
        if description.paused
            && let Some(latest) = tx.latest_instance_for(description.id).await?
            && latest.is_open()
            && !latest.is_first()
        {
            debug!(
                description_id = %description.id,
                instance_id = %latest.id,
                "Discarding open instance of paused goal"
            );
            tx.delete_instance(latest.id).await?;
        }

        tx.update_description(
            description.id,
            &GoalDescriptionUpdateAttributes {
                archived: Some(true),
                ..Default::default()
            },
            now,
        )
        .await?;
        info!(description_id = %description.id, "Goal archived");
    }

    Ok(())
}

/// Unarchive goals.
///
/// A goal whose latest instance was finalized while archived gets a new
/// instance starting at the current period with the old target.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist or is
/// not archived.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_unarchive_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    let targets = load_targets(tx.as_mut(), &dedup(ids), false).await?;

    let not_archived: Vec<Uuid> = targets
        .found
        .iter()
        .filter(|d| !d.archived)
        .map(|d| d.id)
        .collect();

    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    violations.check(&not_archived, "Goal(s) not archived");
    violations.into_result()?;

    for description in &targets.found {
        let latest = tx
            .latest_instance_for(description.id)
            .await?
            .ok_or_else(|| {
                CoreError::illegal_state(format!("Goal {} has no instances", description.id))
            })?;

        if !latest.is_open() {
            let instance = GoalInstance {
                id: Uuid::new_v4(),
                description_id: description.id,
                previous_instance_id: Some(latest.id),
                start_timestamp: state.time.start_of_period(description.period_unit, now),
                target: latest.target,
                end_timestamp: None,
                created_at: now,
                modified_at: now,
            };
            tx.insert_instance(&instance).await?;
            debug!(
                description_id = %description.id,
                instance_id = %instance.id,
                start = %instance.start_timestamp,
                "Appended instance for unarchived goal"
            );
        }

        tx.update_description(
            description.id,
            &GoalDescriptionUpdateAttributes {
                archived: Some(false),
                ..Default::default()
            },
            now,
        )
        .await?;
        info!(description_id = %description.id, "Goal unarchived");
    }

    tx.commit().await
}

// ============================================================================
// Chain maintenance
// ============================================================================

/// Remove instances that start in the future and re-open their predecessors.
///
/// First instances are never removed. Returns the number of instances removed.
///
/// # Errors
///
/// [`CoreError::IllegalState`] if two consecutive passes find the same future
/// instances.
#[instrument(skip(state))]
pub async fn handle_clean_future_goal_instances(state: &GoalHandlerState) -> Result<usize> {
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    let removed = clean_future_in(tx.as_mut(), now).await?;
    tx.commit().await?;
    Ok(removed)
}

async fn clean_future_in(tx: &mut dyn GoalTransaction, now: DateTime<Utc>) -> Result<usize> {
    let mut previous: Option<Vec<GoalInstanceWithDescription>> = None;
    let mut removed = 0;

    loop {
        let future: Vec<GoalInstanceWithDescription> = tx
            .latest_instances()
            .await?
            .into_iter()
            .filter(|goal| goal.instance.start_timestamp > now && !goal.instance.is_first())
            .collect();

        if future.is_empty() {
            break;
        }
        if previous.as_ref() == Some(&future) {
            return Err(CoreError::illegal_state(format!(
                "Cleaning future goal instances did not converge: {}",
                format_ids(future.iter().map(|goal| &goal.instance.id))
            )));
        }

        debug!(count = future.len(), "Removing future goal instances");
        for goal in &future {
            tx.delete_instance(goal.instance.id).await?;
            if let Some(previous_id) = goal.instance.previous_instance_id {
                tx.update_instance(
                    previous_id,
                    &GoalInstanceUpdateAttributes {
                        end_timestamp: Some(None),
                        ..Default::default()
                    },
                    now,
                )
                .await?;
            }
            removed += 1;
        }

        previous = Some(future);
    }

    Ok(removed)
}

/// Advance every goal whose open instance's period has elapsed.
///
/// Archived goals are finalized, repeating goals are renewed and one-shot
/// goals are archived. Runs until no outdated instance is left, so a goal that
/// missed several periods catches up in one call.
///
/// # Errors
///
/// [`CoreError::IllegalState`] if two consecutive passes find the same
/// outdated instances.
#[instrument(skip(state))]
pub async fn handle_update_outdated_goals(state: &GoalHandlerState) -> Result<RenewalSummary> {
    let now = state.time.now();
    let offset = state.time.local_offset();

    let mut tx = state.persistence.begin().await?;
    let summary = update_outdated_in(tx.as_mut(), now, offset).await?;
    tx.commit().await?;

    if !summary.is_empty() {
        info!(
            finalized = summary.finalized,
            renewed = summary.renewed,
            archived = summary.archived,
            "Outdated goals updated"
        );
    }
    Ok(summary)
}

async fn update_outdated_in(
    tx: &mut dyn GoalTransaction,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<RenewalSummary> {
    let mut previous: Option<Vec<GoalInstanceWithDescription>> = None;
    let mut summary = RenewalSummary::default();

    loop {
        let mut outdated: Vec<GoalInstanceWithDescription> = Vec::new();
        for goal in tx.latest_instances().await? {
            if goal.instance.is_open()
                && now >= end_of_instance(&goal.instance, &goal.description, offset)?
            {
                outdated.push(goal);
            }
        }

        if outdated.is_empty() {
            break;
        }
        if previous.as_ref() == Some(&outdated) {
            return Err(CoreError::illegal_state(format!(
                "Updating outdated goals did not converge: {}",
                format_ids(outdated.iter().map(|goal| &goal.instance.id))
            )));
        }

        debug!(count = outdated.len(), "Processing outdated goal instances");
        let mut one_shot = Vec::new();
        for goal in &outdated {
            if goal.description.archived {
                let end = end_of_instance(&goal.instance, &goal.description, offset)?;
                tx.update_instance(
                    goal.instance.id,
                    &GoalInstanceUpdateAttributes {
                        end_timestamp: Some(Some(end)),
                        ..Default::default()
                    },
                    now,
                )
                .await?;
                summary.finalized += 1;
            } else if goal.description.repeat {
                renew(tx, goal, now, offset).await?;
                summary.renewed += 1;
            } else {
                one_shot.push(goal.description.id);
            }
        }

        if !one_shot.is_empty() {
            archive_in(tx, &one_shot, now).await?;
            summary.archived += one_shot.len();
        }

        previous = Some(outdated);
    }

    Ok(summary)
}

/// Append the successor of an outdated instance.
///
/// A paused goal's outdated instance is discarded and the successor links to
/// its predecessor instead, unless it is the first instance.
async fn renew(
    tx: &mut dyn GoalTransaction,
    goal: &GoalInstanceWithDescription,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<GoalInstance> {
    let end = end_of_instance(&goal.instance, &goal.description, offset)?;

    let previous_instance_id = if goal.description.paused && !goal.instance.is_first() {
        tx.delete_instance(goal.instance.id).await?;
        goal.instance.previous_instance_id
    } else {
        tx.update_instance(
            goal.instance.id,
            &GoalInstanceUpdateAttributes {
                end_timestamp: Some(Some(end)),
                ..Default::default()
            },
            now,
        )
        .await?;
        Some(goal.instance.id)
    };

    let next = GoalInstance {
        id: Uuid::new_v4(),
        description_id: goal.description.id,
        previous_instance_id,
        start_timestamp: end,
        target: goal.instance.target,
        end_timestamp: None,
        created_at: now,
        modified_at: now,
    };
    tx.insert_instance(&next).await?;

    debug!(
        description_id = %goal.description.id,
        outdated = %goal.instance.id,
        renewed = %next.id,
        start = %next.start_timestamp,
        "Goal renewed"
    );
    Ok(next)
}

// ============================================================================
// Editing
// ============================================================================

/// Edit a goal's description and its current instance.
///
/// Future instances are cleaned up first so the edit lands on the instance
/// that is actually current.
///
/// # Errors
///
/// - [`CoreError::IllegalArgument`] when trying to change paused, archived or
///   deleted state, or the end timestamp, or when the goal does not exist
/// - [`CoreError::NotImplemented`] for custom order changes
/// - [`CoreError::InvalidGoalInstance`] for a zero target
/// - [`CoreError::IllegalState`] if the goal has no instance
#[instrument(skip(state, request), fields(description_id = %request.description_id))]
pub async fn handle_edit_goal(
    state: &GoalHandlerState,
    request: EditGoalRequest,
) -> Result<GoalInstanceWithDescription> {
    if let Some(update) = &request.description {
        if update.paused.is_some() || update.archived.is_some() {
            return Err(CoreError::illegal_argument(
                "Paused and archived state cannot be changed by editing a goal",
            ));
        }
        if update.deleted_at.is_some() {
            return Err(CoreError::illegal_argument(
                "Deleted state cannot be changed by editing a goal",
            ));
        }
        if update.custom_order.is_some() {
            return Err(CoreError::NotImplemented {
                feature: "Custom goal order".to_string(),
            });
        }
    }
    if let Some(update) = &request.instance {
        if update.end_timestamp.is_some() {
            return Err(CoreError::illegal_argument(
                "End timestamp of a goal instance cannot be set manually",
            ));
        }
        if let Some(target) = update.target {
            validate_target(target)?;
        }
    }

    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;

    let targets = load_targets(tx.as_mut(), &[request.description_id], false).await?;
    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    violations.into_result()?;

    clean_future_in(tx.as_mut(), now).await?;

    let latest = tx
        .latest_instance_for(request.description_id)
        .await?
        .ok_or_else(|| {
            CoreError::illegal_state(format!(
                "Goal {} has no instances",
                request.description_id
            ))
        })?;

    if let Some(update) = request.description.as_ref().filter(|u| !u.is_empty()) {
        tx.update_description(request.description_id, update, now)
            .await?;
    }
    if let Some(update) = request.instance.as_ref().filter(|u| !u.is_empty()) {
        tx.update_instance(latest.id, update, now).await?;
    }

    let description = tx
        .get_description(request.description_id)
        .await?
        .ok_or_else(|| {
            CoreError::illegal_state(format!(
                "Goal {} disappeared while editing",
                request.description_id
            ))
        })?;
    let instance = tx
        .latest_instance_for(request.description_id)
        .await?
        .ok_or_else(|| {
            CoreError::illegal_state(format!(
                "Goal {} has no instances",
                request.description_id
            ))
        })?;
    tx.commit().await?;

    info!(instance_id = %instance.id, "Goal edited");
    Ok(GoalInstanceWithDescription {
        instance,
        description,
    })
}

// ============================================================================
// Pause / delete
// ============================================================================

/// Pause goals.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist, is
/// archived or is already paused.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_pause_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    set_paused(state, ids, true).await
}

/// Unpause goals.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist, is
/// archived or is not paused.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_unpause_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    set_paused(state, ids, false).await
}

async fn set_paused(state: &GoalHandlerState, ids: &[Uuid], paused: bool) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    let targets = load_targets(tx.as_mut(), &dedup(ids), false).await?;

    let archived: Vec<Uuid> = targets
        .found
        .iter()
        .filter(|d| d.archived)
        .map(|d| d.id)
        .collect();
    let unchanged: Vec<Uuid> = targets
        .found
        .iter()
        .filter(|d| !d.archived && d.paused == paused)
        .map(|d| d.id)
        .collect();

    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    if paused {
        violations.check(&archived, "Cannot pause archived goal(s)");
        violations.check(&unchanged, "Goal(s) already paused");
    } else {
        violations.check(&archived, "Cannot unpause archived goal(s)");
        violations.check(&unchanged, "Goal(s) not paused");
    }
    violations.into_result()?;

    let update = GoalDescriptionUpdateAttributes {
        paused: Some(paused),
        ..Default::default()
    };
    for description in &targets.found {
        tx.update_description(description.id, &update, now).await?;
        info!(description_id = %description.id, paused, "Goal pause state changed");
    }

    tx.commit().await
}

/// Soft-delete goals. Deleted goals disappear from every other use case.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist or is
/// already deleted.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_delete_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    let targets = load_targets(tx.as_mut(), &dedup(ids), false).await?;

    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    violations.into_result()?;

    let update = GoalDescriptionUpdateAttributes {
        deleted_at: Some(Some(now)),
        ..Default::default()
    };
    for description in &targets.found {
        tx.update_description(description.id, &update, now).await?;
        info!(description_id = %description.id, "Goal deleted");
    }

    tx.commit().await
}

/// Restore soft-deleted goals.
///
/// # Errors
///
/// [`CoreError::IllegalArgument`] listing every id that does not exist or is
/// not deleted.
#[instrument(skip(state, ids), fields(count = ids.len()))]
pub async fn handle_restore_goals(state: &GoalHandlerState, ids: &[Uuid]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = state.time.now();
    let mut tx = state.persistence.begin().await?;
    let targets = load_targets(tx.as_mut(), &dedup(ids), true).await?;

    let not_deleted: Vec<Uuid> = targets
        .found
        .iter()
        .filter(|d| !d.is_deleted())
        .map(|d| d.id)
        .collect();

    let mut violations = Violations::new();
    violations.check(&targets.missing, "Could not find goal(s)");
    violations.check(&not_deleted, "Goal(s) not deleted");
    violations.into_result()?;

    let update = GoalDescriptionUpdateAttributes {
        deleted_at: Some(None),
        ..Default::default()
    };
    for description in &targets.found {
        tx.update_description(description.id, &update, now).await?;
        info!(description_id = %description.id, "Goal restored");
    }

    tx.commit().await
}

// ============================================================================
// Helpers
// ============================================================================

struct Targets {
    found: Vec<GoalDescription>,
    missing: Vec<Uuid>,
}

/// Resolve ids to descriptions. Soft-deleted goals count as missing unless
/// `include_deleted` is set.
async fn load_targets(
    tx: &mut dyn GoalTransaction,
    ids: &[Uuid],
    include_deleted: bool,
) -> Result<Targets> {
    let mut targets = Targets {
        found: Vec::with_capacity(ids.len()),
        missing: Vec::new(),
    };
    for &id in ids {
        match tx.get_description(id).await? {
            Some(description) if include_deleted || !description.is_deleted() => {
                targets.found.push(description)
            }
            _ => targets.missing.push(id),
        }
    }
    Ok(targets)
}

/// Drop repeated ids, keeping the first occurrence.
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn validate_target(target: std::time::Duration) -> Result<()> {
    if target.as_secs() == 0 {
        return Err(CoreError::invalid_instance(
            "Target must be finite and greater than 0 seconds",
        ));
    }
    Ok(())
}
