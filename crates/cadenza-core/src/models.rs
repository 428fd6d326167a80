// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Goal domain types.
//!
//! A [`GoalDescription`] is the durable definition of a practice target. Each
//! description owns a backward-linked chain of [`GoalInstance`]s, one per
//! concrete period.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which practice time counts towards a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalType {
    /// All practice time counts.
    NonSpecific,
    /// Only practice on the associated library items counts.
    ItemSpecific,
}

/// Calendar unit a goal period is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalPeriodUnit {
    /// Calendar days.
    Day,
    /// Weeks starting on Monday.
    Week,
    /// Calendar months.
    Month,
}

impl GoalPeriodUnit {
    /// Position used when ordering goals by period length.
    pub(crate) fn rank(self) -> u8 {
        match self {
            Self::Day => 0,
            Self::Week => 1,
            Self::Month => 2,
        }
    }
}

/// How progress towards a goal is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalProgressType {
    /// Accumulated practice duration.
    Time,
    /// Number of practice sessions.
    SessionCount,
}

/// Durable definition of a practice goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GoalDescription {
    /// Unique identifier.
    pub id: Uuid,
    /// Item-specific or not. Fixed at creation.
    pub goal_type: GoalType,
    /// Recurring (`true`) or one-shot.
    pub repeat: bool,
    /// Length of one period, always greater than zero.
    pub period_in_period_units: i32,
    /// Unit of [`Self::period_in_period_units`].
    pub period_unit: GoalPeriodUnit,
    /// How progress is measured.
    pub progress_type: GoalProgressType,
    /// Paused goals keep renewing but discard their unused periods.
    pub paused: bool,
    /// Archived goals are frozen and never renew.
    pub archived: bool,
    /// Position chosen by the user for custom ordering.
    pub custom_order: Option<i32>,
    /// When the description was created.
    pub created_at: DateTime<Utc>,
    /// When the description was last modified.
    pub modified_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl GoalDescription {
    /// Whether the description has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// One concrete, time-bounded period of a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalInstance {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning description.
    pub description_id: Uuid,
    /// Predecessor in the chain, `None` only for the first instance.
    pub previous_instance_id: Option<Uuid>,
    /// Beginning of the period.
    pub start_timestamp: DateTime<Utc>,
    /// Practice time required to achieve the goal.
    pub target: Duration,
    /// Set once the period is finalized; `None` while the instance is open.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// When the instance was created.
    pub created_at: DateTime<Utc>,
    /// When the instance was last modified.
    pub modified_at: DateTime<Utc>,
}

impl GoalInstance {
    /// Whether this is the open (not yet finalized) instance.
    pub fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    /// Whether this is the first instance of its description.
    pub fn is_first(&self) -> bool {
        self.previous_instance_id.is_none()
    }
}

/// An instance together with the description it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalInstanceWithDescription {
    /// The instance.
    pub instance: GoalInstance,
    /// Its owning description.
    pub description: GoalDescription,
}

/// An instance with its description and the library items the goal counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalInstanceWithDescriptionAndItems {
    /// The instance.
    pub instance: GoalInstance,
    /// Its owning description.
    pub description: GoalDescription,
    /// Associated library items; empty for non-specific goals.
    pub library_item_ids: Vec<Uuid>,
}

/// Attributes for creating a goal description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalDescriptionCreationAttributes {
    /// Item-specific or not.
    pub goal_type: GoalType,
    /// Recurring or one-shot.
    pub repeat: bool,
    /// Period length, must be greater than zero.
    pub period_in_period_units: i32,
    /// Period unit.
    pub period_unit: GoalPeriodUnit,
    /// Progress measurement.
    pub progress_type: GoalProgressType,
}

/// Attributes for creating the first instance of a goal.
///
/// `start_timestamp` and `description_id` are assigned by the engine and must
/// be left unset by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalInstanceCreationAttributes {
    /// Practice time required per period.
    pub target: Duration,
    /// Engine-assigned period start.
    pub start_timestamp: Option<DateTime<Utc>>,
    /// Engine-assigned owner.
    pub description_id: Option<Uuid>,
}

impl GoalInstanceCreationAttributes {
    /// Attributes for a first instance with the given target.
    pub fn new(target: Duration) -> Self {
        Self {
            target,
            start_timestamp: None,
            description_id: None,
        }
    }
}

/// Partial update of a goal description. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalDescriptionUpdateAttributes {
    /// New paused flag.
    pub paused: Option<bool>,
    /// New archived flag.
    pub archived: Option<bool>,
    /// New custom order (`Some(None)` clears it).
    pub custom_order: Option<Option<i32>>,
    /// New repeat flag.
    pub repeat: Option<bool>,
    /// New soft-delete marker (`Some(None)` restores).
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl GoalDescriptionUpdateAttributes {
    /// Whether the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Partial update of a goal instance. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoalInstanceUpdateAttributes {
    /// New target.
    pub target: Option<Duration>,
    /// New end timestamp (`Some(None)` re-opens the instance).
    pub end_timestamp: Option<Option<DateTime<Utc>>>,
}

impl GoalInstanceUpdateAttributes {
    /// Whether the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A stretch of practice on one library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeSection {
    /// Unique identifier.
    pub id: Uuid,
    /// Session the section belongs to.
    pub session_id: Uuid,
    /// Library item practiced.
    pub library_item_id: Uuid,
    /// When the section started.
    pub start_timestamp: DateTime<Utc>,
    /// How long the section lasted.
    pub duration: Duration,
}
