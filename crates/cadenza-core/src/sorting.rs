// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordering of goal lists for presentation.
//!
//! Sorting never affects the engine's invariants; it only decides the order in
//! which read-side queries return goals.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{
    GoalDescription, GoalInstanceWithDescription, GoalInstanceWithDescriptionAndItems,
};
use crate::persistence::GoalRecord;

/// Key goals are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSortMode {
    /// Creation time of the description.
    #[default]
    DateAdded,
    /// Target of the current instance.
    Target,
    /// Period length (unit first, then count).
    Period,
    /// User-defined order; goals without a position come last.
    Custom,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    #[default]
    Descending,
}

/// The user's choice of goal ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalSortPreference {
    /// Key to sort by.
    pub mode: GoalSortMode,
    /// Direction to sort in.
    pub direction: SortDirection,
}

impl GoalSortPreference {
    /// A preference with the given mode and direction.
    pub fn new(mode: GoalSortMode, direction: SortDirection) -> Self {
        Self { mode, direction }
    }
}

/// Unknown sort mode or direction name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort option: {0}")]
pub struct ParseSortError(String);

impl FromStr for GoalSortMode {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date_added" => Ok(Self::DateAdded),
            "target" => Ok(Self::Target),
            "period" => Ok(Self::Period),
            "custom" => Ok(Self::Custom),
            other => Err(ParseSortError(other.to_string())),
        }
    }
}

impl FromStr for SortDirection {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(Self::Ascending),
            "descending" | "desc" => Ok(Self::Descending),
            other => Err(ParseSortError(other.to_string())),
        }
    }
}

impl fmt::Display for GoalSortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DateAdded => "date_added",
            Self::Target => "target",
            Self::Period => "period",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Supplies the sort preference goal lists are ordered by.
pub trait SortPreferenceSource: Send + Sync {
    /// The preference currently in effect.
    fn goal_sort_preference(&self) -> GoalSortPreference;
}

impl SortPreferenceSource for GoalSortPreference {
    fn goal_sort_preference(&self) -> GoalSortPreference {
        *self
    }
}

/// Anything a goal list can be sorted by.
pub trait SortableGoal {
    /// The goal's description.
    fn description(&self) -> &GoalDescription;

    /// The target used for [`GoalSortMode::Target`], if known.
    fn target(&self) -> Option<Duration>;
}

impl SortableGoal for GoalInstanceWithDescription {
    fn description(&self) -> &GoalDescription {
        &self.description
    }

    fn target(&self) -> Option<Duration> {
        Some(self.instance.target)
    }
}

impl SortableGoal for GoalInstanceWithDescriptionAndItems {
    fn description(&self) -> &GoalDescription {
        &self.description
    }

    fn target(&self) -> Option<Duration> {
        Some(self.instance.target)
    }
}

impl SortableGoal for GoalRecord {
    fn description(&self) -> &GoalDescription {
        &self.description
    }

    fn target(&self) -> Option<Duration> {
        self.chain().latest().map(|latest| latest.target)
    }
}

/// Sort `goals` in place according to `preference`.
///
/// Ties are broken by creation time and then id, so the result is stable
/// across reads. For [`GoalSortMode::Custom`], goals without a position stay
/// at the end in both directions. Targets are looked up once per goal.
pub fn sort_goals<T: SortableGoal>(goals: &mut Vec<T>, preference: GoalSortPreference) {
    let by_target = preference.mode == GoalSortMode::Target;
    let mut keyed: Vec<(Option<Duration>, T)> = goals
        .drain(..)
        .map(|goal| (by_target.then(|| goal.target()).flatten(), goal))
        .collect();
    keyed.sort_by(|(ta, a), (tb, b)| compare((*ta, a), (*tb, b), preference));
    goals.extend(keyed.into_iter().map(|(_, goal)| goal));
}

fn compare<T: SortableGoal>(
    (ta, a): (Option<Duration>, &T),
    (tb, b): (Option<Duration>, &T),
    preference: GoalSortPreference,
) -> Ordering {
    let (da, db) = (a.description(), b.description());

    let primary = match preference.mode {
        GoalSortMode::DateAdded => Ordering::Equal,
        GoalSortMode::Target => ta.cmp(&tb),
        GoalSortMode::Period => (da.period_unit.rank(), da.period_in_period_units)
            .cmp(&(db.period_unit.rank(), db.period_in_period_units)),
        GoalSortMode::Custom => match (da.custom_order, db.custom_order) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };

    let ordering = primary
        .then_with(|| da.created_at.cmp(&db.created_at))
        .then_with(|| da.id.cmp(&db.id));

    match preference.direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoalInstance, GoalPeriodUnit, GoalProgressType, GoalType};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn goal(
        day: u32,
        target_minutes: u64,
        unit: GoalPeriodUnit,
        order: Option<i32>,
    ) -> GoalInstanceWithDescription {
        let created = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        let id = Uuid::new_v4();
        GoalInstanceWithDescription {
            instance: GoalInstance {
                id: Uuid::new_v4(),
                description_id: id,
                previous_instance_id: None,
                start_timestamp: created,
                target: Duration::from_secs(target_minutes * 60),
                end_timestamp: None,
                created_at: created,
                modified_at: created,
            },
            description: GoalDescription {
                id,
                goal_type: GoalType::NonSpecific,
                repeat: true,
                period_in_period_units: 1,
                period_unit: unit,
                progress_type: GoalProgressType::Time,
                paused: false,
                archived: false,
                custom_order: order,
                created_at: created,
                modified_at: created,
                deleted_at: None,
            },
        }
    }

    fn days(goals: &[GoalInstanceWithDescription]) -> Vec<u32> {
        use chrono::Datelike;
        goals.iter().map(|g| g.description.created_at.day()).collect()
    }

    #[test]
    fn test_default_is_newest_first() {
        let mut goals = vec![
            goal(1, 10, GoalPeriodUnit::Day, None),
            goal(3, 10, GoalPeriodUnit::Day, None),
            goal(2, 10, GoalPeriodUnit::Day, None),
        ];
        sort_goals(&mut goals, GoalSortPreference::default());
        assert_eq!(days(&goals), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_by_target_ascending() {
        let mut goals = vec![
            goal(1, 60, GoalPeriodUnit::Day, None),
            goal(2, 15, GoalPeriodUnit::Day, None),
            goal(3, 30, GoalPeriodUnit::Day, None),
        ];
        sort_goals(
            &mut goals,
            GoalSortPreference::new(GoalSortMode::Target, SortDirection::Ascending),
        );
        assert_eq!(days(&goals), vec![2, 3, 1]);
    }

    #[test]
    fn test_sort_by_period_uses_unit_first() {
        let mut goals = vec![
            goal(1, 10, GoalPeriodUnit::Month, None),
            goal(2, 10, GoalPeriodUnit::Day, None),
            goal(3, 10, GoalPeriodUnit::Week, None),
        ];
        sort_goals(
            &mut goals,
            GoalSortPreference::new(GoalSortMode::Period, SortDirection::Ascending),
        );
        assert_eq!(days(&goals), vec![2, 3, 1]);
    }

    #[test]
    fn test_custom_order_puts_unset_last_in_both_directions() {
        let mut goals = vec![
            goal(1, 10, GoalPeriodUnit::Day, None),
            goal(2, 10, GoalPeriodUnit::Day, Some(2)),
            goal(3, 10, GoalPeriodUnit::Day, Some(1)),
        ];
        sort_goals(
            &mut goals,
            GoalSortPreference::new(GoalSortMode::Custom, SortDirection::Ascending),
        );
        assert_eq!(days(&goals), vec![3, 2, 1]);

        sort_goals(
            &mut goals,
            GoalSortPreference::new(GoalSortMode::Custom, SortDirection::Descending),
        );
        assert_eq!(days(&goals), vec![2, 3, 1]);
    }

    #[test]
    fn test_parse_sort_options() {
        assert_eq!("period".parse::<GoalSortMode>(), Ok(GoalSortMode::Period));
        assert_eq!(
            "DATE_ADDED".parse::<GoalSortMode>(),
            Ok(GoalSortMode::DateAdded)
        );
        assert_eq!("asc".parse::<SortDirection>(), Ok(SortDirection::Ascending));
        assert!("sideways".parse::<SortDirection>().is_err());
    }

    #[test]
    fn test_records_sort_by_latest_target() {
        let record = |day: u32, targets: &[u64]| {
            let first = goal(day, targets[0], GoalPeriodUnit::Day, None);
            let mut instances = vec![first.instance];
            for (i, minutes) in targets.iter().enumerate().skip(1) {
                let previous: GoalInstance = instances[i - 1].clone();
                instances.push(GoalInstance {
                    id: Uuid::new_v4(),
                    previous_instance_id: Some(previous.id),
                    start_timestamp: previous.start_timestamp + chrono::TimeDelta::days(1),
                    target: Duration::from_secs(minutes * 60),
                    ..previous
                });
            }
            GoalRecord {
                description: first.description,
                instances,
                library_item_ids: Vec::new(),
            }
        };

        // The first goal started small but its latest target is the largest
        let mut goals = vec![
            record(1, &[5, 90]),
            record(2, &[30]),
            record(3, &[60, 45, 20]),
        ];
        sort_goals(
            &mut goals,
            GoalSortPreference::new(GoalSortMode::Target, SortDirection::Descending),
        );
        let days: Vec<u32> = goals
            .iter()
            .map(|g| {
                use chrono::Datelike;
                g.description.created_at.day()
            })
            .collect();
        assert_eq!(days, vec![1, 2, 3]);
    }
}
