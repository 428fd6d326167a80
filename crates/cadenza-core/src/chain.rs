// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The instance chain of a single goal description.
//!
//! Instances only point backwards through `previous_instance_id`. The chain
//! keeps every instance in a table keyed by id plus an index from predecessor
//! to successor, so "next" is a lookup instead of a stored forward pointer.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::error::{self, CoreError};
use crate::models::{GoalDescription, GoalInstance};

/// Computed end of an instance's period: its start plus the description's
/// period length, in local calendar time.
///
/// # Errors
///
/// [`CoreError::IllegalState`] if the end lies outside the representable date
/// range.
pub fn end_of_instance(
    instance: &GoalInstance,
    description: &GoalDescription,
    offset: FixedOffset,
) -> error::Result<DateTime<Utc>> {
    description
        .period_unit
        .advance(
            instance.start_timestamp,
            description.period_in_period_units,
            offset,
        )
        .ok_or_else(|| {
            CoreError::illegal_state(format!(
                "End of goal instance {} is out of range ({} x {:?})",
                instance.id, description.period_in_period_units, description.period_unit
            ))
        })
}

/// The `[start, end)` window practice must fall into to count for `instance`.
///
/// Finalized instances use their stored end; open ones use the computed end.
pub fn instance_window(
    instance: &GoalInstance,
    description: &GoalDescription,
    offset: FixedOffset,
) -> error::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let end = match instance.end_timestamp {
        Some(end) => end,
        None => end_of_instance(instance, description, offset)?,
    };
    Ok((instance.start_timestamp, end))
}

/// A broken chain invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainViolation {
    /// The description has no instances at all.
    #[error("goal {0} has no instances")]
    NoInstances(Uuid),

    /// An instance belongs to another description.
    #[error("instance {instance} belongs to description {owner}, not {expected}")]
    ForeignInstance {
        /// The misplaced instance.
        instance: Uuid,
        /// Its actual owner.
        owner: Uuid,
        /// The description the chain was built for.
        expected: Uuid,
    },

    /// No instance without predecessor exists.
    #[error("goal {0} has no first instance")]
    MissingFirstInstance(Uuid),

    /// More than one instance claims to be first.
    #[error("goal has several first instances: {0:?}")]
    MultipleFirstInstances(Vec<Uuid>),

    /// An instance points at a predecessor that does not exist.
    #[error("instance {instance} points at missing predecessor {previous}")]
    BrokenLink {
        /// The instance with the dangling link.
        instance: Uuid,
        /// The missing predecessor.
        previous: Uuid,
    },

    /// Several instances share a predecessor.
    #[error("instance {previous} has several successors: {successors:?}")]
    Fork {
        /// The shared predecessor.
        previous: Uuid,
        /// Its competing successors.
        successors: Vec<Uuid>,
    },

    /// Instances that cannot be reached from the first instance.
    #[error("instances form a cycle or are detached from the first instance: {0:?}")]
    Detached(Vec<Uuid>),

    /// Start timestamps do not strictly increase along the chain.
    #[error("instance {instance} does not start after its predecessor {previous}")]
    StartNotIncreasing {
        /// The predecessor.
        previous: Uuid,
        /// The instance starting too early.
        instance: Uuid,
    },

    /// More than one instance is open.
    #[error("goal has several open instances: {0:?}")]
    MultipleOpenInstances(Vec<Uuid>),

    /// The open instance is not at the end of the chain.
    #[error("open instance {0} is not the latest instance")]
    OpenInstanceNotLatest(Uuid),
}

/// All instances of one goal description.
#[derive(Debug, Clone, Default)]
pub struct GoalChain {
    description_id: Uuid,
    instances: HashMap<Uuid, GoalInstance>,
    successors: HashMap<Uuid, Vec<Uuid>>,
}

impl GoalChain {
    /// Build the chain of `description_id` from its instances, in any order.
    pub fn new(description_id: Uuid, instances: impl IntoIterator<Item = GoalInstance>) -> Self {
        let mut chain = Self {
            description_id,
            ..Default::default()
        };
        for instance in instances {
            chain.insert(instance);
        }
        chain
    }

    fn insert(&mut self, instance: GoalInstance) {
        if let Some(previous) = instance.previous_instance_id {
            self.successors.entry(previous).or_default().push(instance.id);
        }
        self.instances.insert(instance.id, instance);
    }

    /// The description this chain belongs to.
    pub fn description_id(&self) -> Uuid {
        self.description_id
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the chain holds no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Look up an instance by id.
    pub fn get(&self, id: Uuid) -> Option<&GoalInstance> {
        self.instances.get(&id)
    }

    /// The instance without predecessor.
    pub fn first(&self) -> Option<&GoalInstance> {
        self.instances
            .values()
            .filter(|i| i.is_first())
            .min_by_key(|i| i.start_timestamp)
    }

    /// The instance whose `previous_instance_id` is `id`.
    pub fn successor_of(&self, id: Uuid) -> Option<&GoalInstance> {
        self.successors
            .get(&id)
            .and_then(|ids| ids.first())
            .and_then(|next| self.instances.get(next))
    }

    /// The instance nobody points at. On a corrupted chain with several such
    /// instances, the one starting last wins.
    pub fn latest(&self) -> Option<&GoalInstance> {
        self.instances
            .values()
            .filter(|i| !self.successors.contains_key(&i.id))
            .max_by_key(|i| i.start_timestamp)
    }

    /// Follow predecessor links from the latest instance. Stops at the first
    /// instance, at a dangling link, or when an instance repeats.
    pub fn walk_back(&self) -> Vec<&GoalInstance> {
        let mut visited = HashSet::new();
        let mut walk = Vec::new();
        let mut cursor = self.latest();
        while let Some(instance) = cursor {
            if !visited.insert(instance.id) {
                break;
            }
            walk.push(instance);
            cursor = instance
                .previous_instance_id
                .and_then(|previous| self.instances.get(&previous));
        }
        walk
    }

    /// Instances from first to latest.
    pub fn in_order(&self) -> Vec<&GoalInstance> {
        let mut walk = self.walk_back();
        walk.reverse();
        walk
    }

    /// Instances whose end timestamp is unset.
    pub fn open_instances(&self) -> Vec<&GoalInstance> {
        let mut open: Vec<_> = self.instances.values().filter(|i| i.is_open()).collect();
        open.sort_by_key(|i| i.start_timestamp);
        open
    }

    /// Check every structural invariant of the chain.
    pub fn verify(&self) -> Result<(), ChainViolation> {
        if self.instances.is_empty() {
            return Err(ChainViolation::NoInstances(self.description_id));
        }

        for instance in self.instances.values() {
            if instance.description_id != self.description_id {
                return Err(ChainViolation::ForeignInstance {
                    instance: instance.id,
                    owner: instance.description_id,
                    expected: self.description_id,
                });
            }
            if let Some(previous) = instance.previous_instance_id
                && !self.instances.contains_key(&previous)
            {
                return Err(ChainViolation::BrokenLink {
                    instance: instance.id,
                    previous,
                });
            }
        }

        let mut roots: Vec<Uuid> = self
            .instances
            .values()
            .filter(|i| i.is_first())
            .map(|i| i.id)
            .collect();
        let root = match roots.len() {
            0 => return Err(ChainViolation::MissingFirstInstance(self.description_id)),
            1 => roots[0],
            _ => {
                roots.sort();
                return Err(ChainViolation::MultipleFirstInstances(roots));
            }
        };

        if let Some((previous, successors)) = self.successors.iter().find(|(_, s)| s.len() > 1) {
            let mut successors = successors.clone();
            successors.sort();
            return Err(ChainViolation::Fork {
                previous: *previous,
                successors,
            });
        }

        // Without forks and with a single root, walking forward cannot loop.
        let mut walk = vec![root];
        let mut cursor = root;
        while let Some(next) = self.successors.get(&cursor).and_then(|s| s.first()) {
            let (before, after) = (&self.instances[&cursor], &self.instances[next]);
            if after.start_timestamp <= before.start_timestamp {
                return Err(ChainViolation::StartNotIncreasing {
                    previous: before.id,
                    instance: after.id,
                });
            }
            walk.push(*next);
            cursor = *next;
        }

        if walk.len() != self.instances.len() {
            let reached: HashSet<_> = walk.iter().collect();
            let mut detached: Vec<Uuid> = self
                .instances
                .keys()
                .filter(|id| !reached.contains(id))
                .copied()
                .collect();
            detached.sort();
            return Err(ChainViolation::Detached(detached));
        }

        let open = self.open_instances();
        match open.as_slice() {
            [] => {}
            [only] => {
                if walk.last() != Some(&only.id) {
                    return Err(ChainViolation::OpenInstanceNotLatest(only.id));
                }
            }
            many => {
                return Err(ChainViolation::MultipleOpenInstances(
                    many.iter().map(|i| i.id).collect(),
                ));
            }
        }

        Ok(())
    }
}
