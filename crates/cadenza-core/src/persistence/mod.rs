// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for cadenza-core.
//!
//! The lifecycle engine only talks to storage through [`GoalPersistence`] and
//! the [`GoalTransaction`] it hands out. Practice data and library items are
//! owned by other parts of the application and are read through
//! [`SessionSource`] and [`LibraryItemSource`].
//!
//! Reads are reactive: every source exposes a `tokio::sync::watch` revision
//! counter that is bumped after each committed write. Subscribers re-run their
//! query when it changes and treat each result as a full snapshot.

pub mod sqlite;

pub use self::sqlite::SqlitePersistence;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::chain::GoalChain;
use crate::error::CoreError;
use crate::models::{
    GoalDescription, GoalDescriptionUpdateAttributes, GoalInstance, GoalInstanceUpdateAttributes,
    GoalInstanceWithDescription, GoalInstanceWithDescriptionAndItems, PracticeSection,
};

/// A goal description with every instance and library item it owns.
#[derive(Debug, Clone)]
pub struct GoalRecord {
    /// The description.
    pub description: GoalDescription,
    /// All instances, unordered.
    pub instances: Vec<GoalInstance>,
    /// Associated library items.
    pub library_item_ids: Vec<Uuid>,
}

impl GoalRecord {
    /// Arrange the instances into their chain.
    pub fn chain(&self) -> GoalChain {
        GoalChain::new(self.description.id, self.instances.iter().cloned())
    }
}

/// One atomic unit of work against goal storage.
///
/// Writes become visible to other readers only after [`GoalTransaction::commit`].
/// Dropping the transaction without committing rolls every write back.
#[allow(missing_docs)]
#[async_trait]
pub trait GoalTransaction: Send {
    /// Fetch a description, including soft-deleted ones.
    async fn get_description(&mut self, id: Uuid) -> Result<Option<GoalDescription>, CoreError>;

    /// The latest instance (the one without successor) of every description
    /// that is not soft-deleted, paired with its description.
    async fn latest_instances(&mut self) -> Result<Vec<GoalInstanceWithDescription>, CoreError>;

    /// The latest instance of one description.
    async fn latest_instance_for(
        &mut self,
        description_id: Uuid,
    ) -> Result<Option<GoalInstance>, CoreError>;

    async fn insert_description(
        &mut self,
        description: &GoalDescription,
        library_item_ids: &[Uuid],
    ) -> Result<(), CoreError>;

    async fn insert_instance(&mut self, instance: &GoalInstance) -> Result<(), CoreError>;

    async fn update_description(
        &mut self,
        id: Uuid,
        update: &GoalDescriptionUpdateAttributes,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    async fn update_instance(
        &mut self,
        id: Uuid,
        update: &GoalInstanceUpdateAttributes,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    async fn delete_instance(&mut self, id: Uuid) -> Result<(), CoreError>;

    /// Make every write of this transaction durable and notify subscribers.
    async fn commit(self: Box<Self>) -> Result<(), CoreError>;
}

/// Storage gateway for goal descriptions and instances.
#[async_trait]
pub trait GoalPersistence: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> Result<Box<dyn GoalTransaction>, CoreError>;

    /// One goal with its whole chain, including soft-deleted goals.
    async fn get_goal(&self, description_id: Uuid) -> Result<Option<GoalRecord>, CoreError>;

    /// Every goal that is not soft-deleted.
    async fn list_goals(&self) -> Result<Vec<GoalRecord>, CoreError>;

    /// The latest instance of every goal that is not soft-deleted.
    async fn list_latest_instances(
        &self,
    ) -> Result<Vec<GoalInstanceWithDescriptionAndItems>, CoreError>;

    /// Finalized instances, most recently ended first.
    async fn list_finalized_instances(
        &self,
        limit: i64,
    ) -> Result<Vec<GoalInstanceWithDescription>, CoreError>;

    /// Revision counter bumped after every committed goal write.
    fn subscribe_goals(&self) -> watch::Receiver<u64>;

    /// Hard-delete goals soft-deleted before `deleted_before`, cascading to
    /// their instances and item associations. Returns how many were removed.
    async fn purge_deleted_goals(&self, deleted_before: DateTime<Utc>) -> Result<u64, CoreError>;

    /// Check database connectivity.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Read access to the user's library.
#[async_trait]
pub trait LibraryItemSource: Send + Sync {
    /// Ids of every library item that currently exists.
    async fn existing_library_item_ids(&self) -> Result<HashSet<Uuid>, CoreError>;

    /// Revision counter bumped whenever library items change.
    fn subscribe_library_items(&self) -> watch::Receiver<u64>;
}

/// Read access to recorded practice.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Sections starting within `[start, end)`.
    async fn sections_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PracticeSection>, CoreError>;

    /// Revision counter bumped whenever practice data changes.
    fn subscribe_sections(&self) -> watch::Receiver<u64>;
}
