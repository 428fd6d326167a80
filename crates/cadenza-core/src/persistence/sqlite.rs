// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqlitePool, Transaction};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::CoreError;
use crate::migrations;
use crate::models::{
    GoalDescription, GoalDescriptionUpdateAttributes, GoalInstance, GoalInstanceUpdateAttributes,
    GoalInstanceWithDescription, GoalInstanceWithDescriptionAndItems, PracticeSection,
};

use super::{GoalPersistence, GoalRecord, GoalTransaction, LibraryItemSource, SessionSource};

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Instance row as stored; durations are kept in whole seconds.
#[derive(Debug, sqlx::FromRow)]
struct GoalInstanceRow {
    id: Uuid,
    goal_description_id: Uuid,
    previous_goal_instance_id: Option<Uuid>,
    start_timestamp: DateTime<Utc>,
    target_seconds: i64,
    end_timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl From<GoalInstanceRow> for GoalInstance {
    fn from(row: GoalInstanceRow) -> Self {
        Self {
            id: row.id,
            description_id: row.goal_description_id,
            previous_instance_id: row.previous_goal_instance_id,
            start_timestamp: row.start_timestamp,
            target: from_seconds(row.target_seconds),
            end_timestamp: row.end_timestamp,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PracticeSectionRow {
    id: Uuid,
    session_id: Uuid,
    library_item_id: Uuid,
    start_timestamp: DateTime<Utc>,
    duration_seconds: i64,
}

impl From<PracticeSectionRow> for PracticeSection {
    fn from(row: PracticeSectionRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            library_item_id: row.library_item_id,
            start_timestamp: row.start_timestamp,
            duration: from_seconds(row.duration_seconds),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemLinkRow {
    goal_description_id: Uuid,
    library_item_id: Uuid,
}

fn to_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn from_seconds(seconds: i64) -> Duration {
    Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
}

fn bump(revision: &watch::Sender<u64>) {
    revision.send_modify(|r| *r = r.wrapping_add(1));
}

fn revision_channel() -> Arc<watch::Sender<u64>> {
    Arc::new(watch::channel(0).0)
}

/// SQLite-backed persistence provider.
///
/// Besides the goal tables this provider also stores the library items and
/// practice sections goals are measured against, so a single database file
/// serves the whole engine.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
    goals: Arc<watch::Sender<u64>>,
    library_items: Arc<watch::Sender<u64>>,
    sections: Arc<watch::Sender<u64>>,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            goals: revision_channel(),
            library_items: revision_channel(),
            sections: revision_channel(),
        }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if they don't exist,
    /// then runs all migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/cadenza.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect to a `sqlite:` URL and run all migrations.
    ///
    /// In-memory databases are limited to a single connection, since every
    /// connection would otherwise see its own empty database. On-disk
    /// databases use WAL so readers keep going while a writer holds the lock.
    pub async fn connect(database_url: &str) -> Result<Self, CoreError> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Invalid SQLite URL {}: {}", database_url, e),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let max_connections = if in_memory { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", database_url, e),
            })?;

        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Record a library item.
    pub async fn insert_library_item(
        &self,
        id: Uuid,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO library_items (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

        bump(&self.library_items);
        Ok(())
    }

    /// Soft-delete a library item. Returns whether the item existed.
    pub async fn delete_library_item(
        &self,
        id: Uuid,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE library_items SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(deleted_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            bump(&self.library_items);
        }
        Ok(result.rows_affected() > 0)
    }

    /// Record a practice section.
    pub async fn insert_section(&self, section: &PracticeSection) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO practice_sections
                (id, session_id, library_item_id, start_timestamp, duration_seconds)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(section.id)
        .bind(section.session_id)
        .bind(section.library_item_id)
        .bind(section.start_timestamp)
        .bind(to_seconds(section.duration))
        .execute(&self.pool)
        .await?;

        bump(&self.sections);
        Ok(())
    }
}

async fn fetch_latest_instances<'e, E>(executor: E) -> Result<Vec<GoalInstance>, CoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, GoalInstanceRow>(
        r#"
        SELECT i.*
        FROM goal_instances i
        JOIN goal_descriptions d ON d.id = i.goal_description_id
        WHERE d.deleted_at IS NULL
          AND NOT EXISTS (
              SELECT 1 FROM goal_instances n WHERE n.previous_goal_instance_id = i.id
          )
        ORDER BY i.start_timestamp, i.id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_active_descriptions<'e, E>(
    executor: E,
) -> Result<HashMap<Uuid, GoalDescription>, CoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, GoalDescription>(
        "SELECT * FROM goal_descriptions WHERE deleted_at IS NULL",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|d| (d.id, d)).collect())
}

async fn fetch_active_item_links<'e, E>(executor: E) -> Result<HashMap<Uuid, Vec<Uuid>>, CoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, ItemLinkRow>(
        r#"
        SELECT l.goal_description_id, l.library_item_id
        FROM goal_description_library_items l
        JOIN goal_descriptions d ON d.id = l.goal_description_id
        WHERE d.deleted_at IS NULL
        ORDER BY l.library_item_id
        "#,
    )
    .fetch_all(executor)
    .await?;

    let mut links: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in rows {
        links
            .entry(row.goal_description_id)
            .or_default()
            .push(row.library_item_id);
    }
    Ok(links)
}

/// Pair instances with their description, dropping instances whose
/// description was not loaded.
fn pair_with_descriptions(
    instances: Vec<GoalInstance>,
    descriptions: &HashMap<Uuid, GoalDescription>,
) -> Vec<GoalInstanceWithDescription> {
    instances
        .into_iter()
        .filter_map(|instance| match descriptions.get(&instance.description_id) {
            Some(description) => Some(GoalInstanceWithDescription {
                description: description.clone(),
                instance,
            }),
            None => {
                warn!(
                    instance_id = %instance.id,
                    description_id = %instance.description_id,
                    "Instance without loaded description skipped"
                );
                None
            }
        })
        .collect()
}

/// A write transaction on the SQLite goal tables.
pub struct SqliteGoalTransaction {
    tx: Transaction<'static, Sqlite>,
    revision: Arc<watch::Sender<u64>>,
    writes: usize,
}

impl SqliteGoalTransaction {
    fn expect_row(rows_affected: u64, what: &str, id: Uuid) -> Result<(), CoreError> {
        if rows_affected == 0 {
            Err(CoreError::illegal_state(format!(
                "{} {} does not exist",
                what, id
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GoalTransaction for SqliteGoalTransaction {
    async fn get_description(&mut self, id: Uuid) -> Result<Option<GoalDescription>, CoreError> {
        let description =
            sqlx::query_as::<_, GoalDescription>("SELECT * FROM goal_descriptions WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(description)
    }

    async fn latest_instances(&mut self) -> Result<Vec<GoalInstanceWithDescription>, CoreError> {
        let instances = fetch_latest_instances(&mut *self.tx).await?;
        let descriptions = fetch_active_descriptions(&mut *self.tx).await?;
        Ok(pair_with_descriptions(instances, &descriptions))
    }

    async fn latest_instance_for(
        &mut self,
        description_id: Uuid,
    ) -> Result<Option<GoalInstance>, CoreError> {
        let row = sqlx::query_as::<_, GoalInstanceRow>(
            r#"
            SELECT i.*
            FROM goal_instances i
            WHERE i.goal_description_id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM goal_instances n WHERE n.previous_goal_instance_id = i.id
              )
            "#,
        )
        .bind(description_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_description(
        &mut self,
        description: &GoalDescription,
        library_item_ids: &[Uuid],
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO goal_descriptions
                (id, goal_type, repeat, period_in_period_units, period_unit, progress_type,
                 paused, archived, custom_order, created_at, modified_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(description.id)
        .bind(description.goal_type)
        .bind(description.repeat)
        .bind(description.period_in_period_units)
        .bind(description.period_unit)
        .bind(description.progress_type)
        .bind(description.paused)
        .bind(description.archived)
        .bind(description.custom_order)
        .bind(description.created_at)
        .bind(description.modified_at)
        .bind(description.deleted_at)
        .execute(&mut *self.tx)
        .await?;

        for item_id in library_item_ids {
            sqlx::query(
                r#"
                INSERT INTO goal_description_library_items (goal_description_id, library_item_id)
                VALUES (?1, ?2)
                "#,
            )
            .bind(description.id)
            .bind(item_id)
            .execute(&mut *self.tx)
            .await?;
        }

        self.writes += 1;
        Ok(())
    }

    async fn insert_instance(&mut self, instance: &GoalInstance) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO goal_instances
                (id, goal_description_id, previous_goal_instance_id, start_timestamp,
                 target_seconds, end_timestamp, created_at, modified_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(instance.id)
        .bind(instance.description_id)
        .bind(instance.previous_instance_id)
        .bind(instance.start_timestamp)
        .bind(to_seconds(instance.target))
        .bind(instance.end_timestamp)
        .bind(instance.created_at)
        .bind(instance.modified_at)
        .execute(&mut *self.tx)
        .await?;

        self.writes += 1;
        Ok(())
    }

    async fn update_description(
        &mut self,
        id: Uuid,
        update: &GoalDescriptionUpdateAttributes,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE goal_descriptions
            SET paused = COALESCE(?2, paused),
                archived = COALESCE(?3, archived),
                repeat = COALESCE(?4, repeat),
                custom_order = CASE WHEN ?5 THEN ?6 ELSE custom_order END,
                deleted_at = CASE WHEN ?7 THEN ?8 ELSE deleted_at END,
                modified_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.paused)
        .bind(update.archived)
        .bind(update.repeat)
        .bind(update.custom_order.is_some())
        .bind(update.custom_order.flatten())
        .bind(update.deleted_at.is_some())
        .bind(update.deleted_at.flatten())
        .bind(modified_at)
        .execute(&mut *self.tx)
        .await?;

        Self::expect_row(result.rows_affected(), "Goal description", id)?;
        self.writes += 1;
        Ok(())
    }

    async fn update_instance(
        &mut self,
        id: Uuid,
        update: &GoalInstanceUpdateAttributes,
        modified_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE goal_instances
            SET target_seconds = COALESCE(?2, target_seconds),
                end_timestamp = CASE WHEN ?3 THEN ?4 ELSE end_timestamp END,
                modified_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(update.target.map(to_seconds))
        .bind(update.end_timestamp.is_some())
        .bind(update.end_timestamp.flatten())
        .bind(modified_at)
        .execute(&mut *self.tx)
        .await?;

        Self::expect_row(result.rows_affected(), "Goal instance", id)?;
        self.writes += 1;
        Ok(())
    }

    async fn delete_instance(&mut self, id: Uuid) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM goal_instances WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Self::expect_row(result.rows_affected(), "Goal instance", id)?;
        self.writes += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CoreError> {
        let this = *self;
        this.tx.commit().await?;

        if this.writes > 0 {
            debug!(writes = this.writes, "Goal transaction committed");
            bump(&this.revision);
        }
        Ok(())
    }
}

#[async_trait]
impl GoalPersistence for SqlitePersistence {
    /// Goal transactions read before they write, so the write lock is taken
    /// up front. A deferred transaction upgrading from a read lock fails
    /// immediately with `SQLITE_BUSY` instead of waiting for the busy timeout.
    async fn begin(&self) -> Result<Box<dyn GoalTransaction>, CoreError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteGoalTransaction {
            tx,
            revision: Arc::clone(&self.goals),
            writes: 0,
        }))
    }

    async fn get_goal(&self, description_id: Uuid) -> Result<Option<GoalRecord>, CoreError> {
        let Some(description) =
            sqlx::query_as::<_, GoalDescription>("SELECT * FROM goal_descriptions WHERE id = ?")
                .bind(description_id)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };

        let instances = sqlx::query_as::<_, GoalInstanceRow>(
            "SELECT * FROM goal_instances WHERE goal_description_id = ? ORDER BY start_timestamp",
        )
        .bind(description_id)
        .fetch_all(&self.pool)
        .await?;

        let library_item_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT library_item_id FROM goal_description_library_items
            WHERE goal_description_id = ?
            ORDER BY library_item_id
            "#,
        )
        .bind(description_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(GoalRecord {
            description,
            instances: instances.into_iter().map(Into::into).collect(),
            library_item_ids,
        }))
    }

    async fn list_goals(&self) -> Result<Vec<GoalRecord>, CoreError> {
        let descriptions = sqlx::query_as::<_, GoalDescription>(
            "SELECT * FROM goal_descriptions WHERE deleted_at IS NULL ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let instance_rows = sqlx::query_as::<_, GoalInstanceRow>(
            r#"
            SELECT i.*
            FROM goal_instances i
            JOIN goal_descriptions d ON d.id = i.goal_description_id
            WHERE d.deleted_at IS NULL
            ORDER BY i.start_timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut links = fetch_active_item_links(&self.pool).await?;

        let mut instances: HashMap<Uuid, Vec<GoalInstance>> = HashMap::new();
        for row in instance_rows {
            instances
                .entry(row.goal_description_id)
                .or_default()
                .push(row.into());
        }

        Ok(descriptions
            .into_iter()
            .map(|description| GoalRecord {
                instances: instances.remove(&description.id).unwrap_or_default(),
                library_item_ids: links.remove(&description.id).unwrap_or_default(),
                description,
            })
            .collect())
    }

    async fn list_latest_instances(
        &self,
    ) -> Result<Vec<GoalInstanceWithDescriptionAndItems>, CoreError> {
        let instances = fetch_latest_instances(&self.pool).await?;
        let descriptions = fetch_active_descriptions(&self.pool).await?;
        let links = fetch_active_item_links(&self.pool).await?;

        Ok(pair_with_descriptions(instances, &descriptions)
            .into_iter()
            .map(|pair| GoalInstanceWithDescriptionAndItems {
                library_item_ids: links.get(&pair.description.id).cloned().unwrap_or_default(),
                instance: pair.instance,
                description: pair.description,
            })
            .collect())
    }

    async fn list_finalized_instances(
        &self,
        limit: i64,
    ) -> Result<Vec<GoalInstanceWithDescription>, CoreError> {
        let rows = sqlx::query_as::<_, GoalInstanceRow>(
            r#"
            SELECT i.*
            FROM goal_instances i
            JOIN goal_descriptions d ON d.id = i.goal_description_id
            WHERE d.deleted_at IS NULL AND i.end_timestamp IS NOT NULL
            ORDER BY i.end_timestamp DESC, i.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let descriptions = fetch_active_descriptions(&self.pool).await?;
        Ok(pair_with_descriptions(
            rows.into_iter().map(Into::into).collect(),
            &descriptions,
        ))
    }

    fn subscribe_goals(&self) -> watch::Receiver<u64> {
        self.goals.subscribe()
    }

    async fn purge_deleted_goals(&self, deleted_before: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "DELETE FROM goal_descriptions WHERE deleted_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(deleted_before)
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            bump(&self.goals);
        }
        Ok(purged)
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}

#[async_trait]
impl LibraryItemSource for SqlitePersistence {
    async fn existing_library_item_ids(&self) -> Result<HashSet<Uuid>, CoreError> {
        let ids =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM library_items WHERE deleted_at IS NULL")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().collect())
    }

    fn subscribe_library_items(&self) -> watch::Receiver<u64> {
        self.library_items.subscribe()
    }
}

#[async_trait]
impl SessionSource for SqlitePersistence {
    async fn sections_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PracticeSection>, CoreError> {
        let rows = sqlx::query_as::<_, PracticeSectionRow>(
            r#"
            SELECT id, session_id, library_item_id, start_timestamp, duration_seconds
            FROM practice_sections
            WHERE start_timestamp >= ?1 AND start_timestamp < ?2
            ORDER BY start_timestamp
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn subscribe_sections(&self) -> watch::Receiver<u64> {
        self.sections.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoalPeriodUnit, GoalProgressType, GoalType};
    use chrono::TimeZone;

    /// Create an in-memory SQLite pool for testing.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::run_sqlite(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn description(id: Uuid) -> GoalDescription {
        GoalDescription {
            id,
            goal_type: GoalType::NonSpecific,
            repeat: true,
            period_in_period_units: 1,
            period_unit: GoalPeriodUnit::Day,
            progress_type: GoalProgressType::Time,
            paused: false,
            archived: false,
            custom_order: None,
            created_at: at(10),
            modified_at: at(10),
            deleted_at: None,
        }
    }

    fn instance(description_id: Uuid, previous: Option<Uuid>, day: u32) -> GoalInstance {
        GoalInstance {
            id: Uuid::new_v4(),
            description_id,
            previous_instance_id: previous,
            start_timestamp: at(day),
            target: Duration::from_secs(3600),
            end_timestamp: None,
            created_at: at(day),
            modified_at: at(day),
        }
    }

    async fn seed_goal(persistence: &SqlitePersistence) -> (Uuid, GoalInstance) {
        let id = Uuid::new_v4();
        let first = instance(id, None, 10);

        let mut tx = persistence.begin().await.unwrap();
        tx.insert_description(&description(id), &[]).await.unwrap();
        tx.insert_instance(&first).await.unwrap();
        tx.commit().await.unwrap();

        (id, first)
    }

    #[tokio::test]
    async fn test_insert_and_get_goal() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, first) = seed_goal(&persistence).await;

        let record = persistence
            .get_goal(id)
            .await
            .expect("Query should succeed")
            .expect("Goal should exist");

        assert_eq!(record.description, description(id));
        assert_eq!(record.instances, vec![first]);
        assert!(record.library_item_ids.is_empty());
    }

    #[tokio::test]
    async fn test_get_goal_not_found() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let result = persistence.get_goal(Uuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_latest_instance_follows_chain() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, first) = seed_goal(&persistence).await;
        let second = instance(id, Some(first.id), 11);

        let mut tx = persistence.begin().await.unwrap();
        tx.update_instance(
            first.id,
            &GoalInstanceUpdateAttributes {
                end_timestamp: Some(Some(at(11))),
                ..Default::default()
            },
            at(11),
        )
        .await
        .unwrap();
        tx.insert_instance(&second).await.unwrap();

        let latest = tx.latest_instance_for(id).await.unwrap();
        assert_eq!(latest.map(|i| i.id), Some(second.id));
        tx.commit().await.unwrap();

        let latest = persistence.list_latest_instances().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].instance, second);

        let finalized = persistence.list_finalized_instances(10).await.unwrap();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].instance.id, first.id);
        assert_eq!(finalized[0].instance.end_timestamp, Some(at(11)));
    }

    #[tokio::test]
    async fn test_rollback_on_drop() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let id = Uuid::new_v4();

        {
            let mut tx = persistence.begin().await.unwrap();
            tx.insert_description(&description(id), &[]).await.unwrap();
        }

        assert!(persistence.get_goal(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fork_is_rejected() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, first) = seed_goal(&persistence).await;

        let mut tx = persistence.begin().await.unwrap();
        tx.insert_instance(&instance(id, Some(first.id), 11))
            .await
            .unwrap();
        let result = tx.insert_instance(&instance(id, Some(first.id), 12)).await;

        assert!(matches!(result, Err(CoreError::DatabaseError { .. })));
    }

    #[tokio::test]
    async fn test_update_description_partial() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, _) = seed_goal(&persistence).await;

        let mut tx = persistence.begin().await.unwrap();
        tx.update_description(
            id,
            &GoalDescriptionUpdateAttributes {
                paused: Some(true),
                custom_order: Some(Some(3)),
                ..Default::default()
            },
            at(12),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = persistence.get_goal(id).await.unwrap().unwrap().description;
        assert!(stored.paused);
        assert!(!stored.archived);
        assert!(stored.repeat);
        assert_eq!(stored.custom_order, Some(3));
        assert_eq!(stored.modified_at, at(12));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_illegal_state() {
        let persistence = SqlitePersistence::new(test_pool().await);

        let mut tx = persistence.begin().await.unwrap();
        let result = tx.delete_instance(Uuid::new_v4()).await;

        assert_eq!(result.unwrap_err().error_code(), "ILLEGAL_STATE");
    }

    #[tokio::test]
    async fn test_soft_deleted_goals_hidden_from_listings() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, _) = seed_goal(&persistence).await;

        let mut tx = persistence.begin().await.unwrap();
        tx.update_description(
            id,
            &GoalDescriptionUpdateAttributes {
                deleted_at: Some(Some(at(12))),
                ..Default::default()
            },
            at(12),
        )
        .await
        .unwrap();
        assert!(tx.latest_instances().await.unwrap().is_empty());
        tx.commit().await.unwrap();

        assert!(persistence.list_goals().await.unwrap().is_empty());
        assert!(persistence.list_latest_instances().await.unwrap().is_empty());
        assert!(persistence.get_goal(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_deleted_goals_cascades() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let (id, _) = seed_goal(&persistence).await;
        let (kept, _) = seed_goal(&persistence).await;

        let mut tx = persistence.begin().await.unwrap();
        tx.update_description(
            id,
            &GoalDescriptionUpdateAttributes {
                deleted_at: Some(Some(at(12))),
                ..Default::default()
            },
            at(12),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(persistence.purge_deleted_goals(at(12)).await.unwrap(), 0);
        assert_eq!(persistence.purge_deleted_goals(at(13)).await.unwrap(), 1);

        assert!(persistence.get_goal(id).await.unwrap().is_none());
        assert!(persistence.get_goal(kept).await.unwrap().is_some());

        let orphans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM goal_instances WHERE goal_description_id = ?",
        )
        .bind(id)
        .fetch_one(persistence.pool())
        .await
        .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_commit_bumps_revision_only_after_writes() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let rx = persistence.subscribe_goals();

        let tx = persistence.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(*rx.borrow(), 0);

        seed_goal(&persistence).await;
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn test_library_items_and_sections() {
        let persistence = SqlitePersistence::new(test_pool().await);
        let item = Uuid::new_v4();
        let gone = Uuid::new_v4();

        persistence
            .insert_library_item(item, "Etude", at(1))
            .await
            .unwrap();
        persistence
            .insert_library_item(gone, "Scales", at(1))
            .await
            .unwrap();
        assert!(persistence.delete_library_item(gone, at(2)).await.unwrap());

        let existing = persistence.existing_library_item_ids().await.unwrap();
        assert_eq!(existing, HashSet::from([item]));

        let section = PracticeSection {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            library_item_id: item,
            start_timestamp: at(10),
            duration: Duration::from_secs(900),
        };
        persistence.insert_section(&section).await.unwrap();

        let found = persistence.sections_in_range(at(10), at(11)).await.unwrap();
        assert_eq!(found, vec![section]);
        assert!(
            persistence
                .sections_in_range(at(11), at(12))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let persistence = SqlitePersistence::new(test_pool().await);
        assert!(persistence.health_check_db().await.unwrap());
    }
}
