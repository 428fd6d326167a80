// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the maintenance worker and on-disk persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use cadenza_core::goal_handlers::handle_delete_goals;
use cadenza_core::maintenance_worker::{MaintenanceWorker, MaintenanceWorkerConfig};
use cadenza_core::persistence::{GoalPersistence, SqlitePersistence};

use common::{TestContext, at, wednesday_afternoon};

fn worker_config() -> MaintenanceWorkerConfig {
    MaintenanceWorkerConfig {
        enabled: true,
        poll_interval: Duration::from_secs(3600),
        purge_deleted_after: Some(Duration::from_secs(30 * 24 * 3600)),
    }
}

#[tokio::test]
async fn test_run_once_renews_and_purges_old_deletions() {
    let ctx = TestContext::new(wednesday_afternoon()).await;
    let kept = ctx.add_daily(30).await;
    let old = ctx.add_daily(30).await;
    handle_delete_goals(&ctx.goals, &[old]).await.unwrap();

    ctx.time.set(at(2024, 1, 25, 12, 0));
    let recent = ctx.add_daily(30).await;
    handle_delete_goals(&ctx.goals, &[recent]).await.unwrap();

    let worker = MaintenanceWorker::new(ctx.goals.clone(), worker_config());

    // 15 days after the first deletion nothing is purged yet
    worker.run_once().await.unwrap();
    assert!(ctx.persistence.get_goal(old).await.unwrap().is_some());

    ctx.time.set(at(2024, 2, 15, 12, 0));
    let summary = worker.run_once().await.unwrap();
    assert!(summary.renewed > 0);

    assert!(ctx.persistence.get_goal(old).await.unwrap().is_none());
    assert!(ctx.persistence.get_goal(recent).await.unwrap().is_some());
    assert_eq!(
        ctx.instances(kept).await.last().unwrap().start_timestamp,
        at(2024, 2, 15, 0, 0)
    );
}

#[tokio::test]
async fn test_run_once_without_retention_keeps_deleted_goals() {
    let ctx = TestContext::new(wednesday_afternoon()).await;
    let id = ctx.add_daily(30).await;
    handle_delete_goals(&ctx.goals, &[id]).await.unwrap();

    let worker = MaintenanceWorker::new(
        ctx.goals.clone(),
        MaintenanceWorkerConfig {
            purge_deleted_after: None,
            ..worker_config()
        },
    );
    ctx.time.set(at(2025, 1, 1, 0, 0));
    worker.run_once().await.unwrap();

    assert!(ctx.persistence.get_goal(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let ctx = TestContext::new(wednesday_afternoon()).await;
    let worker = MaintenanceWorker::new(ctx.goals.clone(), worker_config());
    let shutdown = worker.shutdown_handle();

    let handle = tokio::spawn(async move { worker.run().await });
    shutdown.notify_one();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Worker should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_disabled_worker_returns_immediately() {
    let ctx = TestContext::new(wednesday_afternoon()).await;
    let worker = MaintenanceWorker::new(
        ctx.goals.clone(),
        MaintenanceWorkerConfig {
            enabled: false,
            ..worker_config()
        },
    );

    tokio::time::timeout(Duration::from_secs(5), worker.run())
        .await
        .expect("Disabled worker should not loop");
}

#[tokio::test]
async fn test_goals_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("cadenza.db");

    let persistence = Arc::new(SqlitePersistence::from_path(&path).await.unwrap());
    let ctx = TestContext::with_persistence(persistence.clone(), wednesday_afternoon());
    let id = ctx.add_daily(30).await;
    persistence.pool().close().await;
    drop(ctx);

    let reopened = SqlitePersistence::from_path(&path).await.unwrap();
    assert!(reopened.health_check_db().await.unwrap());

    let record = reopened.get_goal(id).await.unwrap().expect("Goal persisted");
    assert_eq!(record.instances.len(), 1);
    assert_eq!(record.instances[0].start_timestamp, at(2024, 1, 10, 0, 0));
}
