// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concurrent use cases against an on-disk store.

mod common;

use std::sync::Arc;

use cadenza_core::goal_handlers::{handle_pause_goals, handle_update_outdated_goals};
use cadenza_core::persistence::{GoalPersistence, SqlitePersistence};

use common::{TestContext, at, wednesday_afternoon};

const GOALS: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_writers_wait_for_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadenza.db");
    let persistence = Arc::new(SqlitePersistence::from_path(&path).await.unwrap());
    let ctx = TestContext::with_persistence(persistence.clone(), wednesday_afternoon());

    let mut ids = Vec::with_capacity(GOALS);
    for _ in 0..GOALS {
        ids.push(ctx.add_daily(30).await);
    }

    // Seven weeks later every goal has dozens of outdated periods
    ctx.time.set(at(2024, 2, 28, 9, 0));

    let mut handles = Vec::with_capacity(GOALS);
    for (i, id) in ids.iter().copied().enumerate() {
        let goals = ctx.goals.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                handle_update_outdated_goals(&goals).await.map(|_| ())
            } else {
                handle_pause_goals(&goals, &[id]).await
            }
        }));
    }
    for handle in handles {
        handle
            .await
            .unwrap()
            .expect("Concurrent use case should wait for the write lock");
    }

    assert!(
        handle_update_outdated_goals(&ctx.goals)
            .await
            .unwrap()
            .is_empty()
    );

    for (i, id) in ids.iter().enumerate() {
        let record = persistence.get_goal(*id).await.unwrap().unwrap();
        assert_eq!(record.description.paused, i % 2 == 1);

        let chain = record.chain();
        assert!(chain.verify().is_ok(), "goal {} has a broken chain", id);
        let latest = chain.latest().unwrap();
        assert!(latest.is_open());
        assert_eq!(latest.start_timestamp, at(2024, 2, 28, 0, 0));
    }
}
