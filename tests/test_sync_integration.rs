//! End-to-end sync scenarios over a real SQLite file
//!
//! - restart resumes both walks from the durable cursors
//! - new mints reach the leaderboard through the counter watcher
//! - a crashed points holder blocks later cycles until its lock is stale

mod common;

use common::{address, make_jobs, MockChain, TestDb};
use pointsflow::query::QueryService;
use pointsflow::sync::{CounterWatcher, CycleState, ProgressStore, RecordStore, SyncError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_restart_resumes_token_walk() {
    let db = TestDb::new();
    let chain = Arc::new(MockChain::new());
    for tail in [1, 2, 3, 4, 5] {
        chain.mint(&address(tail));
    }
    chain.break_token(3);

    {
        let store = db.open();
        let (token_job, _) = make_jobs(chain.clone(), store.clone());
        let summary = token_job.run().await.unwrap();
        assert_eq!(summary.failed, vec![3]);
        assert_eq!(store.token_cursor().await.unwrap(), 2);
    }

    // New process on the same file
    chain.heal(3);
    chain.mint(&address(6));
    let store = db.open();
    let (token_job, _) = make_jobs(chain.clone(), store.clone());
    let summary = token_job.run().await.unwrap();

    assert_eq!(summary.start_cursor, 2);
    assert_eq!(summary.end_cursor, 6);
    assert_eq!(store.token_count().await.unwrap(), 6);

    // 1 and 2 were fetched exactly once across both processes
    let calls = chain.owner_calls();
    assert_eq!(calls.iter().filter(|id| **id == 1).count(), 1);
    assert_eq!(calls.iter().filter(|id| **id == 2).count(), 1);
    assert_eq!(calls.iter().filter(|id| **id == 3).count(), 2);
}

#[tokio::test]
async fn test_tokens_then_points_then_queries() {
    let db = TestDb::new();
    let store = db.open();
    let chain = Arc::new(MockChain::new());
    let alice = address(0xa);
    let bob = address(0xb);
    let carol = address(0xc);
    chain.mint(&alice.to_uppercase().replacen("0X", "0x", 1));
    chain.mint(&bob);
    chain.mint(&alice);
    chain.mint(&carol);
    chain.set_points(&alice, 50.0);
    chain.set_points(&bob, 10.0);
    chain.set_points(&carol, 100.0);

    let (token_job, points_job) = make_jobs(chain, store.clone());
    token_job.run().await.unwrap();
    let summary = points_job.run().await.unwrap();
    assert_eq!(summary.total_addresses, 3);
    assert!(summary.completed);

    let query = QueryService::new(store.clone(), store.clone());

    let board = query.leaderboard().await.unwrap().leaderboard;
    let order: Vec<&str> = board.iter().map(|r| r.address.as_str()).collect();
    assert_eq!(order, vec![carol.as_str(), alice.as_str(), bob.as_str()]);

    let alice_tokens = query.tokens(Some(&alice)).await.unwrap();
    assert_eq!(alice_tokens.total_tokens, 2);

    let status = query.database_status().await.unwrap();
    assert_eq!(status.total_tokens, 4);
    assert_eq!(status.last_processed_token_id, 4);
    assert_eq!(status.last_processed_address_index, 0);
    assert!(!status.points_lock);

    let cycle = query.points_update_status().await.unwrap().unwrap();
    assert_eq!(cycle.state, CycleState::Completed);
}

#[tokio::test]
async fn test_new_mint_reaches_leaderboard_via_watcher() {
    let db = TestDb::new();
    let store = db.open();
    let chain = Arc::new(MockChain::new());
    chain.mint(&address(1));

    let (token_job, points_job) = make_jobs(chain.clone(), store.clone());
    token_job.run().await.unwrap();

    let mut watcher = CounterWatcher::new(token_job, points_job);
    watcher.tick().await.unwrap();

    let newcomer = address(0xfeed);
    chain.set_points(&newcomer, 7.25);
    chain.mint(&newcomer);

    let synced = watcher.tick().await.unwrap();
    assert_eq!(synced, vec![(2, newcomer.clone())]);

    // Range (1, 2] continues cursor 1
    assert_eq!(store.token_cursor().await.unwrap(), 2);
    assert_eq!(store.points_for(&newcomer).await.unwrap(), Some(7.25));
}

#[tokio::test]
async fn test_crashed_lock_holder_blocks_until_stale() {
    let db = TestDb::new();
    let chain = Arc::new(MockChain::new());
    chain.mint(&address(1));

    // A process that took the lock and died
    let crashed = db.open();
    assert!(crashed.try_acquire_lock().await.unwrap());
    drop(crashed);

    let store = db.open();
    let (_, points_job) = make_jobs(chain.clone(), store.clone());
    let err = points_job.run().await.unwrap_err();
    assert!(matches!(err, SyncError::LockContention));

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let store = Arc::new(
        pointsflow::sync::SqliteStore::new(db.path())
            .unwrap()
            .with_lock_ttl(Duration::from_secs(1)),
    );
    let (token_job, points_job) = make_jobs(chain, store.clone());
    token_job.run().await.unwrap();
    let summary = points_job.run().await.unwrap();

    assert!(summary.completed);
    assert!(!store.cursor().await.unwrap().lock);
}
