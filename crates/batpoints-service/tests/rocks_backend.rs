//! Engines running on the RocksDB store.

#![cfg(feature = "rocksdb-backend")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use batpoints_core::{Account, ConversionPolicy, ConversionStatus, LedgerError, TipPolicy, UserId};
use batpoints_service::{ConversionEngine, TipEngine, TipRequest};
use batpoints_store::{RocksStore, Store};

use common::{FakeChainGateway, RecordingNotifier, WALLET};

fn open() -> (TempDir, Arc<dyn Store>) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = RocksStore::open(dir.path()).expect("Failed to open store");
    (dir, Arc::new(store))
}

fn funded(store: &Arc<dyn Store>, points: i64) -> UserId {
    let user_id = UserId::generate();
    store.create_account(&Account::new(user_id), points).unwrap();
    user_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tips_never_overdraw() {
    let (_dir, store) = open();
    let tips = TipEngine::new(
        Arc::clone(&store),
        Arc::new(RecordingNotifier::default()),
        TipPolicy::default(),
    );
    let sender = funded(&store, 30);
    let recipients: Vec<UserId> = (0..50).map(|_| funded(&store, 0)).collect();

    let tasks = recipients.iter().map(|recipient| {
        let tips = tips.clone();
        let request = TipRequest {
            recipient_id: *recipient,
            amount: 1,
            message: None,
            content_id: None,
        };
        tokio::spawn(async move { tips.send_tip(sender, request).await })
    });
    let results = futures::future::join_all(tasks).await;

    let succeeded = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(LedgerError::InsufficientBalance { .. }))))
        .count();
    assert_eq!(succeeded, 30);
    assert_eq!(rejected, 20);

    assert_eq!(store.get_balance(&sender).unwrap().balance, 0);
    let received: i64 = recipients
        .iter()
        .map(|r| store.get_balance(r).unwrap().balance)
        .sum();
    assert_eq!(received, 30);
}

#[tokio::test]
async fn conversion_settles_against_rocksdb() {
    let (_dir, store) = open();
    let engine = ConversionEngine::new(
        Arc::clone(&store),
        Arc::new(FakeChainGateway::new()),
        Arc::new(RecordingNotifier::default()),
        ConversionPolicy::default(),
    );
    let user = funded(&store, 500);

    let record = engine.convert(user, 300, WALLET).await.unwrap();

    assert_eq!(record.status, ConversionStatus::Completed);
    let balance = store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.held, 0);
    assert!(store.list_processing_conversions().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_conversions_recheck_balance() {
    let (_dir, store) = open();
    let chain = Arc::new(FakeChainGateway::new());
    chain.set_delay(Duration::from_millis(50));
    let engine = ConversionEngine::new(
        Arc::clone(&store),
        chain.clone(),
        Arc::new(RecordingNotifier::default()),
        ConversionPolicy::default(),
    );
    let user = funded(&store, 500);

    let first = engine.clone();
    let second = engine.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.convert(user, 300, WALLET).await }),
        tokio::spawn(async move { second.convert(user, 300, WALLET).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let completed = results
        .iter()
        .filter(|r| matches!(r, Ok(record) if record.status == ConversionStatus::Completed))
        .count();
    let insufficient = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InsufficientBalance { .. })))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(insufficient, 1);
    assert_eq!(chain.submissions(), 1);

    let balance = store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.held, 0);
}
