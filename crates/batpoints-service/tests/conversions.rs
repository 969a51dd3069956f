//! Conversion engine and recovery integration tests.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{bearer, hash_for, ChainBehavior, TestHarness, ADMIN_API_KEY, WALLET};
use serde_json::json;

use batpoints_core::{ConversionPolicy, ConversionRecord, ConversionStatus, LedgerError, UserId};
use batpoints_service::chain::TransferStatus;
use batpoints_service::{ConversionRecovery, LedgerEvent};
use batpoints_store::{ConversionLimits, Store};

fn convert_body(points: i64) -> serde_json::Value {
    json!({ "points_amount": points, "destination_address": WALLET })
}

/// Open a `processing` conversion without calling the chain, as a crash
/// right after the intent was committed would leave it.
fn orphaned_conversion(harness: &TestHarness, user_id: UserId, points: i64) -> ConversionRecord {
    let policy = ConversionPolicy::default();
    let record = ConversionRecord::processing(user_id, points, WALLET, &policy);
    harness
        .store
        .open_conversion(&record, &ConversionLimits::from(&policy))
        .unwrap();
    record
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn successful_conversion_debits_once() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);

    let response = harness
        .server
        .post("/v1/conversions")
        .add_header("authorization", bearer(&user))
        .json(&convert_body(300))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["estimated_tokens"], "3.00000000");
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["transaction_hash"], hash_for(&id));

    let balance = harness.store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.held, 0);

    let account = harness.store.get_account(&user).unwrap().unwrap();
    assert_eq!(account.lifetime_converted, 300);

    let journal = harness.store.list_transactions_by_user(&user, 1, 0).unwrap();
    assert_eq!(journal.items[0].amount, -300);

    let events = harness.notifier.events_for(&user);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        LedgerEvent::ConversionCompleted {
            points_amount: 300,
            ..
        }
    ));
}

#[tokio::test]
async fn treasury_shortfall_fails_and_releases_hold() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::Shortfall);

    let response = harness
        .server
        .post("/v1/conversions")
        .add_header("authorization", bearer(&user))
        .json(&convert_body(300))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "chain_transfer_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Insufficient treasury balance"));

    let balance = harness.store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 500);
    assert_eq!(balance.held, 0);

    let history = harness.store.list_conversions_by_user(&user, 10, 0).unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.items[0].status, ConversionStatus::Failed);
    let id = body["error"]["details"]["conversion_id"].as_str().unwrap();
    assert_eq!(history.items[0].id.to_string(), id);

    let events = harness.notifier.events_for(&user);
    assert!(matches!(
        events.as_slice(),
        [LedgerEvent::ConversionFailed { points_amount: 300, .. }]
    ));
}

#[tokio::test]
async fn lost_response_is_recovered_by_polling() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::LostResponse);

    let record = harness.conversions.convert(user, 300, WALLET).await.unwrap();

    assert_eq!(record.status, ConversionStatus::Completed);
    assert_eq!(record.transaction_hash, Some(hash_for(&record.id.to_string())));
    assert_eq!(harness.balance(&user), 200);
    assert_eq!(harness.chain.submissions(), 1);
}

#[tokio::test]
async fn outage_keeps_hold_until_transfer_is_known() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::Unreachable);

    let record = harness.conversions.convert(user, 300, WALLET).await.unwrap();

    // The relayer never indexed it, yet that is no proof it was not sent.
    assert_eq!(record.status, ConversionStatus::Processing);
    assert_eq!(harness.balance(&user), 500);
    assert_eq!(harness.available(&user), 200);

    // The relayer accepted it after all.
    harness
        .chain
        .set_transfer(&record.id.to_string(), TransferStatus::Confirmed);
    let done = harness.recovery.reconcile(&record.id).await.unwrap();

    assert_eq!(done.status, ConversionStatus::Completed);
    assert_eq!(harness.balance(&user), 200);
    assert_eq!(harness.store.get_balance(&user).unwrap().held, 0);
}

#[tokio::test]
async fn unconfirmed_transfer_stays_processing_with_hold() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::StuckPending);

    let response = harness
        .server
        .post("/v1/conversions")
        .add_header("authorization", bearer(&user))
        .json(&convert_body(300))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "processing");

    let balance = harness.store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 500);
    assert_eq!(balance.held, 300);
    assert_eq!(balance.available, 200);

    // Held points cannot be tipped away.
    let recipient = harness.funded_user(0);
    let tip = harness
        .server
        .post("/v1/tips")
        .add_header("authorization", bearer(&user))
        .json(&json!({ "recipient_id": recipient, "amount": 201 }))
        .await;
    tip.assert_status(StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn dropped_caller_does_not_abandon_settlement() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_delay(Duration::from_millis(200));

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        harness.conversions.convert(user, 300, WALLET),
    )
    .await;
    assert!(outcome.is_err(), "convert should still be waiting on the chain");

    tokio::time::sleep(Duration::from_millis(500)).await;

    let history = harness.store.list_conversions_by_user(&user, 10, 0).unwrap();
    assert_eq!(history.items[0].status, ConversionStatus::Completed);
    let balance = harness.store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.held, 0);
}

// ============================================================================
// Validation and limits
// ============================================================================

#[tokio::test]
async fn invalid_requests_are_rejected_before_any_write() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);

    for (points, address, code) in [
        (50, WALLET, "invalid_amount"),
        (150, WALLET, "invalid_amount"),
        (300, "0x1234", "bad_request"),
    ] {
        let response = harness
            .server
            .post("/v1/conversions")
            .add_header("authorization", bearer(&user))
            .json(&json!({ "points_amount": points, "destination_address": address }))
            .await;
        response.assert_status_bad_request();
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], code);
    }

    let response = harness
        .server
        .post("/v1/conversions")
        .add_header("authorization", bearer(&user))
        .json(&convert_body(600))
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);

    assert_eq!(harness.store.list_conversions_by_user(&user, 10, 0).unwrap().total, 0);
    assert_eq!(harness.chain.submissions(), 0);
}

#[tokio::test]
async fn in_flight_limit_is_enforced() {
    let harness = TestHarness::new();
    let user = harness.funded_user(1_000);
    harness.chain.set_behavior(ChainBehavior::StuckPending);

    for _ in 0..3 {
        let record = harness.conversions.convert(user, 100, WALLET).await.unwrap();
        assert_eq!(record.status, ConversionStatus::Processing);
    }

    let response = harness
        .server
        .post("/v1/conversions")
        .add_header("authorization", bearer(&user))
        .json(&convert_body(100))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "limit_exceeded");

    assert_eq!(harness.available(&user), 700);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_conversions_recheck_balance() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_delay(Duration::from_millis(50));

    let first = harness.conversions.clone();
    let second = harness.conversions.clone();
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
    assert_eq!(harness.chain.submissions(), 1);

    let balance = harness.store.get_balance(&user).unwrap();
    assert_eq!(balance.balance, 200);
    assert_eq!(balance.held, 0);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn history_and_lookup_are_scoped_to_owner() {
    let harness = TestHarness::new();
    let user = harness.funded_user(1_000);
    let first = harness.conversions.convert(user, 100, WALLET).await.unwrap();
    harness.conversions.convert(user, 200, WALLET).await.unwrap();

    let history = harness
        .server
        .get("/v1/conversions/history?limit=1")
        .add_header("authorization", bearer(&user))
        .await;
    history.assert_status_ok();
    let body: serde_json::Value = history.json();
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["conversions"][0]["points_amount"], 200);

    let path = format!("/v1/conversions/{}", first.id);
    harness
        .server
        .get(&path)
        .add_header("authorization", bearer(&user))
        .await
        .assert_status_ok();
    harness
        .server
        .get(&path)
        .add_header("authorization", bearer(&UserId::generate()))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn rate_is_public() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/conversions/rate").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["points_to_token_rate"], "0.01");
    assert_eq!(body["min_conversion_points"], 100);
    assert_eq!(body["conversion_step_points"], 100);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn reconcile_completes_confirmed_transfer_once() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::StuckPending);
    let record = harness.conversions.convert(user, 300, WALLET).await.unwrap();

    let still = harness.recovery.reconcile(&record.id).await.unwrap();
    assert_eq!(still.status, ConversionStatus::Processing);

    harness
        .chain
        .set_transfer(&record.id.to_string(), TransferStatus::Confirmed);
    let done = harness.recovery.reconcile(&record.id).await.unwrap();
    assert_eq!(done.status, ConversionStatus::Completed);

    let again = harness.recovery.reconcile(&record.id).await.unwrap();
    assert_eq!(again, done);

    assert_eq!(harness.balance(&user), 200);
    assert_eq!(harness.store.get_balance(&user).unwrap().held, 0);
    assert_eq!(harness.notifier.events_for(&user).len(), 1);
}

#[tokio::test]
async fn reconcile_fails_reverted_transfer() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    harness.chain.set_behavior(ChainBehavior::StuckPending);
    let record = harness.conversions.convert(user, 300, WALLET).await.unwrap();

    harness
        .chain
        .set_transfer(&record.id.to_string(), TransferStatus::Failed);
    let failed = harness.recovery.reconcile(&record.id).await.unwrap();

    assert_eq!(failed.status, ConversionStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("Token transfer reverted on chain")
    );
    assert_eq!(harness.available(&user), 500);
}

#[tokio::test]
async fn absent_transfer_fails_only_when_stale() {
    let harness = TestHarness::new();
    let user = harness.funded_user(500);
    let record = orphaned_conversion(&harness, user, 300);

    let fresh = harness.recovery.reconcile(&record.id).await.unwrap();
    assert_eq!(fresh.status, ConversionStatus::Processing);

    let impatient = ConversionRecovery::new(
        harness.store.clone(),
        harness.chain.clone(),
        harness.notifier.clone(),
        Duration::ZERO,
    );
    let failed = impatient.reconcile(&record.id).await.unwrap();
    assert_eq!(failed.status, ConversionStatus::Failed);
    assert_eq!(
        failed.error_message.as_deref(),
        Some("No matching chain transaction")
    );
    assert_eq!(harness.available(&user), 500);
    assert_eq!(harness.chain.submissions(), 0);
}

#[tokio::test]
async fn admin_sweep_reports_outcomes() {
    let harness = TestHarness::new();
    let user = harness.funded_user(1_000);
    harness.chain.set_behavior(ChainBehavior::StuckPending);
    let confirmed = harness.conversions.convert(user, 100, WALLET).await.unwrap();
    harness.conversions.convert(user, 100, WALLET).await.unwrap();
    harness
        .chain
        .set_transfer(&confirmed.id.to_string(), TransferStatus::Confirmed);

    harness
        .server
        .post("/v1/admin/conversions/reconcile")
        .await
        .assert_status_unauthorized();

    let response = harness
        .server
        .post("/v1/admin/conversions/reconcile")
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["examined"], 2);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["pending"], 1);

    let processing = harness.store.list_processing_conversions().unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(harness.balance(&user), 900);
    assert_eq!(harness.available(&user), 800);
}
