//! Common test utilities for BAT Points integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;

use batpoints_core::{Account, UserId};
use batpoints_service::auth::JwtClaims;
use batpoints_service::chain::{ChainTransfer, TransferRequest, TransferStatus, TxHash};
use batpoints_service::notify::NotifyError;
use batpoints_service::{
    create_router, AppState, ChainError, ChainGateway, ConversionEngine, ConversionRecovery,
    LedgerEvent, Notifier, PollSettings, ServiceConfig, TipEngine,
};
use batpoints_store::{MemoryStore, Store};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

/// What the fake relayer does with the next payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBehavior {
    /// Transfer confirmed immediately.
    Confirm,
    /// Treasury too small and minting disabled.
    Shortfall,
    /// Relayer down; nothing submitted.
    Unreachable,
    /// Transfer confirmed but the response was lost.
    LostResponse,
    /// Transfer submitted but never confirms; response lost.
    StuckPending,
}

/// Scriptable in-process relayer.
pub struct FakeChainGateway {
    behavior: Mutex<ChainBehavior>,
    transfers: Mutex<HashMap<String, ChainTransfer>>,
    delay: Mutex<Duration>,
    submissions: AtomicUsize,
}

impl FakeChainGateway {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(ChainBehavior::Confirm),
            transfers: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            submissions: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: ChainBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Delay every submission, to simulate a slow relayer.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Overwrite what the relayer reports for `reference`.
    pub fn set_transfer(&self, reference: &str, status: TransferStatus) {
        let transfer = ChainTransfer {
            reference: reference.to_string(),
            tx_hash: Some(hash_for(reference)),
            status,
        };
        self.transfers
            .lock()
            .unwrap()
            .insert(reference.to_string(), transfer);
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

pub fn hash_for(reference: &str) -> String {
    format!("0xhash-{reference}")
}

fn outage() -> ChainError {
    ChainError::Api {
        status: 503,
        message: "relayer unavailable".into(),
    }
}

#[async_trait]
impl ChainGateway for FakeChainGateway {
    async fn transfer_or_mint(&self, request: &TransferRequest) -> Result<TxHash, ChainError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            ChainBehavior::Confirm => {
                self.set_transfer(&request.reference, TransferStatus::Confirmed);
                Ok(TxHash(hash_for(&request.reference)))
            }
            ChainBehavior::Shortfall => Err(ChainError::InsufficientTreasury {
                available: Decimal::ONE,
                required: request.amount,
            }),
            ChainBehavior::Unreachable => Err(outage()),
            ChainBehavior::LostResponse => {
                self.set_transfer(&request.reference, TransferStatus::Confirmed);
                Err(outage())
            }
            ChainBehavior::StuckPending => {
                self.set_transfer(&request.reference, TransferStatus::Pending);
                Err(outage())
            }
        }
    }

    async fn get_balance(&self, _address: &str) -> Result<Decimal, ChainError> {
        Ok(Decimal::new(1_000_000, 0))
    }

    async fn find_transfer(&self, reference: &str) -> Result<Option<ChainTransfer>, ChainError> {
        Ok(self.transfers.lock().unwrap().get(reference).cloned())
    }
}

/// Notifier that keeps every event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(UserId, LedgerEvent)>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<(UserId, LedgerEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, user_id: &UserId) -> Vec<LedgerEvent> {
        self.events()
            .into_iter()
            .filter(|(u, _)| u == user_id)
            .map(|(_, e)| e)
            .collect()
    }

    /// Wait for spawned emits to land.
    pub async fn wait_for(&self, count: usize) -> Vec<(UserId, LedgerEvent)> {
        for _ in 0..100 {
            if self.events.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(&self, user_id: &UserId, event: &LedgerEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push((*user_id, event.clone()));
        Ok(())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The ledger behind the server.
    pub store: Arc<MemoryStore>,
    /// The fake relayer.
    pub chain: Arc<FakeChainGateway>,
    /// Every emitted notification.
    pub notifier: Arc<RecordingNotifier>,
    /// Engines sharing the server's store.
    pub tips: TipEngine,
    pub conversions: ConversionEngine,
    pub recovery: Arc<ConversionRecovery>,
}

impl TestHarness {
    /// Create a harness with an empty in-memory ledger.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let chain = Arc::new(FakeChainGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            ..ServiceConfig::default()
        };

        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::with_components(dyn_store, config, chain.clone(), notifier.clone());
        let conversions = state.conversions.clone().with_poll_settings(PollSettings {
            attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        });
        let state = state.with_conversion_engine(conversions.clone());
        let tips = state.tips.clone();
        let recovery = Arc::clone(&state.recovery);

        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            store,
            chain,
            notifier,
            tips,
            conversions,
            recovery,
        }
    }

    /// Create an account with exactly `points`.
    pub fn funded_user(&self, points: i64) -> UserId {
        let user_id = UserId::generate();
        self.store
            .create_account(&Account::new(user_id), 0)
            .expect("Failed to create account");
        if points > 0 {
            self.store
                .apply_delta(&user_id, points, "test funding")
                .expect("Failed to fund account");
        }
        user_id
    }

    pub fn balance(&self, user_id: &UserId) -> i64 {
        self.store.get_balance(user_id).unwrap().balance
    }

    pub fn available(&self, user_id: &UserId) -> i64 {
        self.store.get_balance(user_id).unwrap().available
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid bearer header for `user_id`.
pub fn bearer(user_id: &UserId) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}
