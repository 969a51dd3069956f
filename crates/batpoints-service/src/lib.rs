//! BAT Points HTTP API service.
//!
//! This crate wires the ledger store to the outside world:
//!
//! - [`TipEngine`] - user-to-user tips, committed as one atomic unit
//! - [`ConversionEngine`] - points to on-chain token payouts
//! - [`ConversionRecovery`] - finalizes conversions interrupted mid-flight
//! - [`ChainGateway`] - treasury relayer client
//! - [`Notifier`] - best-effort user notifications
//! - the axum router and its extractors
//!
//! # Authentication
//!
//! 1. **JWT bearer tokens** (HS256) for end users
//! 2. **`x-api-key`** for service-to-service calls
//! 3. **`x-admin-key`** for operator endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers must be async for axum

pub mod auth;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod notify;
pub mod routes;
pub mod state;

pub use chain::{ChainError, ChainGateway, DisabledChainGateway, HttpChainGateway};
pub use config::ServiceConfig;
pub use engine::{
    ConversionEngine, ConversionRecovery, Paging, PollSettings, SweepReport, TipEngine,
    TipRequest,
};
pub use error::ApiError;
pub use notify::{HttpNotifier, LedgerEvent, LogNotifier, Notifier};
pub use routes::create_router;
pub use state::AppState;
