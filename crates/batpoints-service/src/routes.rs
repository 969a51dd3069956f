//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, content, conversions, health, points, tips};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent conversion requests. Each holds a relayer call open.
const CONVERSION_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/conversions/rate` - Conversion rate and limits
/// - `GET /v1/content/:id/tips` - Content tip counters
///
/// ## Accounts and points (user JWT)
/// - `POST /v1/accounts` - Create account with signup bonus
/// - `GET /v1/accounts/me` - Current user's account
/// - `GET /v1/points/balance` - Balance
/// - `GET /v1/points/transactions` - Journal
///
/// ## Tips (user JWT)
/// - `POST /v1/tips` - Send a tip
/// - `GET /v1/tips/sent`, `GET /v1/tips/received` - Tip history
/// - `GET /v1/tips/:id` - Tip by ID
///
/// ## Conversions (user JWT)
/// - `POST /v1/conversions` - Convert points to tokens
/// - `GET /v1/conversions/history` - Conversion history
/// - `GET /v1/conversions/:id` - Conversion by ID
///
/// ## Content (service API key)
/// - `POST /v1/content` - Register a content item
///
/// ## Admin (admin key)
/// - `POST /v1/points/adjust` - Adjust one balance
/// - `POST /v1/points/transfer` - Move points between two accounts
/// - `POST /v1/admin/conversions/reconcile` - Recovery sweep
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let conversion_routes = Router::new()
        .route("/", post(conversions::convert))
        .route("/rate", get(conversions::rate))
        .route("/history", get(conversions::history))
        .route("/:id", get(conversions::get_conversion))
        .layer(ConcurrencyLimitLayer::new(CONVERSION_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Points
        .route("/points/balance", get(points::get_balance))
        .route("/points/transactions", get(points::list_transactions))
        .route("/points/adjust", post(points::adjust))
        .route("/points/transfer", post(points::transfer))
        // Tips
        .route("/tips", post(tips::send_tip))
        .route("/tips/sent", get(tips::list_sent))
        .route("/tips/received", get(tips::list_received))
        .route("/tips/:id", get(tips::get_tip))
        // Content
        .route("/content", post(content::register_content))
        .route("/content/:id/tips", get(content::get_content_tips))
        // Admin
        .route(
            "/admin/conversions/reconcile",
            post(admin::reconcile_conversions),
        )
        .nest("/conversions", conversion_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    cors.allow_origin(origins)
}
