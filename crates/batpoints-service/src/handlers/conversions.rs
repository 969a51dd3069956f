//! Conversion handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use batpoints_core::{ConversionId, ConversionRecord};

use crate::auth::AuthUser;
use crate::engine::{Paging, RateInfo};
use crate::error::ApiError;
use crate::state::AppState;

/// Conversion request.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    /// Points to convert.
    pub points_amount: i64,
    /// Wallet receiving the tokens.
    pub destination_address: String,
}

/// Conversion response.
#[derive(Debug, Serialize)]
pub struct ConversionResponse {
    /// Conversion ID.
    pub id: String,
    /// Points converted.
    pub points_amount: i64,
    /// Tokens owed.
    pub estimated_tokens: Decimal,
    /// Wallet receiving the tokens.
    pub destination_address: String,
    /// `processing`, `completed` or `failed`.
    pub status: &'static str,
    /// Chain transaction hash.
    pub transaction_hash: Option<String>,
    /// Failure reason.
    pub error_message: Option<String>,
    /// Rate at request time.
    pub rate_at_request: Decimal,
    /// Target chain.
    pub chain_id: u64,
    /// Request timestamp.
    pub created_at: String,
    /// Finalization timestamp.
    pub processed_at: Option<String>,
}

impl From<&ConversionRecord> for ConversionResponse {
    fn from(record: &ConversionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            points_amount: record.points_amount,
            estimated_tokens: record.estimated_tokens,
            destination_address: record.destination_address.clone(),
            status: record.status.as_str(),
            transaction_hash: record.transaction_hash.clone(),
            error_message: record.error_message.clone(),
            rate_at_request: record.rate_at_request,
            chain_id: record.chain_id,
            created_at: record.created_at.to_rfc3339(),
            processed_at: record.processed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Convert points to tokens.
///
/// Returns 201 with a completed record, or 202 when the payout is still
/// being confirmed.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<ConvertRequest>,
) -> Result<(StatusCode, Json<ConversionResponse>), ApiError> {
    let record = state
        .conversions
        .convert(auth.user_id, req.points_amount, req.destination_address.trim())
        .await?;

    let status = if record.is_terminal() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(ConversionResponse::from(&record))))
}

/// Paginated conversion history.
#[derive(Debug, Serialize)]
pub struct ConversionHistoryResponse {
    /// Conversions, newest first.
    pub conversions: Vec<ConversionResponse>,
    /// Total conversions.
    pub total: usize,
    /// Page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
}

/// The authenticated user's conversions.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> Result<Json<ConversionHistoryResponse>, ApiError> {
    let paging = paging.normalized();
    let page = state
        .conversions
        .get_conversion_history(&auth.user_id, paging)?;

    Ok(Json(ConversionHistoryResponse {
        conversions: page.items.iter().map(ConversionResponse::from).collect(),
        total: page.total,
        page: paging.page,
        limit: paging.limit,
    }))
}

/// One of the authenticated user's conversions.
pub async fn get_conversion(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ConversionResponse>, ApiError> {
    let id: ConversionId = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid conversion ID".into()))?;

    let record = state.conversions.get_conversion_by_id(&id, &auth.user_id)?;
    Ok(Json(ConversionResponse::from(&record)))
}

/// Current conversion terms.
pub async fn rate(State(state): State<Arc<AppState>>) -> Json<RateInfo> {
    Json(state.conversions.rate())
}
