//! Tip handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use batpoints_core::{TipId, TipRecord};
use batpoints_store::Page;

use crate::auth::AuthUser;
use crate::engine::{Paging, TipRequest};
use crate::error::ApiError;
use crate::state::AppState;

/// Tip response.
#[derive(Debug, Serialize)]
pub struct TipResponse {
    /// Tip ID.
    pub id: String,
    /// Sender.
    pub sender_id: String,
    /// Recipient.
    pub recipient_id: String,
    /// Points sent.
    pub amount: i64,
    /// Optional note.
    pub message: Option<String>,
    /// Tipped content item.
    pub content_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&TipRecord> for TipResponse {
    fn from(tip: &TipRecord) -> Self {
        Self {
            id: tip.id.to_string(),
            sender_id: tip.sender_id.to_string(),
            recipient_id: tip.recipient_id.to_string(),
            amount: tip.amount,
            message: tip.message.clone(),
            content_id: tip.content_id.map(|c| c.to_string()),
            created_at: tip.created_at.to_rfc3339(),
        }
    }
}

/// Result of a sent tip.
#[derive(Debug, Serialize)]
pub struct SendTipResponse {
    /// The tip.
    pub tip: TipResponse,
    /// Sender's points after the tip.
    pub sender_balance: i64,
}

/// Send a tip.
pub async fn send_tip(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<TipRequest>,
) -> Result<(StatusCode, Json<SendTipResponse>), ApiError> {
    let receipt = state.tips.send_tip(auth.user_id, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(SendTipResponse {
            tip: TipResponse::from(&receipt.tip),
            sender_balance: receipt.sender_balance.balance,
        }),
    ))
}

/// Paginated tips.
#[derive(Debug, Serialize)]
pub struct TipListResponse {
    /// Tips, newest first.
    pub tips: Vec<TipResponse>,
    /// Total matching tips.
    pub total: usize,
    /// Page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
}

impl TipListResponse {
    fn new(page: &Page<TipRecord>, paging: Paging) -> Self {
        let paging = paging.normalized();
        Self {
            tips: page.items.iter().map(TipResponse::from).collect(),
            total: page.total,
            page: paging.page,
            limit: paging.limit,
        }
    }
}

/// Tips sent by the authenticated user.
pub async fn list_sent(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> Result<Json<TipListResponse>, ApiError> {
    let page = state.tips.sent_tips(&auth.user_id, paging)?;
    Ok(Json(TipListResponse::new(&page, paging)))
}

/// Tips received by the authenticated user.
pub async fn list_received(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> Result<Json<TipListResponse>, ApiError> {
    let page = state.tips.received_tips(&auth.user_id, paging)?;
    Ok(Json(TipListResponse::new(&page, paging)))
}

/// A tip the authenticated user sent or received.
pub async fn get_tip(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(tip_id): Path<String>,
) -> Result<Json<TipResponse>, ApiError> {
    let tip_id: TipId = tip_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid tip ID".into()))?;

    let tip = state.tips.get_tip(&tip_id, &auth.user_id)?;
    Ok(Json(TipResponse::from(&tip)))
}
