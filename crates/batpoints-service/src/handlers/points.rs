//! Balance and journal handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use batpoints_core::{PointsTransaction, UserId};

use crate::auth::{AdminAuth, AuthUser};
use crate::engine::Paging;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Points owned.
    pub balance: i64,
    /// Points reserved by in-flight conversions.
    pub held: i64,
    /// Points that may be spent.
    pub available: i64,
}

/// Get the authenticated user's balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.store.get_balance(&auth.user_id)?;

    Ok(Json(BalanceResponse {
        balance: balance.balance,
        held: balance.held,
        available: balance.available,
    }))
}

/// Journal entry response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Entry ID.
    pub id: String,
    /// Signed amount.
    pub amount: i64,
    /// Entry type.
    pub transaction_type: &'static str,
    /// Balance after this entry.
    pub balance_after: i64,
    /// Description.
    pub description: String,
    /// Counterparty, for tips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&PointsTransaction> for TransactionResponse {
    fn from(tx: &PointsTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type.as_str(),
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            related_user: tx.related_user.map(|u| u.to_string()),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Paginated journal.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Entries, newest first.
    pub transactions: Vec<TransactionResponse>,
    /// Total entries for the user.
    pub total: usize,
    /// Page number.
    pub page: usize,
    /// Page size.
    pub limit: usize,
}

/// List the authenticated user's journal.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(paging): Query<Paging>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let paging = paging.normalized();
    let page =
        state
            .store
            .list_transactions_by_user(&auth.user_id, paging.limit, paging.offset())?;

    Ok(Json(ListTransactionsResponse {
        transactions: page.items.iter().map(TransactionResponse::from).collect(),
        total: page.total,
        page: paging.page,
        limit: paging.limit,
    }))
}

/// Admin adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Account to adjust.
    pub user_id: UserId,
    /// Signed points delta.
    pub delta: i64,
    /// Reason recorded in the journal.
    pub description: String,
}

/// Apply an admin adjustment to one account.
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    if req.description.trim().is_empty() {
        return Err(ApiError::BadRequest("description is required".into()));
    }

    let tx = state
        .store
        .apply_delta(&req.user_id, req.delta, req.description.trim())?;

    tracing::info!(
        user_id = %req.user_id,
        delta = req.delta,
        balance_after = tx.balance_after,
        "Admin adjustment applied"
    );

    Ok(Json(TransactionResponse::from(&tx)))
}

/// Admin transfer request.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Account debited.
    pub from_user_id: UserId,
    /// Account credited.
    pub to_user_id: UserId,
    /// Points moved.
    pub amount: i64,
    /// Reason recorded in both journals.
    pub description: String,
}

/// Both sides of an admin transfer.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    /// Debit entry.
    pub debit: TransactionResponse,
    /// Credit entry.
    pub credit: TransactionResponse,
}

/// Move points between two accounts atomically.
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let (debit, credit) = state.store.apply_paired_delta(
        &req.from_user_id,
        &req.to_user_id,
        req.amount,
        req.description.trim(),
    )?;

    tracing::info!(
        from_user_id = %req.from_user_id,
        to_user_id = %req.to_user_id,
        amount = req.amount,
        "Admin transfer applied"
    );

    Ok(Json(TransferResponse {
        debit: TransactionResponse::from(&debit),
        credit: TransactionResponse::from(&credit),
    }))
}
