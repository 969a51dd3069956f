//! Account handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use batpoints_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Points owned.
    pub balance_points: i64,
    /// Points reserved by in-flight conversions.
    pub held_points: i64,
    /// Points that may be spent.
    pub available_points: i64,
    /// Lifetime tips received.
    pub lifetime_tipped_in: i64,
    /// Lifetime tips sent.
    pub lifetime_tipped_out: i64,
    /// Lifetime points converted.
    pub lifetime_converted: i64,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance_points: account.balance_points,
            held_points: account.held_points,
            available_points: account.available_points(),
            lifetime_tipped_in: account.lifetime_tipped_in,
            lifetime_tipped_out: account.lifetime_tipped_out,
            lifetime_converted: account.lifetime_converted,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create an account for the authenticated user, crediting the signup bonus.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = state.store.create_account(
        &Account::new(auth.user_id),
        state.config.signup_bonus_points,
    )?;

    tracing::info!(
        user_id = %auth.user_id,
        bonus = state.config.signup_bonus_points,
        "Account created"
    );

    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Get the authenticated user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}
