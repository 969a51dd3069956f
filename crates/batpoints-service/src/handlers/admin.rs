//! Operator endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::AdminAuth;
use crate::engine::SweepReport;
use crate::error::ApiError;
use crate::state::AppState;

/// Run a recovery sweep over conversions still in `processing`.
pub async fn reconcile_conversions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<SweepReport>, ApiError> {
    let report = state.recovery.sweep().await?;
    Ok(Json(report))
}
