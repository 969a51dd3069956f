//! Content registration and tip stats.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use batpoints_core::{ContentId, ContentTipStats, UserId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Content registration request, sent by the content service.
#[derive(Debug, Deserialize)]
pub struct RegisterContentRequest {
    /// Content item ID.
    pub content_id: ContentId,
    /// Author of the item.
    pub author_id: UserId,
}

/// Tip counters for one content item.
#[derive(Debug, Serialize)]
pub struct ContentStatsResponse {
    /// Content item ID.
    pub content_id: String,
    /// Author.
    pub author_id: String,
    /// Tips received.
    pub tip_count: u64,
    /// Points received.
    pub tip_total: i64,
}

impl From<&ContentTipStats> for ContentStatsResponse {
    fn from(stats: &ContentTipStats) -> Self {
        Self {
            content_id: stats.content_id.to_string(),
            author_id: stats.author_id.to_string(),
            tip_count: stats.tip_count,
            tip_total: stats.tip_total,
        }
    }
}

/// Register a content item so it can receive tips.
pub async fn register_content(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(req): Json<RegisterContentRequest>,
) -> Result<(StatusCode, Json<ContentStatsResponse>), ApiError> {
    let stats = ContentTipStats::new(req.content_id, req.author_id);
    state.store.register_content(&stats)?;

    tracing::debug!(
        content_id = %req.content_id,
        service = %service.service_name,
        "Content registered"
    );

    Ok((StatusCode::CREATED, Json(ContentStatsResponse::from(&stats))))
}

/// Tip counters for a content item.
pub async fn get_content_tips(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<String>,
) -> Result<Json<ContentStatsResponse>, ApiError> {
    let content_id: ContentId = content_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid content ID".into()))?;

    let stats = state
        .store
        .get_content(&content_id)?
        .ok_or_else(|| ApiError::NotFound(format!("content not found: {content_id}")))?;

    Ok(Json(ContentStatsResponse::from(&stats)))
}
