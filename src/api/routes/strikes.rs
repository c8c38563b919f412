//! Strike Routes
//!
//! - GET /strikes?limit=N - Recent strikes, most-recent-first

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::StrikesQuery;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::capture::StrikeEvent;

/// GET /strikes
///
/// Returns up to `limit` strikes from history; all of them when omitted.
pub async fn list_strikes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StrikesQuery>,
) -> ApiResult<Json<Vec<Arc<StrikeEvent>>>> {
    let limit = match query.limit {
        Some(0) => {
            return Err(ApiError::Validation(
                "limit must be greater than zero".to_string(),
            ))
        }
        Some(n) => n,
        None => usize::MAX,
    };

    Ok(Json(state.hub.snapshot(limit).await))
}
