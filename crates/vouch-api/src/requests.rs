//! Handlers for the moderator queue.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/requests` | Optional `?status=pending\|approved\|denied` |
//! | `GET`  | `/requests/{id}` | 404 if never submitted |
//! | `GET`  | `/requests/{id}/history` | Applied decisions, oldest first |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use vouch_core::{
  UserId,
  request::{DecisionEvent, Status, VerificationRequest},
  store::VerificationStore,
};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<Status>,
}

/// `GET /requests[?status=<status>]`
pub async fn list<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<VerificationRequest>>, ApiError> {
  Ok(Json(state.engine().queue(params.status).await?))
}

/// `GET /requests/{id}`
pub async fn get_one<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
) -> Result<Json<VerificationRequest>, ApiError> {
  Ok(Json(state.engine().get(&UserId::new(id)).await?))
}

/// `GET /requests/{id}/history`
pub async fn history<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Vec<DecisionEvent>>, ApiError> {
  Ok(Json(state.engine().history(&UserId::new(id)).await?))
}
