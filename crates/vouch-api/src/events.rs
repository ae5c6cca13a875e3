//! Inbound platform events.
//!
//! The gateway adapter forwards every message and control click here and
//! executes the returned intents. Documents discarded by a decision are
//! deleted before the response is sent.

use axum::{Json, extract::State};
use vouch_core::{
  event::{InteractionEvent, MessageEvent},
  store::VerificationStore,
};
use vouch_moderation::{Dispatched, Reply};

use crate::{ApiState, error::ApiError};

/// `POST /events/message`
pub async fn message<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Json(event): Json<MessageEvent>,
) -> Result<Json<Dispatched>, ApiError> {
  let out = state.dispatcher.on_message(event).await?;
  remove_discarded(&state, &out).await;
  Ok(Json(out))
}

/// `POST /events/interaction`
pub async fn interaction<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Json(event): Json<InteractionEvent>,
) -> Result<Json<Dispatched>, ApiError> {
  let out = state.dispatcher.on_interaction(event).await?;
  remove_discarded(&state, &out).await;
  Ok(Json(out))
}

/// Delete the files a decision dropped. A resubmission that landed after the
/// decision may have written an identical image to the same path, so files
/// the stored request points at now are spared.
pub(crate) async fn remove_discarded<S: VerificationStore>(state: &ApiState<S>, out: &Dispatched) {
  if out.discarded_documents.is_empty() {
    return;
  }
  let Reply::Decided { requester_id, .. } = &out.reply else {
    return;
  };
  let keep = match state.engine().get(requester_id).await {
    Ok(request) => request.documents,
    Err(e) => {
      tracing::warn!(
        requester_id = %requester_id,
        error = %e,
        "kept discarded uploads; could not load current request"
      );
      return;
    }
  };
  state.uploads.remove(&out.discarded_documents, &keep).await;
}
