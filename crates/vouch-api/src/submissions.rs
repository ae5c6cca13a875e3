//! `POST /submissions`: the web form behind the verification link.
//!
//! ```json
//! { "token": "<from the link>", "display_name": "alice",
//!   "birthdate": "2000-01-01",
//!   "id_document": "data:image/jpeg;base64,...", "selfie": "..." }
//! ```
//!
//! Files are written before the store is touched and removed again if the
//! submission is rejected, so a failed request leaves nothing on disk.

use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use serde::Deserialize;
use vouch_core::{
  UserId,
  request::{DocumentKind, PayloadRef, SubmissionOutcome},
  store::VerificationStore,
};
use vouch_moderation::{SubmissionForm, Submitted};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SubmissionBody {
  pub token:        String,
  #[serde(default)]
  pub display_name: String,
  pub birthdate:    String,
  pub id_document:  String,
  pub selfie:       String,
}

pub async fn create<S: VerificationStore>(
  State(state): State<ApiState<S>>,
  Json(body): Json<SubmissionBody>,
) -> Result<(StatusCode, Json<Submitted>), ApiError> {
  let requester = state.links.verify(&body.token, Utc::now())?;
  let id = requester.id();

  let mut documents: Vec<PayloadRef> = Vec::with_capacity(2);
  for (kind, encoded) in [
    (DocumentKind::IdDocument, &body.id_document),
    (DocumentKind::Selfie, &body.selfie),
  ] {
    match state.uploads.save(id, kind, encoded).await {
      Ok(doc) => documents.push(doc),
      Err(e) => {
        discard(&state, id, &documents).await;
        return Err(e);
      }
    }
  }

  let form = SubmissionForm {
    display_name: body.display_name,
    birthdate:    body.birthdate,
    documents:    documents.clone(),
  };
  let submitted = match state.engine().submit(&requester, form).await {
    Ok(submitted) => submitted,
    Err(e) => {
      tracing::info!(requester_id = %id, kind = e.kind(), "submission rejected");
      discard(&state, id, &documents).await;
      return Err(e.into());
    }
  };

  state
    .uploads
    .remove(&submitted.orphaned_documents, &submitted.request.documents)
    .await;

  let status = match submitted.outcome {
    SubmissionOutcome::AlreadyApproved => StatusCode::OK,
    SubmissionOutcome::Created | SubmissionOutcome::Resubmitted => StatusCode::CREATED,
  };
  Ok((status, Json(submitted)))
}

/// Remove freshly written files, sparing any the stored request still
/// points at (an identical image overwrites in place).
async fn discard<S: VerificationStore>(state: &ApiState<S>, id: &UserId, written: &[PayloadRef]) {
  let keep = match state.engine().get(id).await {
    Ok(request) => request.documents,
    Err(vouch_core::Error::NotFound(_)) => Vec::new(),
    // Cannot tell which files are still referenced; keep them all.
    Err(_) => return,
  };
  state.uploads.remove(written, &keep).await;
}
