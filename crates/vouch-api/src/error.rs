//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Bodies are `{"error": <kind>, "message": <text>}`, plus `requester_id`
//! when the error concerns one. Adapters switch on `error`, never on the
//! message.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] vouch_core::Error),

  #[error("upload too large: {0}")]
  TooLarge(String),

  #[error("upload storage failed: {0}")]
  Upload(#[source] std::io::Error),
}

impl ApiError {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Core(e) => e.kind(),
      Self::TooLarge(_) => "payload_too_large",
      Self::Upload(_) => "upload_failed",
    }
  }

  fn requester_id(&self) -> Option<&vouch_core::UserId> {
    match self {
      Self::Core(e) => e.requester_id(),
      _ => None,
    }
  }

  pub fn status(&self) -> StatusCode {
    use vouch_core::Error as E;
    match self {
      Self::Core(e) => match e {
        E::NotFound(_) => StatusCode::NOT_FOUND,
        E::Blocked(_) | E::Unauthorized(_) => StatusCode::FORBIDDEN,
        E::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        E::InvalidCommand(_) | E::InvalidSubmission(_) => StatusCode::BAD_REQUEST,
        E::InvalidTransition { .. } => StatusCode::CONFLICT,
        E::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
        E::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      },
      Self::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      Self::Upload(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, kind = self.kind(), "request failed");
    }

    let mut body = json!({ "error": self.kind(), "message": self.to_string() });
    if let Some(id) = self.requester_id() {
      body["requester_id"] = json!(id);
    }
    (status, Json(body)).into_response()
  }
}
