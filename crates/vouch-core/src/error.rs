//! Error taxonomy shared by every layer of vouch.
//!
//! Adapters never match on message text; they use [`Error::kind`] to pick a
//! user-facing rendering.

use thiserror::Error;

use crate::request::{Action, ReviewState, UserId};

#[derive(Debug, Error)]
pub enum Error {
  /// A submission (or verification-link request) from a blocked requester.
  #[error("requester {0} is blocked from verification")]
  Blocked(UserId),

  #[error("no verification request for {0}")]
  NotFound(UserId),

  #[error("{0} does not hold a moderator role")]
  Unauthorized(UserId),

  #[error("cannot {action} a request that is {from}")]
  InvalidTransition {
    requester_id: UserId,
    from:         ReviewState,
    action:       Action,
  },

  #[error("requester {requester_id} has used {attempts} of {limit} attempts")]
  TooManyAttempts {
    requester_id: UserId,
    attempts:     u32,
    limit:        u32,
  },

  #[error("invalid command: {0}")]
  InvalidCommand(String),

  #[error("invalid verification link: {0}")]
  InvalidToken(String),

  #[error("invalid submission: {0}")]
  InvalidSubmission(String),

  /// The durable store could not be reached or locked. Nothing was written.
  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Stable snake_case code for adapters and API responses.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Blocked(_) => "blocked",
      Self::NotFound(_) => "not_found",
      Self::Unauthorized(_) => "unauthorized",
      Self::InvalidTransition { .. } => "invalid_transition",
      Self::TooManyAttempts { .. } => "too_many_attempts",
      Self::InvalidCommand(_) => "invalid_command",
      Self::InvalidToken(_) => "invalid_token",
      Self::InvalidSubmission(_) => "invalid_submission",
      Self::StoreUnavailable(_) => "store_unavailable",
    }
  }

  /// The requester this error concerns, when there is one.
  pub fn requester_id(&self) -> Option<&UserId> {
    match self {
      Self::Blocked(id) | Self::NotFound(id) => Some(id),
      Self::InvalidTransition { requester_id, .. }
      | Self::TooManyAttempts { requester_id, .. } => Some(requester_id),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
