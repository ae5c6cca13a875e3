//! Attempt tracking policy.
//!
//! The store only counts attempts; whether a count is too high is decided
//! here so the limit can change without touching persisted data.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, request::UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptPolicy {
  /// Submissions allowed per requester. `None` means unlimited.
  pub max_attempts: Option<u32>,
}

impl AttemptPolicy {
  pub fn unlimited() -> Self { Self::default() }

  pub fn limited(max_attempts: u32) -> Self {
    Self { max_attempts: Some(max_attempts) }
  }

  /// Reject a requester who has already used every allowed attempt.
  pub fn check(&self, requester_id: &UserId, attempts: u32) -> Result<()> {
    match self.max_attempts {
      Some(limit) if attempts >= limit => Err(Error::TooManyAttempts {
        requester_id: requester_id.clone(),
        attempts,
        limit,
      }),
      _ => Ok(()),
    }
  }

  /// Attempts left before the limit, if there is one.
  pub fn remaining(&self, attempts: u32) -> Option<u32> {
    self.max_attempts.map(|limit| limit.saturating_sub(attempts))
  }
}
