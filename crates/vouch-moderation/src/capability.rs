//! Moderator capability.
//!
//! Engine decisions take a [`Moderator`], and the only way to obtain one is
//! [`Authorizer::authorize`]. A caller without a moderator role therefore
//! cannot reach the engine at all.

use std::collections::HashSet;

use vouch_core::{Error, Result, UserId, event::Caller};

/// Proof that a caller held a moderator role when the event arrived.
#[derive(Debug, Clone)]
pub struct Moderator {
  id: UserId,
}

impl Moderator {
  pub fn id(&self) -> &UserId { &self.id }
}

/// Checks callers against the configured moderator roles.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
  roles: HashSet<String>,
}

impl Authorizer {
  pub fn new(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self { roles: roles.into_iter().map(Into::into).collect() }
  }

  pub fn authorize(&self, caller: &Caller) -> Result<Moderator> {
    if !caller.bot && caller.roles.iter().any(|r| self.roles.contains(r)) {
      Ok(Moderator { id: caller.user_id.clone() })
    } else {
      tracing::warn!(caller = %caller.user_id, "moderation attempt without moderator role");
      Err(Error::Unauthorized(caller.user_id.clone()))
    }
  }
}
