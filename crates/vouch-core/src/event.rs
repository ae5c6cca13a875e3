//! Inbound events handed to the dispatcher by the chat-platform adapter.

use serde::{Deserialize, Serialize};

use crate::request::UserId;

/// Who triggered an event, as reported by the platform adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
  pub user_id: UserId,
  /// Role identifiers the caller holds in the community.
  #[serde(default)]
  pub roles:   Vec<String>,
  /// Automated accounts never drive the workflow.
  #[serde(default)]
  pub bot:     bool,
}

/// A text message posted in a channel the adapter listens to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
  pub caller:     Caller,
  pub channel_id: Option<String>,
  pub content:    String,
}

/// A click on an interactive control attached to a review message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
  pub caller:    Caller,
  /// Composite token `<namespace>_<action>_<requester_id>`.
  pub custom_id: String,
}
