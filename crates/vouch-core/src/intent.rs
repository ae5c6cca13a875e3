//! Side-effect intents.
//!
//! The core never talks to the chat platform. It decides what should happen
//! and hands these values to the platform adapter, which executes them.

use serde::{Deserialize, Serialize};

use crate::request::{PayloadRef, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
  /// Announce a new or repeated submission in the review channel.
  NotifyModerators {
    /// Review channel, if one is configured.
    channel:            Option<String>,
    requester_id:       UserId,
    display_name:       String,
    birthdate:          String,
    attempts:           u32,
    /// Submissions left before the limit; `None` when unlimited.
    remaining_attempts: Option<u32>,
    documents:          Vec<PayloadRef>,
    /// Control ids for the approve/deny/block buttons.
    controls:           Vec<String>,
  },
  /// Mark a requester as awaiting review.
  AssignUnverifiedRole { requester_id: UserId },
  /// Direct-message the requester their personal verification link.
  SendVerificationLink { requester_id: UserId, link: String },
  /// Grant the verified role and drop the unverified one.
  GrantRole { requester_id: UserId },
  /// Take the verified role away again.
  RevokeRole { requester_id: UserId },
  NotifyApproved { requester_id: UserId },
  NotifyDenied { requester_id: UserId, reason: String },
  NotifyBlocked { requester_id: UserId, reason: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intents_are_tagged_for_the_adapter() {
    let intent = Intent::NotifyDenied {
      requester_id: "42".into(),
      reason:       "blurry".into(),
    };
    let json = serde_json::to_value(&intent).unwrap();
    assert_eq!(json["intent"], "notify_denied");
    assert_eq!(json["requester_id"], "42");
  }
}
