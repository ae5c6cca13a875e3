//! Plain-text rendering of API results.

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use vouch_core::request::{DecisionEvent, VerificationRequest};
use vouch_moderation::Reply;

use crate::client::Outcome;

fn ts(t: &DateTime<Utc>) -> String { t.to_rfc3339_opts(SecondsFormat::Secs, true) }

pub fn queue_line(req: &VerificationRequest) -> String {
  format!(
    "{:<20} {:<8} attempts={:<3} {} {}",
    req.requester_id.as_str(),
    req.review_state().to_string(),
    req.attempts,
    ts(&req.submitted_at),
    req.display_name,
  )
}

pub fn request(req: &VerificationRequest) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "requester:  {}", req.requester_id);
  let _ = writeln!(out, "name:       {}", req.display_name);
  let _ = writeln!(out, "birthdate:  {}", req.birthdate);
  let _ = writeln!(out, "state:      {}", req.review_state());
  let _ = writeln!(out, "attempts:   {}", req.attempts);
  let _ = writeln!(out, "submitted:  {}", ts(&req.submitted_at));
  if let (Some(at), Some(by)) = (&req.processed_at, &req.processed_by) {
    let _ = writeln!(out, "processed:  {} by {by}", ts(at));
  }
  if let Some(block) = &req.block {
    let _ = writeln!(
      out,
      "blocked:    {} by {}: {}",
      ts(&block.blocked_at),
      block.blocked_by,
      block.reason.as_deref().unwrap_or("-"),
    );
  }
  for doc in &req.documents {
    let _ = writeln!(out, "document:   {} {} ({})", doc.kind, doc.path, doc.media_type);
  }
  out
}

pub fn history_line(event: &DecisionEvent) -> String {
  let mut line = format!(
    "{} {:<8} by {}",
    ts(&event.recorded_at),
    event.action.to_string(),
    event.moderator
  );
  if let Some(reason) = &event.reason {
    let _ = write!(line, ": {reason}");
  }
  line
}

pub fn outcome(outcome: &Outcome) -> String {
  match &outcome.reply {
    Reply::Decided { action, requester_id, applied: true, state } => {
      format!("{action}: {requester_id} is now {state} ({} follow-up actions)", outcome.intents.len())
    }
    Reply::Decided { requester_id, applied: false, state, .. } => {
      format!("{requester_id} was already {state}; nothing changed")
    }
    Reply::LinkSent { requester_id, .. } => format!("verification link sent to {requester_id}"),
    Reply::ReviewChannelSet { channel_id } => format!("review channel set to {channel_id}"),
    Reply::Ignored => "ignored by the server (check the command prefix)".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use vouch_core::{
    intent::Intent,
    request::{Action, ReviewState, Status},
  };

  use super::*;

  fn sample() -> VerificationRequest {
    VerificationRequest {
      requester_id: "42".into(),
      display_name: "alice".into(),
      birthdate:    "2000-01-01".into(),
      status:       Status::Pending,
      attempts:     2,
      submitted_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
      processed_at: None,
      processed_by: None,
      documents:    Vec::new(),
      block:        None,
    }
  }

  #[test]
  fn queue_line_shows_state_and_attempts() {
    let line = queue_line(&sample());
    assert!(line.starts_with("42 "), "{line}");
    assert!(line.contains("pending"));
    assert!(line.contains("attempts=2"));
    assert!(line.contains("2024-05-01T12:00:00Z"));
    assert!(line.ends_with("alice"));
  }

  #[test]
  fn request_omits_unset_sections() {
    let text = request(&sample());
    assert!(text.contains("state:      pending"));
    assert!(!text.contains("processed:"));
    assert!(!text.contains("blocked:"));
  }

  #[test]
  fn outcome_distinguishes_no_op() {
    let applied = Outcome {
      reply:   Reply::Decided {
        action:       Action::Approve,
        requester_id: "42".into(),
        applied:      true,
        state:        ReviewState::Approved,
      },
      intents: vec![Intent::GrantRole { requester_id: "42".into() }],
    };
    assert_eq!(outcome(&applied), "approve: 42 is now approved (1 follow-up actions)");

    let repeat = Outcome {
      reply:   Reply::Decided {
        action:       Action::Approve,
        requester_id: "42".into(),
        applied:      false,
        state:        ReviewState::Approved,
      },
      intents: Vec::new(),
    };
    assert_eq!(outcome(&repeat), "42 was already approved; nothing changed");
  }
}
