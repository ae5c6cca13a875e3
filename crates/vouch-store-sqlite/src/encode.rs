//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order is chronological. Document references are stored as
//! a compact JSON array.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use vouch_core::request::{
  Action, BlockRecord, DecisionEvent, PayloadRef, Status, UserId,
  VerificationRequest,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: Status) -> &'static str {
  match s {
    Status::Pending => "pending",
    Status::Approved => "approved",
    Status::Denied => "denied",
  }
}

pub fn decode_status(s: &str) -> Result<Status> {
  Status::from_str(s).map_err(|_| Error::Decode(format!("unknown status: {s:?}")))
}

pub fn decode_action(s: &str) -> Result<Action> {
  Action::from_str(s).map_err(|_| Error::Decode(format!("unknown action: {s:?}")))
}

// ─── Documents ───────────────────────────────────────────────────────────────

pub fn encode_documents(docs: &[PayloadRef]) -> Result<String> {
  Ok(serde_json::to_string(docs)?)
}

pub fn decode_documents(s: &str) -> Result<Vec<PayloadRef>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected by [`SELECT_REQUEST`], in order.
pub const SELECT_REQUEST: &str = "
  SELECT v.requester_id, v.display_name, v.birthdate, v.status, v.attempts,
         v.submitted_at, v.processed_at, v.processed_by, v.documents,
         b.reason, b.blocked_by, b.blocked_at
  FROM verifications v
  LEFT JOIN blocked_users b ON b.requester_id = v.requester_id";

/// Raw strings read directly from a `verifications` row joined with
/// `blocked_users`.
#[derive(Debug)]
pub struct RawRequest {
  pub requester_id: String,
  pub display_name: String,
  pub birthdate:    String,
  pub status:       String,
  pub attempts:     u32,
  pub submitted_at: String,
  pub processed_at: Option<String>,
  pub processed_by: Option<String>,
  pub documents:    String,
  // blocked_users join
  pub block_reason: Option<String>,
  pub blocked_by:   Option<String>,
  pub blocked_at:   Option<String>,
}

impl RawRequest {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      requester_id: row.get(0)?,
      display_name: row.get(1)?,
      birthdate:    row.get(2)?,
      status:       row.get(3)?,
      attempts:     row.get(4)?,
      submitted_at: row.get(5)?,
      processed_at: row.get(6)?,
      processed_by: row.get(7)?,
      documents:    row.get(8)?,
      block_reason: row.get(9)?,
      blocked_by:   row.get(10)?,
      blocked_at:   row.get(11)?,
    })
  }

  pub fn into_request(self) -> Result<VerificationRequest> {
    let requester_id = UserId::new(self.requester_id);

    let block = match (self.blocked_by, self.blocked_at) {
      (Some(by), Some(at)) => Some(BlockRecord {
        requester_id: requester_id.clone(),
        reason:       self.block_reason,
        blocked_by:   UserId::new(by),
        blocked_at:   decode_dt(&at)?,
      }),
      _ => None,
    };

    Ok(VerificationRequest {
      requester_id,
      display_name: self.display_name,
      birthdate: self.birthdate,
      status: decode_status(&self.status)?,
      attempts: self.attempts,
      submitted_at: decode_dt(&self.submitted_at)?,
      processed_at: self.processed_at.as_deref().map(decode_dt).transpose()?,
      processed_by: self.processed_by.map(UserId::new),
      documents: decode_documents(&self.documents)?,
      block,
    })
  }
}

/// Raw strings read directly from a `decisions` row.
pub struct RawDecision {
  pub event_id:     String,
  pub requester_id: String,
  pub action:       String,
  pub moderator:    String,
  pub reason:       Option<String>,
  pub recorded_at:  String,
}

impl RawDecision {
  pub fn into_event(self) -> Result<DecisionEvent> {
    Ok(DecisionEvent {
      event_id:     Uuid::parse_str(&self.event_id)
        .map_err(|e| Error::Decode(e.to_string()))?,
      requester_id: UserId::new(self.requester_id),
      action:       decode_action(&self.action)?,
      moderator:    UserId::new(self.moderator),
      reason:       self.reason,
      recorded_at:  decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1500);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn status_encoding_matches_schema_check() {
    for status in [Status::Pending, Status::Approved, Status::Denied] {
      assert_eq!(decode_status(encode_status(status)).unwrap(), status);
    }
    assert!(decode_status("blocked").is_err());
  }
}
