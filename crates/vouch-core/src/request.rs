//! The verification request (one row per requester) and its satellites.
//!
//! A requester's persisted [`Status`] is one of pending, approved or denied.
//! "Blocked" is not a fourth persisted status: it is a denied request that
//! also carries a [`BlockRecord`]. [`ReviewState`] folds the two together for
//! display and for transition checks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Identity ────────────────────────────────────────────────────────────────

/// An opaque, stable platform user identifier (requester or moderator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for UserId {
  fn from(s: String) -> Self { Self(s) }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// The persisted review status. Exactly one value at any time.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Pending,
  Approved,
  Denied,
}

/// Status as observed by moderators: a denied request with a block record
/// is reported as `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewState {
  Pending,
  Approved,
  Denied,
  Blocked,
}

/// A moderation decision.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
  Approve,
  Deny,
  Block,
  Unblock,
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// Which of the two uploaded images a reference points at.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentKind {
  /// The annotated photo of the identity document.
  IdDocument,
  Selfie,
}

/// An uploaded image stored on disk; no binary data lives in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRef {
  pub kind:         DocumentKind,
  /// Path relative to the configured upload directory.
  pub path:         String,
  /// SHA-256 hex digest of the file contents.
  pub content_hash: String,
  pub media_type:   String,
}

// ─── Block record ────────────────────────────────────────────────────────────

/// Presence bars the requester from submitting until a moderator unblocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
  pub requester_id: UserId,
  pub reason:       Option<String>,
  pub blocked_by:   UserId,
  pub blocked_at:   DateTime<Utc>,
}

// ─── Verification request ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
  pub requester_id: UserId,
  /// Last-known human-readable name; overwritten on resubmission.
  pub display_name: String,
  pub birthdate:    String,
  pub status:       Status,
  /// Never decreases; at least 1 once the row exists.
  pub attempts:     u32,
  pub submitted_at: DateTime<Utc>,
  /// Set exactly when `status` is approved or denied.
  pub processed_at: Option<DateTime<Utc>>,
  pub processed_by: Option<UserId>,
  pub documents:    Vec<PayloadRef>,
  pub block:        Option<BlockRecord>,
}

impl VerificationRequest {
  pub fn is_blocked(&self) -> bool { self.block.is_some() }

  pub fn review_state(&self) -> ReviewState {
    match (self.status, self.is_blocked()) {
      (_, true) => ReviewState::Blocked,
      (Status::Pending, false) => ReviewState::Pending,
      (Status::Approved, false) => ReviewState::Approved,
      (Status::Denied, false) => ReviewState::Denied,
    }
  }

  pub fn document(&self, kind: DocumentKind) -> Option<&PayloadRef> {
    self.documents.iter().find(|d| d.kind == kind)
  }
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::VerificationStore::upsert_submission`].
/// Timestamps and the attempt counter are always set by the store.
#[derive(Debug, Clone)]
pub struct NewSubmission {
  pub requester_id: UserId,
  pub display_name: String,
  pub birthdate:    String,
  pub documents:    Vec<PayloadRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionOutcome {
  /// First submission from this requester.
  Created,
  /// Overwrote a pending or denied request and re-queued it.
  Resubmitted,
  /// The requester is already approved; nothing was written.
  AlreadyApproved,
}

/// Result of an accepted (non-blocked) submission.
#[derive(Debug, Clone)]
pub struct Submission {
  pub outcome:            SubmissionOutcome,
  pub request:            VerificationRequest,
  /// Document references overwritten by this submission.
  pub replaced_documents: Vec<PayloadRef>,
}

// ─── Decisions ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::VerificationStore::set_status`].
#[derive(Debug, Clone)]
pub struct Transition {
  pub requester_id:      UserId,
  pub from:              Status,
  pub to:                Status,
  pub moderator:         UserId,
  pub reason:            Option<String>,
  /// Drop the document references in the same write.
  pub discard_documents: bool,
}

/// Input to [`crate::store::VerificationStore::block`].
#[derive(Debug, Clone)]
pub struct BlockRequest {
  pub requester_id:      UserId,
  pub moderator:         UserId,
  pub reason:            Option<String>,
  /// Whether an approved request may be forced to denied + blocked.
  pub override_approval: bool,
  /// Drop the document references in the same write.
  pub discard_documents: bool,
}

/// A request as a decision left it.
#[derive(Debug, Clone)]
pub struct Decided {
  pub request:             VerificationRequest,
  /// References dropped by the decision; the caller deletes the files.
  pub discarded_documents: Vec<PayloadRef>,
}

impl From<VerificationRequest> for Decided {
  fn from(request: VerificationRequest) -> Self {
    Self { request, discarded_documents: Vec::new() }
  }
}

/// Result of a conditional write: either this call changed the row, or the
/// row was already past the transition and is returned as-is.
#[derive(Debug, Clone)]
pub enum Change<T> {
  Applied(T),
  Unchanged(T),
}

impl<T> Change<T> {
  pub fn is_applied(&self) -> bool { matches!(self, Self::Applied(_)) }

  pub fn into_inner(self) -> T {
    match self {
      Self::Applied(t) | Self::Unchanged(t) => t,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Change<U> {
    match self {
      Self::Applied(t) => Change::Applied(f(t)),
      Self::Unchanged(t) => Change::Unchanged(f(t)),
    }
  }
}

/// An applied moderation decision, kept in an append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
  pub event_id:     Uuid,
  pub requester_id: UserId,
  pub action:       Action,
  pub moderator:    UserId,
  pub reason:       Option<String>,
  pub recorded_at:  DateTime<Utc>,
}
