//! The `VerificationStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `vouch-store-sqlite`).
//! Higher layers (`vouch-moderation`, `vouch-api`) depend on this
//! abstraction, not on any concrete backend.
//!
//! Every method is one atomic unit with respect to every other method on the
//! same requester. Conditional writes ([`VerificationStore::set_status`],
//! [`VerificationStore::block`], [`VerificationStore::unblock`]) check the
//! current state inside that unit, so two racing decisions resolve to one
//! [`Change::Applied`] and one [`Change::Unchanged`].

use std::future::Future;

use crate::request::{
  BlockRequest, Change, Decided, DecisionEvent, NewSubmission, Status,
  Submission, Transition, UserId, VerificationRequest,
};

/// Abstraction over a vouch store backend.
///
/// Domain rejections (`Blocked`, `NotFound`, `InvalidTransition`) travel in
/// the backend error and surface as the matching [`crate::Error`] variant
/// once converted; every other backend failure becomes
/// [`crate::Error::StoreUnavailable`].
pub trait VerificationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Submissions ───────────────────────────────────────────────────────

  /// Insert a new pending request, or overwrite the requester's existing one
  /// and increment `attempts`.
  ///
  /// A denied request returns to pending with its processed fields cleared.
  /// An approved request is left untouched
  /// ([`crate::request::SubmissionOutcome::AlreadyApproved`]). Fails with
  /// `Blocked` while a block record exists.
  fn upsert_submission(
    &self,
    input: NewSubmission,
  ) -> impl Future<Output = Result<Submission, Self::Error>> + Send + '_;

  /// Increment `attempts` without touching anything else. Returns the new
  /// count, or `None` if the requester has never submitted.
  fn record_attempt(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<u32>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve a request, with its block record if any. `None` if unknown.
  fn get(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Option<VerificationRequest>, Self::Error>> + Send + '_;

  /// All requests, optionally filtered by persisted status, oldest
  /// submission first.
  fn list(
    &self,
    status: Option<Status>,
  ) -> impl Future<Output = Result<Vec<VerificationRequest>, Self::Error>> + Send + '_;

  fn is_blocked(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Applied decisions for a requester, oldest first.
  fn history(
    &self,
    id: UserId,
  ) -> impl Future<Output = Result<Vec<DecisionEvent>, Self::Error>> + Send + '_;

  // ── Decisions ─────────────────────────────────────────────────────────

  /// Move the request from `input.from` to `input.to`, stamping
  /// `processed_at`/`processed_by` and logging the decision with its
  /// optional `reason`.
  ///
  /// This is the only way `status` changes after creation. If the current
  /// status is not `from`, nothing is written and the current request is
  /// returned as [`Change::Unchanged`]. With `discard_documents` set, an
  /// applied transition also drops the document references in the same
  /// write and returns them. Fails with `NotFound`.
  fn set_status(
    &self,
    input: Transition,
  ) -> impl Future<Output = Result<Change<Decided>, Self::Error>> + Send + '_;

  /// Force the request to denied and insert the block record, atomically.
  ///
  /// `Unchanged` if already blocked. Fails with `NotFound`, or with
  /// `InvalidTransition` when the request is approved and
  /// `override_approval` is not set. Documents are dropped as in
  /// [`VerificationStore::set_status`].
  fn block(
    &self,
    input: BlockRequest,
  ) -> impl Future<Output = Result<Change<Decided>, Self::Error>> + Send + '_;

  /// Remove the block record. Status is left as it is (denied).
  /// `Unchanged` if the requester was not blocked. Fails with `NotFound`.
  fn unblock(
    &self,
    id: UserId,
    moderator: UserId,
  ) -> impl Future<Output = Result<Change<VerificationRequest>, Self::Error>> + Send + '_;

  // ── Settings ──────────────────────────────────────────────────────────

  /// Persist the channel new submissions are announced in.
  fn set_review_channel(
    &self,
    channel_id: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn review_channel(
    &self,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;
}
