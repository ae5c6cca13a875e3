//! The transition engine.
//!
//! | From | Event | To |
//! |------|-------|----|
//! | (none) | submit | pending |
//! | pending | approve | approved |
//! | pending | deny | denied |
//! | pending / approved / denied | block | denied + blocked |
//! | denied + blocked | unblock | denied |
//! | pending / denied | submit | pending (attempts + 1) |
//!
//! A decision that finds the request already past `pending` returns
//! `applied = false` with no intents, so a double click never grants a role
//! twice. The check and the write happen in the same store transaction.

use std::sync::Arc;

use serde::Serialize;
use vouch_core::{
  Error, Result, UserId,
  attempts::AttemptPolicy,
  command::{ControlToken, DEFAULT_DENY_REASON},
  intent::Intent,
  request::{
    Action, BlockRequest, Change, Decided, DecisionEvent, DocumentKind,
    NewSubmission, PayloadRef, Status, SubmissionOutcome, Transition,
    VerificationRequest,
  },
  store::VerificationStore,
};

use crate::{capability::Moderator, links::VerifiedRequester};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Whether `block` may force an approved request to denied + blocked.
  pub allow_block_after_approval: bool,
  /// Keep document references after a terminal decision.
  pub retain_documents:           bool,
  pub attempts:                   AttemptPolicy,
  /// Namespace of the control ids attached to review messages.
  pub control_namespace:          String,
  /// Review channel used until a moderator sets one.
  pub default_review_channel:     Option<String>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      allow_block_after_approval: true,
      retain_documents:           true,
      attempts:                   AttemptPolicy::unlimited(),
      control_namespace:          "verify".to_string(),
      default_review_channel:     None,
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Form fields of a submission; identity comes from the link, not from here.
#[derive(Debug, Clone)]
pub struct SubmissionForm {
  pub display_name: String,
  pub birthdate:    String,
  pub documents:    Vec<PayloadRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submitted {
  pub outcome:            SubmissionOutcome,
  pub request:            VerificationRequest,
  pub intents:            Vec<Intent>,
  /// Documents no request references any more; the caller deletes them.
  #[serde(skip)]
  pub orphaned_documents: Vec<PayloadRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
  pub action:              Action,
  pub request:             VerificationRequest,
  /// `false` when the request was already past this transition.
  pub applied:             bool,
  /// Empty unless `applied`.
  pub intents:             Vec<Intent>,
  #[serde(skip)]
  pub discarded_documents: Vec<PayloadRef>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: VerificationStore> Engine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self { Self { store, config } }

  pub fn config(&self) -> &EngineConfig { &self.config }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get(&self, id: &UserId) -> Result<VerificationRequest> {
    self
      .store
      .get(id.clone())
      .await
      .map_err(Into::into)?
      .ok_or_else(|| Error::NotFound(id.clone()))
  }

  pub async fn queue(&self, status: Option<Status>) -> Result<Vec<VerificationRequest>> {
    self.store.list(status).await.map_err(Into::into)
  }

  pub async fn history(&self, id: &UserId) -> Result<Vec<DecisionEvent>> {
    self.get(id).await?;
    self.store.history(id.clone()).await.map_err(Into::into)
  }

  // ── Submissions ───────────────────────────────────────────────────────────

  /// Accept a submission from the requester the link was issued to.
  pub async fn submit(
    &self,
    requester: &VerifiedRequester,
    form: SubmissionForm,
  ) -> Result<Submitted> {
    let id = requester.id();
    validate(&form)?;

    if let Some(existing) = self.store.get(id.clone()).await.map_err(Into::into)? {
      if existing.is_blocked() {
        tracing::info!(requester_id = %id, "rejected submission from blocked requester");
        return Err(Error::Blocked(id.clone()));
      }
      if existing.status != Status::Approved {
        self.config.attempts.check(id, existing.attempts)?;
      }
    }

    let display_name = match form.display_name.trim() {
      "" => id.to_string(),
      name => name.to_owned(),
    };
    let uploaded = form.documents.clone();
    let submission = self
      .store
      .upsert_submission(NewSubmission {
        requester_id: id.clone(),
        display_name,
        birthdate: form.birthdate.trim().to_owned(),
        documents: form.documents,
      })
      .await
      .map_err(|e| {
        let e: Error = e.into();
        if let Error::Blocked(_) = e {
          tracing::info!(requester_id = %id, "rejected submission from blocked requester");
        }
        e
      })?;

    let request = submission.request;
    let (intents, orphaned_documents) = match submission.outcome {
      SubmissionOutcome::AlreadyApproved => {
        tracing::info!(requester_id = %id, "ignored submission from approved requester");
        (Vec::new(), uploaded)
      }
      outcome => {
        tracing::info!(
          requester_id = %id,
          attempts = request.attempts,
          ?outcome,
          "queued submission for review"
        );
        let channel = match self.store.review_channel().await.map_err(Into::into)? {
          Some(channel) => Some(channel),
          None => self.config.default_review_channel.clone(),
        };
        let intents = vec![
          Intent::NotifyModerators {
            channel,
            requester_id: id.clone(),
            display_name: request.display_name.clone(),
            birthdate: request.birthdate.clone(),
            attempts: request.attempts,
            remaining_attempts: self.config.attempts.remaining(request.attempts),
            documents: request.documents.clone(),
            controls: ControlToken::controls_for(&self.config.control_namespace, id),
          },
          Intent::AssignUnverifiedRole { requester_id: id.clone() },
        ];
        (intents, submission.replaced_documents)
      }
    };

    Ok(Submitted { outcome: submission.outcome, request, intents, orphaned_documents })
  }

  /// Bookkeeping for a verification-link request: reject blocked or
  /// exhausted requesters, then count the attempt. Returns the new attempt
  /// count, or `None` for someone who has never submitted.
  pub async fn prepare_link(&self, id: &UserId) -> Result<Option<u32>> {
    if self.store.is_blocked(id.clone()).await.map_err(Into::into)? {
      return Err(Error::Blocked(id.clone()));
    }
    if let Some(existing) = self.store.get(id.clone()).await.map_err(Into::into)? {
      self.config.attempts.check(id, existing.attempts)?;
    }
    self.store.record_attempt(id.clone()).await.map_err(Into::into)
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  pub async fn approve(&self, id: &UserId, moderator: &Moderator) -> Result<Decision> {
    let change = self
      .store
      .set_status(self.transition(id, Status::Approved, moderator, None))
      .await
      .map_err(Into::into)?;
    let intents = vec![
      Intent::GrantRole { requester_id: id.clone() },
      Intent::NotifyApproved { requester_id: id.clone() },
    ];
    Ok(self.finish(Action::Approve, moderator, change, intents))
  }

  pub async fn deny(
    &self,
    id: &UserId,
    moderator: &Moderator,
    reason: Option<String>,
  ) -> Result<Decision> {
    let change = self
      .store
      .set_status(self.transition(id, Status::Denied, moderator, reason.clone()))
      .await
      .map_err(Into::into)?;
    let intents = vec![Intent::NotifyDenied {
      requester_id: id.clone(),
      reason:       reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_owned()),
    }];
    Ok(self.finish(Action::Deny, moderator, change, intents))
  }

  /// Deny and block in one step. The role revocation is always emitted:
  /// removing a role the requester does not hold is harmless, and the
  /// request may have been approved a moment earlier.
  pub async fn block(
    &self,
    id: &UserId,
    moderator: &Moderator,
    reason: Option<String>,
  ) -> Result<Decision> {
    let change = self
      .store
      .block(BlockRequest {
        requester_id:      id.clone(),
        moderator:         moderator.id().clone(),
        reason:            reason.clone(),
        override_approval: self.config.allow_block_after_approval,
        discard_documents: !self.config.retain_documents,
      })
      .await
      .map_err(Into::into)?;
    let intents = vec![
      Intent::RevokeRole { requester_id: id.clone() },
      Intent::NotifyBlocked {
        requester_id: id.clone(),
        reason:       reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_owned()),
      },
    ];
    Ok(self.finish(Action::Block, moderator, change, intents))
  }

  /// Lift a block. Documents are never dropped here.
  pub async fn unblock(&self, id: &UserId, moderator: &Moderator) -> Result<Decision> {
    let change = self
      .store
      .unblock(id.clone(), moderator.id().clone())
      .await
      .map_err(Into::into)?;
    Ok(self.finish(Action::Unblock, moderator, change.map(Decided::from), Vec::new()))
  }

  pub async fn set_review_channel(&self, channel_id: &str, moderator: &Moderator) -> Result<()> {
    self
      .store
      .set_review_channel(channel_id.to_owned())
      .await
      .map_err(Into::into)?;
    tracing::info!(channel_id, moderator = %moderator.id(), "review channel updated");
    Ok(())
  }

  fn transition(
    &self,
    id: &UserId,
    to: Status,
    moderator: &Moderator,
    reason: Option<String>,
  ) -> Transition {
    Transition {
      requester_id: id.clone(),
      from: Status::Pending,
      to,
      moderator: moderator.id().clone(),
      reason,
      discard_documents: !self.config.retain_documents,
    }
  }

  /// Everything the decision changed is already committed; this only
  /// shapes the result.
  fn finish(
    &self,
    action: Action,
    moderator: &Moderator,
    change: Change<Decided>,
    intents: Vec<Intent>,
  ) -> Decision {
    let applied = change.is_applied();
    let Decided { request, discarded_documents } = change.into_inner();

    tracing::info!(
      requester_id = %request.requester_id,
      moderator = %moderator.id(),
      %action,
      applied,
      state = %request.review_state(),
      discarded = discarded_documents.len(),
      "moderation decision"
    );

    let intents = if applied { intents } else { Vec::new() };
    Decision { action, request, applied, intents, discarded_documents }
  }
}

fn validate(form: &SubmissionForm) -> Result<()> {
  if form.birthdate.trim().is_empty() {
    return Err(Error::InvalidSubmission("birthdate is required".into()));
  }
  for kind in [DocumentKind::IdDocument, DocumentKind::Selfie] {
    if !form.documents.iter().any(|d| d.kind == kind) {
      return Err(Error::InvalidSubmission(format!("{kind} image is required")));
    }
  }
  Ok(())
}
