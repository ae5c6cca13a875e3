//! Engine and dispatcher tests against an in-memory `SqliteStore`.

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use chrono::{Duration, Utc};
use vouch_core::{
  Error, UserId,
  attempts::AttemptPolicy,
  event::{Caller, InteractionEvent, MessageEvent},
  intent::Intent,
  request::{
    Action, BlockRequest, Change, Decided, DecisionEvent, DocumentKind,
    NewSubmission, PayloadRef, ReviewState, Status, Submission,
    SubmissionOutcome, Transition, VerificationRequest,
  },
  store::VerificationStore,
};
use vouch_store_sqlite::SqliteStore;

use crate::{
  Authorizer, Dispatcher, Engine, EngineConfig, LinkSigner, Moderator, Reply,
  SubmissionForm, VerifiedRequester,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const SECRET: &[u8] = b"test secret";

fn signer() -> LinkSigner {
  LinkSigner::new(SECRET, "https://verify.example", Duration::hours(1)).unwrap()
}

async fn engine_with(config: EngineConfig) -> Arc<Engine<SqliteStore>> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  Arc::new(Engine::new(Arc::new(store), config))
}

async fn engine() -> Arc<Engine<SqliteStore>> {
  engine_with(EngineConfig {
    default_review_channel: Some("review".into()),
    ..EngineConfig::default()
  })
  .await
}

fn dispatcher(engine: Arc<Engine<SqliteStore>>) -> Dispatcher<SqliteStore> {
  Dispatcher::new(engine, Arc::new(signer()), Authorizer::new(["staff"]), "!")
}

fn requester(id: &str) -> VerifiedRequester {
  let s = signer();
  let token = s.token(&id.into(), Utc::now());
  s.verify(&token, Utc::now()).unwrap()
}

fn moderator(id: &str) -> Moderator {
  Authorizer::new(["staff"]).authorize(&staff(id)).unwrap()
}

fn staff(id: &str) -> Caller {
  Caller { user_id: id.into(), roles: vec!["staff".into()], bot: false }
}

fn member(id: &str) -> Caller {
  Caller { user_id: id.into(), roles: vec!["member".into()], bot: false }
}

fn doc(kind: DocumentKind, hash: &str) -> PayloadRef {
  PayloadRef {
    kind,
    path:         format!("{hash}.jpg"),
    content_hash: hash.into(),
    media_type:   "image/jpeg".into(),
  }
}

fn form(name: &str) -> SubmissionForm {
  SubmissionForm {
    display_name: name.into(),
    birthdate:    "2000-01-01".into(),
    documents:    vec![doc(DocumentKind::IdDocument, "id1"), doc(DocumentKind::Selfie, "sf1")],
  }
}

/// Delegates to SQLite until a decision has been written, then fails every
/// call as if the database had gone away.
struct FailAfterDecision {
  inner:   SqliteStore,
  decided: AtomicBool,
}

impl FailAfterDecision {
  async fn new() -> Self {
    Self {
      inner:   SqliteStore::open_in_memory().await.unwrap(),
      decided: AtomicBool::new(false),
    }
  }

  fn check(&self) -> Result<(), Error> {
    if self.decided.load(Ordering::SeqCst) {
      return Err(Error::StoreUnavailable("database went away".into()));
    }
    Ok(())
  }
}

impl VerificationStore for FailAfterDecision {
  type Error = Error;

  async fn upsert_submission(&self, input: NewSubmission) -> Result<Submission, Error> {
    self.check()?;
    self.inner.upsert_submission(input).await.map_err(Into::into)
  }

  async fn record_attempt(&self, id: UserId) -> Result<Option<u32>, Error> {
    self.check()?;
    self.inner.record_attempt(id).await.map_err(Into::into)
  }

  async fn get(&self, id: UserId) -> Result<Option<VerificationRequest>, Error> {
    self.check()?;
    self.inner.get(id).await.map_err(Into::into)
  }

  async fn list(&self, status: Option<Status>) -> Result<Vec<VerificationRequest>, Error> {
    self.check()?;
    self.inner.list(status).await.map_err(Into::into)
  }

  async fn is_blocked(&self, id: UserId) -> Result<bool, Error> {
    self.check()?;
    self.inner.is_blocked(id).await.map_err(Into::into)
  }

  async fn history(&self, id: UserId) -> Result<Vec<DecisionEvent>, Error> {
    self.check()?;
    self.inner.history(id).await.map_err(Into::into)
  }

  async fn set_status(&self, input: Transition) -> Result<Change<Decided>, Error> {
    self.check()?;
    let change = self.inner.set_status(input).await.map_err(Error::from)?;
    self.decided.store(true, Ordering::SeqCst);
    Ok(change)
  }

  async fn block(&self, input: BlockRequest) -> Result<Change<Decided>, Error> {
    self.check()?;
    let change = self.inner.block(input).await.map_err(Error::from)?;
    self.decided.store(true, Ordering::SeqCst);
    Ok(change)
  }

  async fn unblock(
    &self,
    id: UserId,
    moderator: UserId,
  ) -> Result<Change<VerificationRequest>, Error> {
    self.check()?;
    self.inner.unblock(id, moderator).await.map_err(Into::into)
  }

  async fn set_review_channel(&self, channel_id: String) -> Result<(), Error> {
    self.check()?;
    self.inner.set_review_channel(channel_id).await.map_err(Into::into)
  }

  async fn review_channel(&self) -> Result<Option<String>, Error> {
    self.check()?;
    self.inner.review_channel().await.map_err(Into::into)
  }
}

fn message(caller: Caller, content: &str) -> MessageEvent {
  MessageEvent { caller, channel_id: Some("chan-1".into()), content: content.into() }
}

fn click(caller: Caller, custom_id: &str) -> InteractionEvent {
  InteractionEvent { caller, custom_id: custom_id.into() }
}

// ─── Submissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_queues_and_notifies_moderators() {
  let e = engine().await;
  let out = e.submit(&requester("42"), form("alice")).await.unwrap();

  assert_eq!(out.outcome, SubmissionOutcome::Created);
  assert_eq!(out.request.status, Status::Pending);
  assert_eq!(out.request.attempts, 1);
  assert!(out.orphaned_documents.is_empty());

  match &out.intents[..] {
    [
      Intent::NotifyModerators {
        channel,
        requester_id,
        attempts,
        remaining_attempts,
        controls,
        documents,
        ..
      },
      Intent::AssignUnverifiedRole { .. },
    ] => {
      assert_eq!(channel.as_deref(), Some("review"));
      assert_eq!(requester_id.as_str(), "42");
      assert_eq!(*attempts, 1);
      assert_eq!(*remaining_attempts, None);
      assert_eq!(documents.len(), 2);
      assert_eq!(controls, &["verify_approve_42", "verify_deny_42", "verify_block_42"]);
    }
    other => panic!("unexpected intents {other:?}"),
  }
}

#[tokio::test]
async fn stored_review_channel_wins_over_default() {
  let e = engine().await;
  e.set_review_channel("mods", &moderator("m1")).await.unwrap();
  let out = e.submit(&requester("42"), form("alice")).await.unwrap();
  assert!(matches!(
    &out.intents[0],
    Intent::NotifyModerators { channel: Some(c), .. } if c == "mods"
  ));
}

#[tokio::test]
async fn submission_requires_both_documents_and_birthdate() {
  let e = engine().await;

  let mut missing_selfie = form("alice");
  missing_selfie.documents.retain(|d| d.kind != DocumentKind::Selfie);
  let err = e.submit(&requester("42"), missing_selfie).await.unwrap_err();
  assert!(matches!(err, Error::InvalidSubmission(m) if m.contains("selfie")));

  let mut no_birthdate = form("alice");
  no_birthdate.birthdate = "  ".into();
  assert!(matches!(
    e.submit(&requester("42"), no_birthdate).await,
    Err(Error::InvalidSubmission(_))
  ));
  assert!(matches!(e.get(&"42".into()).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn blank_display_name_falls_back_to_id() {
  let e = engine().await;
  let out = e.submit(&requester("42"), form("   ")).await.unwrap();
  assert_eq!(out.request.display_name, "42");
}

#[tokio::test]
async fn resubmission_orphans_replaced_documents() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let mut second = form("alice");
  second.documents = vec![doc(DocumentKind::IdDocument, "id2"), doc(DocumentKind::Selfie, "sf2")];
  let out = e.submit(&requester("42"), second).await.unwrap();

  assert_eq!(out.outcome, SubmissionOutcome::Resubmitted);
  assert_eq!(out.request.attempts, 2);
  let mut orphaned: Vec<_> = out.orphaned_documents.iter().map(|d| d.content_hash.as_str()).collect();
  orphaned.sort();
  assert_eq!(orphaned, ["id1", "sf1"]);
}

#[tokio::test]
async fn approved_requester_resubmitting_is_a_no_op() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.approve(&"42".into(), &moderator("m1")).await.unwrap();

  let out = e.submit(&requester("42"), form("alice again")).await.unwrap();
  assert_eq!(out.outcome, SubmissionOutcome::AlreadyApproved);
  assert!(out.intents.is_empty());
  assert_eq!(out.orphaned_documents.len(), 2);
  assert_eq!(out.request.attempts, 1);
  assert_eq!(out.request.display_name, "alice");
}

#[tokio::test]
async fn blocked_requester_cannot_submit() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.block(&"42".into(), &moderator("m1"), Some("fraud".into())).await.unwrap();

  let err = e.submit(&requester("42"), form("alice")).await.unwrap_err();
  assert!(matches!(err, Error::Blocked(id) if id.as_str() == "42"));
  assert_eq!(e.get(&"42".into()).await.unwrap().attempts, 1);
}

#[tokio::test]
async fn attempt_limit_rejects_further_submissions() {
  let e = engine_with(EngineConfig {
    attempts: AttemptPolicy::limited(2),
    ..EngineConfig::default()
  })
  .await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  let last = e.submit(&requester("42"), form("alice")).await.unwrap();
  assert!(matches!(
    &last.intents[0],
    Intent::NotifyModerators { remaining_attempts: Some(0), .. }
  ));

  let err = e.submit(&requester("42"), form("alice")).await.unwrap_err();
  assert!(matches!(err, Error::TooManyAttempts { attempts: 2, limit: 2, .. }));
  assert_eq!(e.get(&"42".into()).await.unwrap().attempts, 2);
}

#[tokio::test]
async fn block_outranks_attempt_limit() {
  let e = engine_with(EngineConfig {
    attempts: AttemptPolicy::limited(1),
    ..EngineConfig::default()
  })
  .await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.block(&"42".into(), &moderator("m1"), None).await.unwrap();

  let err = e.submit(&requester("42"), form("alice")).await.unwrap_err();
  assert!(matches!(err, Error::Blocked(id) if id.as_str() == "42"));
}

// ─── Decisions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn approve_grants_role_once() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let first = e.approve(&"42".into(), &moderator("m1")).await.unwrap();
  assert!(first.applied);
  assert_eq!(first.intents, [
    Intent::GrantRole { requester_id: "42".into() },
    Intent::NotifyApproved { requester_id: "42".into() },
  ]);

  let second = e.approve(&"42".into(), &moderator("m2")).await.unwrap();
  assert!(!second.applied);
  assert!(second.intents.is_empty());
  assert_eq!(second.request.processed_by, first.request.processed_by);
  assert_eq!(second.request.processed_at, first.request.processed_at);
}

#[tokio::test]
async fn deny_uses_default_reason() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  let d = e.deny(&"42".into(), &moderator("m1"), None).await.unwrap();
  assert_eq!(d.intents, [Intent::NotifyDenied {
    requester_id: "42".into(),
    reason:       "No reason provided.".into(),
  }]);
  assert_eq!(d.request.processed_by, Some("m1".into()));
}

#[tokio::test]
async fn decisions_on_unknown_requester_are_not_found() {
  let e = engine().await;
  let m = moderator("m1");
  let id = "404".into();
  assert!(matches!(e.approve(&id, &m).await, Err(Error::NotFound(_))));
  assert!(matches!(e.deny(&id, &m, None).await, Err(Error::NotFound(_))));
  assert!(matches!(e.block(&id, &m, None).await, Err(Error::NotFound(_))));
  assert!(matches!(e.unblock(&id, &m).await, Err(Error::NotFound(_))));
  assert!(matches!(e.history(&id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn racing_decisions_fire_one_set_of_side_effects() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let (m1, m2) = (moderator("m1"), moderator("m2"));
  let id = "42".into();
  let (a, d) = tokio::join!(e.approve(&id, &m1), e.deny(&id, &m2, None));
  let (a, d) = (a.unwrap(), d.unwrap());

  assert!(a.applied ^ d.applied);
  let (winner, loser) = if a.applied { (&a, &d) } else { (&d, &a) };
  assert!(!winner.intents.is_empty());
  assert!(loser.intents.is_empty());

  let status = e.get(&id).await.unwrap().status;
  let expected = if a.applied { Status::Approved } else { Status::Denied };
  assert_eq!(status, expected);
}

#[tokio::test]
async fn block_after_approval_revokes_role() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.approve(&"42".into(), &moderator("m1")).await.unwrap();

  let b = e.block(&"42".into(), &moderator("m2"), Some("fraud".into())).await.unwrap();
  assert!(b.applied);
  assert_eq!(b.request.review_state(), ReviewState::Blocked);
  assert!(b.intents.contains(&Intent::RevokeRole { requester_id: "42".into() }));
  assert!(b.intents.contains(&Intent::NotifyBlocked {
    requester_id: "42".into(),
    reason:       "fraud".into(),
  }));

  let again = e.block(&"42".into(), &moderator("m2"), None).await.unwrap();
  assert!(!again.applied);
  assert!(again.intents.is_empty());
}

#[tokio::test]
async fn block_after_approval_can_be_refused() {
  let e = engine_with(EngineConfig {
    allow_block_after_approval: false,
    ..EngineConfig::default()
  })
  .await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.approve(&"42".into(), &moderator("m1")).await.unwrap();

  let err = e.block(&"42".into(), &moderator("m1"), None).await.unwrap_err();
  assert!(matches!(
    err,
    Error::InvalidTransition { from: ReviewState::Approved, action: Action::Block, .. }
  ));
  assert_eq!(e.get(&"42".into()).await.unwrap().status, Status::Approved);
}

#[tokio::test]
async fn unblock_then_resubmit_returns_to_pending() {
  let e = engine().await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.block(&"42".into(), &moderator("m1"), None).await.unwrap();

  let u = e.unblock(&"42".into(), &moderator("m1")).await.unwrap();
  assert!(u.applied);
  assert!(u.intents.is_empty());
  assert_eq!(u.request.review_state(), ReviewState::Denied);

  let out = e.submit(&requester("42"), form("alice")).await.unwrap();
  assert_eq!(out.request.status, Status::Pending);
  assert_eq!(out.request.attempts, 2);

  let actions: Vec<_> = e.history(&"42".into()).await.unwrap().into_iter().map(|h| h.action).collect();
  assert_eq!(actions, [Action::Block, Action::Unblock]);
}

#[tokio::test]
async fn terminal_decision_discards_documents_when_not_retained() {
  let e = engine_with(EngineConfig { retain_documents: false, ..EngineConfig::default() }).await;
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let d = e.deny(&"42".into(), &moderator("m1"), None).await.unwrap();
  assert_eq!(d.discarded_documents.len(), 2);
  assert!(d.request.documents.is_empty());
  assert!(e.get(&"42".into()).await.unwrap().documents.is_empty());
}

#[tokio::test]
async fn discarding_decision_is_complete_once_committed() {
  let store = Arc::new(FailAfterDecision::new().await);
  let e = Engine::new(
    store.clone(),
    EngineConfig { retain_documents: false, ..EngineConfig::default() },
  );
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let d = e.approve(&"42".into(), &moderator("m1")).await.unwrap();
  assert!(d.applied);
  assert!(matches!(
    &d.intents[..],
    [Intent::GrantRole { .. }, Intent::NotifyApproved { .. }]
  ));
  assert_eq!(d.discarded_documents.len(), 2);
  assert!(d.request.documents.is_empty());

  let stored = store.inner.get("42".into()).await.unwrap().unwrap();
  assert_eq!(stored.status, Status::Approved);
  assert!(stored.documents.is_empty());
}

#[tokio::test]
async fn resubmission_after_discarding_deny_keeps_its_documents() {
  let e = engine_with(EngineConfig { retain_documents: false, ..EngineConfig::default() }).await;
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.deny(&"42".into(), &moderator("m1"), None).await.unwrap();

  let mut again = form("alice");
  again.documents = vec![doc(DocumentKind::IdDocument, "id2"), doc(DocumentKind::Selfie, "sf2")];
  let out = e.submit(&requester("42"), again).await.unwrap();
  assert!(out.orphaned_documents.is_empty());
  assert_eq!(e.get(&"42".into()).await.unwrap().documents.len(), 2);

  let late = e.deny(&"42".into(), &moderator("m2"), None).await.unwrap();
  assert!(late.applied);
  let paths: Vec<_> = late.discarded_documents.iter().map(|d| d.path.as_str()).collect();
  assert_eq!(paths, ["id2.jpg", "sf2.jpg"]);
}

#[tokio::test]
async fn queue_filters_by_status() {
  let e = engine().await;
  e.submit(&requester("1"), form("a")).await.unwrap();
  e.submit(&requester("2"), form("b")).await.unwrap();
  e.approve(&"1".into(), &moderator("m1")).await.unwrap();

  let pending: Vec<_> = e
    .queue(Some(Status::Pending))
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.requester_id.into_inner())
    .collect();
  assert_eq!(pending, ["2"]);
  assert_eq!(e.queue(None).await.unwrap().len(), 2);
}

// ─── Dispatcher: text commands ───────────────────────────────────────────────

#[tokio::test]
async fn chatter_and_bots_are_ignored() {
  let d = dispatcher(engine().await);
  let out = d.on_message(message(member("1"), "hello")).await.unwrap();
  assert_eq!(out.reply, Reply::Ignored);

  let mut bot = staff("b");
  bot.bot = true;
  let out = d.on_message(message(bot, "!approve 42")).await.unwrap();
  assert_eq!(out.reply, Reply::Ignored);
  assert!(out.intents.is_empty());
}

#[tokio::test]
async fn non_moderator_is_unauthorized_before_lookup() {
  let d = dispatcher(engine().await);
  // Unknown requester: NotFound would win if the engine were reached.
  let err = d.on_message(message(member("1"), "!approve 404")).await.unwrap_err();
  assert!(matches!(err, Error::Unauthorized(id) if id.as_str() == "1"));
}

#[tokio::test]
async fn text_commands_drive_the_engine() {
  let e = engine().await;
  let d = dispatcher(e.clone());
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let out = d.on_message(message(staff("m1"), "!deny <@42> block forged")).await.unwrap();
  assert_eq!(out.reply, Reply::Decided {
    action:       Action::Block,
    requester_id: "42".into(),
    applied:      true,
    state:        ReviewState::Blocked,
  });
  assert!(!out.disable_control);

  let out = d.on_message(message(staff("m1"), "!unblock 42")).await.unwrap();
  assert!(matches!(out.reply, Reply::Decided { applied: true, state: ReviewState::Denied, .. }));

  let err = d.on_message(message(staff("m1"), "!approve")).await.unwrap_err();
  assert!(matches!(err, Error::InvalidCommand(_)));
}

#[tokio::test]
async fn setmodchannel_persists_current_channel() {
  let e = engine().await;
  let d = dispatcher(e.clone());
  let out = d.on_message(message(staff("m1"), "!setmodchannel")).await.unwrap();
  assert_eq!(out.reply, Reply::ReviewChannelSet { channel_id: "chan-1".into() });

  let mut direct = message(staff("m1"), "!setmodchannel");
  direct.channel_id = None;
  assert!(matches!(d.on_message(direct).await, Err(Error::InvalidCommand(_))));

  let out = e.submit(&requester("42"), form("alice")).await.unwrap();
  assert!(matches!(
    &out.intents[0],
    Intent::NotifyModerators { channel: Some(c), .. } if c == "chan-1"
  ));
}

#[tokio::test]
async fn verify_sends_a_link_for_the_caller() {
  let e = engine().await;
  let d = dispatcher(e.clone());

  let out = d.on_message(message(member("42"), "!verify")).await.unwrap();
  assert_eq!(out.reply, Reply::LinkSent { requester_id: "42".into(), attempts: None });
  let [Intent::SendVerificationLink { requester_id, link }] = &out.intents[..] else {
    panic!("unexpected intents {:?}", out.intents);
  };
  assert_eq!(requester_id.as_str(), "42");
  let token = link.split_once("token=").unwrap().1;
  assert_eq!(signer().verify(token, Utc::now()).unwrap().id().as_str(), "42");

  e.submit(&requester("42"), form("alice")).await.unwrap();
  let out = d.on_message(message(member("42"), "!verify")).await.unwrap();
  assert_eq!(out.reply, Reply::LinkSent { requester_id: "42".into(), attempts: Some(2) });
}

#[tokio::test]
async fn verify_refuses_blocked_requester() {
  let e = engine().await;
  let d = dispatcher(e.clone());
  e.submit(&requester("42"), form("alice")).await.unwrap();
  e.block(&"42".into(), &moderator("m1"), None).await.unwrap();

  let err = d.on_message(message(member("42"), "!verify")).await.unwrap_err();
  assert!(matches!(err, Error::Blocked(_)));
}

// ─── Dispatcher: controls ────────────────────────────────────────────────────

#[tokio::test]
async fn control_click_is_idempotent_and_disables_control() {
  let e = engine().await;
  let d = dispatcher(e.clone());
  e.submit(&requester("42"), form("alice")).await.unwrap();

  let first = d.on_interaction(click(staff("m1"), "verify_approve_42")).await.unwrap();
  assert!(first.disable_control);
  assert_eq!(first.intents.len(), 2);

  let second = d.on_interaction(click(staff("m2"), "verify_approve_42")).await.unwrap();
  assert!(second.disable_control);
  assert!(second.intents.is_empty());
  assert_eq!(second.reply, Reply::Decided {
    action:       Action::Approve,
    requester_id: "42".into(),
    applied:      false,
    state:        ReviewState::Approved,
  });
}

#[tokio::test]
async fn foreign_or_malformed_controls_are_rejected() {
  let d = dispatcher(engine().await);
  for id in ["other_approve_42", "verify_unblock_42", "verify_approve_", "verify"] {
    let err = d.on_interaction(click(staff("m1"), id)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidCommand(_)), "{id}");
  }
  let err = d.on_interaction(click(member("9"), "verify_deny_42")).await.unwrap_err();
  assert!(matches!(err, Error::Unauthorized(_)));
}

#[test]
fn replies_are_tagged_for_adapters() {
  let v = serde_json::to_value(Reply::ReviewChannelSet { channel_id: "c".into() }).unwrap();
  assert_eq!(v, serde_json::json!({ "reply": "review_channel_set", "channel_id": "c" }));

  let v = serde_json::to_value(Reply::Ignored).unwrap();
  assert_eq!(v, serde_json::json!({ "reply": "ignored" }));
}
