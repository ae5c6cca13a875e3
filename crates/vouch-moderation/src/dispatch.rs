//! One entry point per inbound surface.
//!
//! Each message or control click selects exactly one handler, so a single
//! event can never fire two decisions. Moderation commands are authorized
//! here, before the engine is reached; `verify` is per-requester and takes
//! the requester id from the caller, never from the message text.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use vouch_core::{
  Error, Result, UserId,
  command::{Command, ControlToken},
  event::{InteractionEvent, MessageEvent},
  intent::Intent,
  request::{Action, PayloadRef, ReviewState},
  store::VerificationStore,
};

use crate::{
  capability::{Authorizer, Moderator},
  engine::{Decision, Engine},
  links::LinkSigner,
};

// ─── Responses ───────────────────────────────────────────────────────────────

/// What the adapter should tell the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
  /// Not addressed to us; say nothing.
  Ignored,
  LinkSent {
    requester_id: UserId,
    /// `None` until the requester has submitted once.
    attempts:     Option<u32>,
  },
  Decided {
    action:       Action,
    requester_id: UserId,
    /// `false` means someone else already decided; report the state below.
    applied:      bool,
    state:        ReviewState,
  },
  ReviewChannelSet {
    channel_id: String,
  },
}

#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
  pub reply:               Reply,
  pub intents:             Vec<Intent>,
  /// Replace or disable the clicked control.
  pub disable_control:     bool,
  #[serde(skip)]
  pub discarded_documents: Vec<PayloadRef>,
}

impl Dispatched {
  fn ignored() -> Self {
    Self {
      reply:               Reply::Ignored,
      intents:             Vec::new(),
      disable_control:     false,
      discarded_documents: Vec::new(),
    }
  }

  fn decided(decision: Decision, disable_control: bool) -> Self {
    Self {
      reply: Reply::Decided {
        action: decision.action,
        requester_id: decision.request.requester_id.clone(),
        applied: decision.applied,
        state: decision.request.review_state(),
      },
      intents: decision.intents,
      disable_control,
      discarded_documents: decision.discarded_documents,
    }
  }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

pub struct Dispatcher<S> {
  engine:     Arc<Engine<S>>,
  links:      Arc<LinkSigner>,
  authorizer: Authorizer,
  prefix:     String,
}

impl<S: VerificationStore> Dispatcher<S> {
  pub fn new(
    engine: Arc<Engine<S>>,
    links: Arc<LinkSigner>,
    authorizer: Authorizer,
    prefix: impl Into<String>,
  ) -> Self {
    Self { engine, links, authorizer, prefix: prefix.into() }
  }

  pub fn engine(&self) -> &Arc<Engine<S>> { &self.engine }

  /// Text-command surface.
  pub async fn on_message(&self, event: MessageEvent) -> Result<Dispatched> {
    if event.caller.bot {
      return Ok(Dispatched::ignored());
    }
    let Some(command) = Command::parse(&self.prefix, &event.content)? else {
      return Ok(Dispatched::ignored());
    };
    tracing::debug!(caller = %event.caller.user_id, ?command, "text command");

    if !command.is_moderation() {
      return self.send_link(&event.caller.user_id).await;
    }

    let moderator = self.authorizer.authorize(&event.caller)?;
    let decision = match command {
      Command::Approve(id) => self.engine.approve(&id, &moderator).await?,
      Command::Deny { requester_id, block: true, reason } => {
        self.engine.block(&requester_id, &moderator, reason).await?
      }
      Command::Deny { requester_id, block: false, reason } => {
        self.engine.deny(&requester_id, &moderator, reason).await?
      }
      Command::Unblock(id) => self.engine.unblock(&id, &moderator).await?,
      Command::SetModChannel => {
        return self.set_review_channel(event.channel_id, &moderator).await;
      }
      Command::Verify => return Ok(Dispatched::ignored()),
    };
    Ok(Dispatched::decided(decision, false))
  }

  /// Interactive-control surface.
  pub async fn on_interaction(&self, event: InteractionEvent) -> Result<Dispatched> {
    if event.caller.bot {
      return Ok(Dispatched::ignored());
    }
    let token = ControlToken::parse(&self.engine.config().control_namespace, &event.custom_id)?;
    let moderator = self.authorizer.authorize(&event.caller)?;
    let decision = self.decide(&moderator, &token).await?;
    Ok(Dispatched::decided(decision, true))
  }

  async fn decide(&self, moderator: &Moderator, token: &ControlToken) -> Result<Decision> {
    let id = &token.requester_id;
    match token.action {
      Action::Approve => self.engine.approve(id, moderator).await,
      Action::Deny => self.engine.deny(id, moderator, None).await,
      Action::Block => self.engine.block(id, moderator, None).await,
      Action::Unblock => Err(Error::InvalidCommand("unblock has no control".into())),
    }
  }

  async fn send_link(&self, requester: &UserId) -> Result<Dispatched> {
    let attempts = self.engine.prepare_link(requester).await?;
    let link = self.links.link(requester, Utc::now());
    tracing::info!(requester_id = %requester, ?attempts, "verification link issued");
    Ok(Dispatched {
      reply:               Reply::LinkSent { requester_id: requester.clone(), attempts },
      intents:             vec![Intent::SendVerificationLink {
        requester_id: requester.clone(),
        link,
      }],
      disable_control:     false,
      discarded_documents: Vec::new(),
    })
  }

  async fn set_review_channel(
    &self,
    channel_id: Option<String>,
    moderator: &Moderator,
  ) -> Result<Dispatched> {
    let channel_id = channel_id.ok_or_else(|| {
      Error::InvalidCommand(format!("{}setmodchannel must be sent in a channel", self.prefix))
    })?;
    self.engine.set_review_channel(&channel_id, moderator).await?;
    Ok(Dispatched {
      reply: Reply::ReviewChannelSet { channel_id },
      ..Dispatched::ignored()
    })
  }
}

