//! Parsing of the two decision surfaces: prefixed text commands and
//! interactive-control tokens.
//!
//! Parsing is pure. Whether the caller may run the result is decided by the
//! dispatcher.

use std::str::FromStr;

use crate::{
  Error, Result,
  request::{Action, UserId},
};

pub const DEFAULT_DENY_REASON: &str = "No reason provided.";

// ─── Text commands ───────────────────────────────────────────────────────────

/// A recognised text command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// A requester asks for their own verification link.
  Verify,
  Approve(UserId),
  Deny {
    requester_id: UserId,
    block:        bool,
    reason:       Option<String>,
  },
  Unblock(UserId),
  /// Make the current channel the review channel.
  SetModChannel,
}

impl Command {
  /// Parse `content` as a command with the given prefix.
  ///
  /// Returns `Ok(None)` for anything that is not one of our commands, so the
  /// caller can ignore ordinary chatter. A recognised command with a missing
  /// target fails with [`Error::InvalidCommand`].
  pub fn parse(prefix: &str, content: &str) -> Result<Option<Self>> {
    let Some(body) = content.trim().strip_prefix(prefix) else {
      return Ok(None);
    };
    let mut args = body.split_whitespace();
    let Some(name) = args.next() else {
      return Ok(None);
    };

    let command = match name.to_lowercase().as_str() {
      "verify" => Self::Verify,
      "approve" => Self::Approve(target(prefix, "approve", args.next())?),
      "deny" => {
        let requester_id = target(prefix, "deny", args.next())?;
        let rest: Vec<&str> = args.collect();
        let (block, rest) = match rest.split_first() {
          Some((first, tail)) if first.eq_ignore_ascii_case("block") => (true, tail),
          _ => (false, rest.as_slice()),
        };
        let reason = (!rest.is_empty()).then(|| rest.join(" "));
        Self::Deny { requester_id, block, reason }
      }
      "unblock" => Self::Unblock(target(prefix, "unblock", args.next())?),
      "setmodchannel" => Self::SetModChannel,
      _ => return Ok(None),
    };
    Ok(Some(command))
  }

  /// Whether running this command requires a moderator capability.
  pub fn is_moderation(&self) -> bool { !matches!(self, Self::Verify) }

  /// Render back to command text; used by clients that drive the text
  /// surface programmatically.
  ///
  /// A plain deny whose reason starts with the word `block` has no text
  /// form: it would read back as a block, so it fails with
  /// [`Error::InvalidCommand`].
  pub fn to_text(&self, prefix: &str) -> Result<String> {
    let text = match self {
      Self::Verify => format!("{prefix}verify"),
      Self::Approve(id) => format!("{prefix}approve {id}"),
      Self::Deny { requester_id, block, reason } => {
        let mut text = format!("{prefix}deny {requester_id}");
        if *block {
          text.push_str(" block");
        }
        if let Some(reason) = reason {
          let leads_with_block = reason
            .split_whitespace()
            .next()
            .is_some_and(|word| word.eq_ignore_ascii_case("block"));
          if leads_with_block && !*block {
            return Err(Error::InvalidCommand(format!(
              "a deny reason may not start with \"block\" (it would block {requester_id})"
            )));
          }
          text.push(' ');
          text.push_str(reason);
        }
        text
      }
      Self::Unblock(id) => format!("{prefix}unblock {id}"),
      Self::SetModChannel => format!("{prefix}setmodchannel"),
    };
    Ok(text)
  }
}

fn target(prefix: &str, name: &str, arg: Option<&str>) -> Result<UserId> {
  arg
    .and_then(parse_user_ref)
    .ok_or_else(|| Error::InvalidCommand(format!("usage: {prefix}{name} <user id>")))
}

/// Accept a bare id or a platform mention (`<@id>` / `<@!id>`).
pub fn parse_user_ref(s: &str) -> Option<UserId> {
  let id = s
    .strip_prefix("<@")
    .and_then(|rest| rest.strip_suffix('>'))
    .map(|rest| rest.strip_prefix('!').unwrap_or(rest))
    .unwrap_or(s);
  (!id.is_empty() && !id.contains(['<', '>', '@'])).then(|| UserId::new(id))
}

// ─── Control tokens ──────────────────────────────────────────────────────────

/// The composite identifier of an interactive control:
/// `<namespace>_<action>_<requester_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlToken {
  pub action:       Action,
  pub requester_id: UserId,
}

impl ControlToken {
  /// Actions a control may carry. Unblocking is text-only.
  pub const ACTIONS: [Action; 3] = [Action::Approve, Action::Deny, Action::Block];

  pub fn new(action: Action, requester_id: UserId) -> Self { Self { action, requester_id } }

  pub fn encode(&self, namespace: &str) -> String {
    format!("{namespace}_{}_{}", self.action, self.requester_id)
  }

  /// Parse a control id, validating namespace and action.
  pub fn parse(namespace: &str, custom_id: &str) -> Result<Self> {
    let invalid = || Error::InvalidCommand(format!("unrecognised control {custom_id:?}"));

    let rest = custom_id
      .strip_prefix(namespace)
      .and_then(|rest| rest.strip_prefix('_'))
      .ok_or_else(invalid)?;
    let (action, requester_id) = rest.split_once('_').ok_or_else(invalid)?;

    let action = Action::from_str(action).map_err(|_| invalid())?;
    if !Self::ACTIONS.contains(&action) || requester_id.is_empty() {
      return Err(invalid());
    }
    Ok(Self::new(action, UserId::new(requester_id)))
  }

  /// The full set of control ids to attach to a review message.
  pub fn controls_for(namespace: &str, requester_id: &UserId) -> Vec<String> {
    Self::ACTIONS
      .iter()
      .map(|action| Self::new(*action, requester_id.clone()).encode(namespace))
      .collect()
  }
}
