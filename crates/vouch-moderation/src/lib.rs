//! The moderation workflow on top of a [`vouch_core::store::VerificationStore`].
//!
//! - [`engine::Engine`] enforces the transition rules and decides side-effect
//!   intents.
//! - [`dispatch::Dispatcher`] maps the text-command and control surfaces onto
//!   exactly one engine call per inbound event.
//! - [`capability`] and [`links`] mint the two proofs the engine demands: a
//!   [`capability::Moderator`] for decisions, a
//!   [`links::VerifiedRequester`] for submissions.

pub mod capability;
pub mod dispatch;
pub mod engine;
pub mod links;

pub use capability::{Authorizer, Moderator};
pub use dispatch::{Dispatched, Dispatcher, Reply};
pub use engine::{Decision, Engine, EngineConfig, SubmissionForm, Submitted};
pub use links::{LinkSigner, VerifiedRequester};

#[cfg(test)]
mod tests;
