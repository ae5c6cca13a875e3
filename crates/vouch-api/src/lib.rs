//! JSON API for vouch.
//!
//! Two routers over any [`VerificationStore`]:
//!
//! - [`submission_router`] is public. Requesters post their form there, and
//!   their identity comes from the signed link token in the body.
//! - [`moderation_router`] carries the decision surfaces and the moderator
//!   reads. It expects the embedding server to authenticate the adapter.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new().nest(
//!   "/api",
//!   vouch_api::submission_router(state.clone())
//!     .merge(vouch_api::moderation_router(state).layer(auth)),
//! )
//! ```

pub mod error;
pub mod events;
pub mod requests;
pub mod submissions;
pub mod uploads;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use vouch_core::store::VerificationStore;
use vouch_moderation::{Dispatcher, Engine, LinkSigner};

pub use error::ApiError;
pub use uploads::Uploads;

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub dispatcher: Arc<Dispatcher<S>>,
  pub links:      Arc<LinkSigner>,
  pub uploads:    Arc<Uploads>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      dispatcher: self.dispatcher.clone(),
      links:      self.links.clone(),
      uploads:    self.uploads.clone(),
    }
  }
}

impl<S: VerificationStore> ApiState<S> {
  pub fn engine(&self) -> &Engine<S> { self.dispatcher.engine() }
}

// ─── Routers ─────────────────────────────────────────────────────────────────

/// `POST /submissions`.
pub fn submission_router<S>(state: ApiState<S>) -> Router<()>
where
  S: VerificationStore + 'static,
{
  // Two base64 images plus the form fields.
  let body_limit = state.uploads.max_bytes() / 3 * 4 * 2 + 64 * 1024;
  Router::new()
    .route("/submissions", post(submissions::create::<S>))
    .layer(DefaultBodyLimit::max(body_limit))
    .with_state(state)
}

/// Moderator reads and the two decision surfaces.
pub fn moderation_router<S>(state: ApiState<S>) -> Router<()>
where
  S: VerificationStore + 'static,
{
  Router::new()
    .route("/requests", get(requests::list::<S>))
    .route("/requests/{id}", get(requests::get_one::<S>))
    .route("/requests/{id}/history", get(requests::history::<S>))
    .route("/events/message", post(events::message::<S>))
    .route("/events/interaction", post(events::interaction::<S>))
    .with_state(state)
}
