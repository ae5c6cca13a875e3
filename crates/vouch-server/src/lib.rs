//! Server wiring for vouch: configuration, adapter auth and the composed
//! axum [`Router`].

pub mod auth;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use vouch_api::{ApiState, Uploads};
use vouch_core::{attempts::AttemptPolicy, store::VerificationStore};
use vouch_moderation::{Authorizer, Dispatcher, Engine, EngineConfig, LinkSigner};

use auth::{AuthConfig, require_auth};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VOUCH_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                       String,
  pub port:                       u16,
  pub store_path:                 PathBuf,
  pub upload_dir:                 PathBuf,
  /// Origin of the web form; links point at `<public_base_url>/verify`.
  pub public_base_url:            String,
  pub link_secret:                String,
  #[serde(default = "default_link_ttl_secs")]
  pub link_ttl_secs:              i64,
  #[serde(default)]
  pub moderator_roles:            Vec<String>,
  #[serde(default = "default_command_prefix")]
  pub command_prefix:             String,
  #[serde(default = "default_control_namespace")]
  pub control_namespace:          String,
  #[serde(default)]
  pub review_channel:             Option<String>,
  #[serde(default = "default_true")]
  pub allow_block_after_approval: bool,
  #[serde(default = "default_true")]
  pub retain_documents:           bool,
  #[serde(default)]
  pub max_attempts:               Option<u32>,
  #[serde(default = "default_max_upload_bytes")]
  pub max_upload_bytes:           usize,
  pub auth_username:              String,
  pub auth_password_hash:         String,
}

fn default_link_ttl_secs() -> i64 { 24 * 60 * 60 }
fn default_command_prefix() -> String { "!".into() }
fn default_control_namespace() -> String { "verify".into() }
fn default_true() -> bool { true }
fn default_max_upload_bytes() -> usize { 8 * 1024 * 1024 }

/// Minimum length of `link_secret`, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("link_secret must be at least {MIN_SECRET_LEN} bytes")]
  WeakSecret,
  #[error("link_ttl_secs must be positive")]
  BadTtl,
  #[error("control_namespace must be non-empty and contain no '_'")]
  BadNamespace,
  #[error("command_prefix must not be empty")]
  EmptyPrefix,
}

impl ServerConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.link_secret.len() < MIN_SECRET_LEN {
      return Err(ConfigError::WeakSecret);
    }
    if self.link_ttl_secs <= 0 {
      return Err(ConfigError::BadTtl);
    }
    if self.control_namespace.is_empty() || self.control_namespace.contains('_') {
      return Err(ConfigError::BadNamespace);
    }
    if self.command_prefix.is_empty() {
      return Err(ConfigError::EmptyPrefix);
    }
    Ok(())
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      allow_block_after_approval: self.allow_block_after_approval,
      retain_documents:           self.retain_documents,
      attempts:                   match self.max_attempts {
        Some(n) => AttemptPolicy::limited(n),
        None => AttemptPolicy::unlimited(),
      },
      control_namespace:          self.control_namespace.clone(),
      default_review_channel:     self.review_channel.clone(),
    }
  }

  pub fn auth_config(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }

  pub fn link_signer(&self) -> Result<LinkSigner, ConfigError> {
    LinkSigner::new(
      self.link_secret.as_bytes(),
      self.public_base_url.clone(),
      chrono::Duration::seconds(self.link_ttl_secs),
    )
    .map_err(|_| ConfigError::WeakSecret)
  }
}

// ─── Application ─────────────────────────────────────────────────────────────

/// Assemble engine, dispatcher and upload storage around `store`.
pub fn app_state<S>(config: &ServerConfig, store: Arc<S>) -> Result<ApiState<S>, ConfigError>
where
  S: VerificationStore,
{
  config.validate()?;
  let links = Arc::new(config.link_signer()?);
  let engine = Arc::new(Engine::new(store, config.engine_config()));
  let dispatcher = Dispatcher::new(
    engine,
    links.clone(),
    Authorizer::new(config.moderator_roles.iter().cloned()),
    config.command_prefix.clone(),
  );
  Ok(ApiState {
    dispatcher: Arc::new(dispatcher),
    links,
    uploads: Arc::new(Uploads::new(config.upload_dir.clone(), config.max_upload_bytes)),
  })
}

/// Build the full router: public submissions, authenticated moderation.
pub fn router<S>(state: ApiState<S>, auth: AuthConfig) -> Router
where
  S: VerificationStore + 'static,
{
  let moderation = vouch_api::moderation_router(state.clone())
    .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth));

  Router::new()
    .nest("/api", vouch_api::submission_router(state).merge(moderation))
    .route("/healthz", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
}
