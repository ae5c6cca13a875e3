//! Async HTTP client wrapping the vouch JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};
use vouch_core::{
  command::Command,
  event::{Caller, MessageEvent},
  intent::Intent,
  request::{DecisionEvent, Status, VerificationRequest},
};
use vouch_moderation::Reply;

/// Connection settings and the identity decisions are made under.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url:  String,
  pub username:  String,
  pub password:  String,
  pub moderator: String,
  pub roles:     Vec<String>,
  pub prefix:    String,
}

/// Response of the text-command surface.
#[derive(Debug, Deserialize)]
pub struct Outcome {
  pub reply:   Reply,
  #[serde(default)]
  pub intents: Vec<Intent>,
}

#[derive(Deserialize)]
struct ErrorBody {
  error:   String,
  message: String,
}

/// Async HTTP client for the vouch moderation API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `GET /api/requests[?status=<status>]`
  pub async fn queue(&self, status: Option<Status>) -> Result<Vec<VerificationRequest>> {
    let mut req = self.auth(self.client.get(self.url("/requests")));
    if let Some(status) = status {
      req = req.query(&[("status", status.as_ref())]);
    }
    let resp = req.send().await.context("GET /requests failed")?;
    decode("GET /requests", resp).await
  }

  /// `GET /api/requests/{id}`
  pub async fn show(&self, id: &str) -> Result<VerificationRequest> {
    let resp = self
      .auth(self.client.get(self.url(&format!("/requests/{id}"))))
      .send()
      .await
      .context("GET /requests/{id} failed")?;
    decode("GET /requests/{id}", resp).await
  }

  /// `GET /api/requests/{id}/history`
  pub async fn history(&self, id: &str) -> Result<Vec<DecisionEvent>> {
    let resp = self
      .auth(self.client.get(self.url(&format!("/requests/{id}/history"))))
      .send()
      .await
      .context("GET /requests/{id}/history failed")?;
    decode("GET /requests/{id}/history", resp).await
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  /// Send `command` through the text-command surface as the configured
  /// moderator.
  pub async fn run(&self, command: &Command) -> Result<Outcome> {
    let content = command.to_text(&self.config.prefix)?;
    let event = MessageEvent {
      caller:     Caller {
        user_id: self.config.moderator.as_str().into(),
        roles:   self.config.roles.clone(),
        bot:     false,
      },
      channel_id: None,
      content,
    };
    tracing::debug!(content = %event.content, "sending command");
    let resp = self
      .auth(self.client.post(self.url("/events/message")))
      .json(&event)
      .send()
      .await
      .context("POST /events/message failed")?;
    decode("POST /events/message", resp).await
  }
}

async fn decode<T: DeserializeOwned>(what: &str, resp: Response) -> Result<T> {
  let status = resp.status();
  if status.is_success() {
    return resp.json().await.with_context(|| format!("deserialising {what}"));
  }
  match resp.json::<ErrorBody>().await {
    Ok(body) => Err(anyhow!("{what} → {status}: {} ({})", body.message, body.error)),
    Err(_) => Err(anyhow!("{what} → {status}")),
  }
}
