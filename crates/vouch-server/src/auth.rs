//! HTTP Basic auth for the gateway adapter and the CLI.
//!
//! Only one credential exists: the process that relays platform events.
//! Moderator identity travels inside each event and is checked by the
//! dispatcher, not here.

use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  Json,
  extract::{Request, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde_json::json;
use thiserror::Error;

/// Credentials accepted as valid for this server instance.
#[derive(Clone)]
pub struct AuthConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

#[derive(Debug, Error)]
#[error("adapter credentials missing or invalid")]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
  fn into_response(self) -> Response {
    let body = json!({ "error": "unauthenticated", "message": self.to_string() });
    let mut res = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    res.headers_mut().insert(
      header::WWW_AUTHENTICATE,
      HeaderValue::from_static("Basic realm=\"vouch\""),
    );
    res
  }
}

/// Verify credentials directly from headers.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<(), Unauthenticated> {
  let encoded = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Basic "))
    .ok_or(Unauthenticated)?;

  let decoded = B64.decode(encoded).map_err(|_| Unauthenticated)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| Unauthenticated)?;
  let (username, password) = creds.split_once(':').ok_or(Unauthenticated)?;

  if username != config.username {
    return Err(Unauthenticated);
  }

  let parsed_hash = PasswordHash::new(&config.password_hash).map_err(|_| Unauthenticated)?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| Unauthenticated)
}

/// Middleware guarding the moderation routes.
pub async fn require_auth(
  State(auth): State<Arc<AuthConfig>>,
  req: Request,
  next: Next,
) -> Result<Response, Unauthenticated> {
  if let Err(e) = verify_auth(req.headers(), &auth) {
    tracing::warn!(path = %req.uri().path(), "rejected unauthenticated request");
    return Err(e);
  }
  Ok(next.run(req).await)
}
