//! Signed, expiring verification links.
//!
//! A requester never types their own id into the web form. The bot sends
//! them a link whose token is `<requester_id>.<expires_unix>.<hex mac>`,
//! with an HMAC-SHA256 over the first two parts; the submission endpoint
//! derives the requester from that token alone.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;
use vouch_core::{Error, Result, UserId};

type HmacSha256 = Hmac<Sha256>;

/// A requester identity recovered from a valid link token.
#[derive(Debug, Clone)]
pub struct VerifiedRequester {
  id: UserId,
}

impl VerifiedRequester {
  pub fn id(&self) -> &UserId { &self.id }
}

#[derive(Clone)]
pub struct LinkSigner {
  mac:      HmacSha256,
  base_url: String,
  ttl:      Duration,
}

impl LinkSigner {
  pub fn new(
    secret: &[u8],
    base_url: impl Into<String>,
    ttl: Duration,
  ) -> std::result::Result<Self, InvalidLength> {
    Ok(Self {
      mac:      HmacSha256::new_from_slice(secret)?,
      base_url: base_url.into(),
      ttl,
    })
  }

  fn signature(&self, payload: &str) -> HmacSha256 {
    let mut mac = self.mac.clone();
    mac.update(payload.as_bytes());
    mac
  }

  pub fn token(&self, requester: &UserId, now: DateTime<Utc>) -> String {
    let payload = format!("{requester}.{}", (now + self.ttl).timestamp());
    let sig = self.signature(&payload).finalize().into_bytes();
    format!("{payload}.{}", hex::encode(sig))
  }

  /// The full URL the requester should open.
  pub fn link(&self, requester: &UserId, now: DateTime<Utc>) -> String {
    format!(
      "{}/verify?token={}",
      self.base_url.trim_end_matches('/'),
      self.token(requester, now)
    )
  }

  pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedRequester> {
    let malformed = || Error::InvalidToken("malformed token".into());

    let (payload, sig_hex) = token.rsplit_once('.').ok_or_else(malformed)?;
    let (id, expires) = payload.rsplit_once('.').ok_or_else(malformed)?;
    let expires: i64 = expires.parse().map_err(|_| malformed())?;
    let sig = hex::decode(sig_hex).map_err(|_| malformed())?;

    self
      .signature(payload)
      .verify_slice(&sig)
      .map_err(|_| Error::InvalidToken("signature mismatch".into()))?;

    if id.is_empty() {
      return Err(malformed());
    }
    if now.timestamp() > expires {
      return Err(Error::InvalidToken("link expired".into()));
    }
    Ok(VerifiedRequester { id: UserId::new(id) })
  }
}
