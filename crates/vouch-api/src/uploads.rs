//! On-disk storage for submitted images.
//!
//! Images arrive as base64 (bare or as a `data:` URL), are checked against
//! the size limit and sniffed for a known image format, then written under
//! `<upload_dir>/<requester>/<kind>-<sha256>.<ext>`. The database only ever
//! sees the resulting [`PayloadRef`].

use std::path::PathBuf;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use sha2::{Digest, Sha256};
use vouch_core::{
  UserId,
  request::{DocumentKind, PayloadRef},
};

use crate::error::ApiError;

const FORMATS: &[(&[u8], &str, &str)] = &[
  (b"\x89PNG\r\n\x1a\n", "image/png", "png"),
  (b"\xff\xd8\xff", "image/jpeg", "jpg"),
  (b"GIF87a", "image/gif", "gif"),
  (b"GIF89a", "image/gif", "gif"),
  (b"RIFF", "image/webp", "webp"),
];

#[derive(Debug, Clone)]
pub struct Uploads {
  dir:       PathBuf,
  max_bytes: usize,
}

impl Uploads {
  pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
    Self { dir: dir.into(), max_bytes }
  }

  pub fn max_bytes(&self) -> usize { self.max_bytes }

  /// Decode, validate and persist one image.
  pub async fn save(
    &self,
    requester: &UserId,
    kind: DocumentKind,
    encoded: &str,
  ) -> Result<PayloadRef, ApiError> {
    let bytes = decode(encoded).map_err(|m| invalid(kind, m))?;
    if bytes.len() > self.max_bytes {
      return Err(ApiError::TooLarge(format!(
        "{kind} is {} bytes, limit is {}",
        bytes.len(),
        self.max_bytes
      )));
    }
    let (media_type, ext) =
      sniff(&bytes).ok_or_else(|| invalid(kind, "unsupported image format"))?;

    let content_hash = hex::encode(Sha256::digest(&bytes));
    let rel = format!("{}/{kind}-{content_hash}.{ext}", folder(requester));
    let path = self.dir.join(&rel);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(ApiError::Upload)?;
    }
    tokio::fs::write(&path, &bytes).await.map_err(ApiError::Upload)?;
    tracing::debug!(requester_id = %requester, %kind, path = %path.display(), "stored upload");

    Ok(PayloadRef {
      kind,
      path: rel,
      content_hash,
      media_type: media_type.to_owned(),
    })
  }

  /// Delete files no request references any more. `keep` wins over
  /// `docs`, so a resubmission of an identical image is not removed.
  pub async fn remove(&self, docs: &[PayloadRef], keep: &[PayloadRef]) {
    for doc in docs {
      if keep.iter().any(|k| k.path == doc.path) {
        continue;
      }
      let path = self.dir.join(&doc.path);
      match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove upload"),
      }
    }
  }
}

fn invalid(kind: DocumentKind, msg: &str) -> ApiError {
  vouch_core::Error::InvalidSubmission(format!("{kind}: {msg}")).into()
}

fn decode(encoded: &str) -> Result<Vec<u8>, &'static str> {
  let data = match encoded.trim().strip_prefix("data:") {
    Some(rest) => {
      let (header, data) = rest.split_once(',').ok_or("malformed data url")?;
      if !header.ends_with(";base64") {
        return Err("data url must be base64");
      }
      data
    }
    None => encoded.trim(),
  };
  if data.is_empty() {
    return Err("image is required");
  }
  B64.decode(data).map_err(|_| "invalid base64")
}

fn sniff(bytes: &[u8]) -> Option<(&'static str, &'static str)> {
  FORMATS.iter().find_map(|(magic, media_type, ext)| {
    let webp_ok = *ext != "webp" || bytes.get(8..12) == Some(b"WEBP".as_slice());
    (bytes.starts_with(magic) && webp_ok).then_some((*media_type, *ext))
  })
}

/// A filesystem-safe directory name for a requester id.
fn folder(id: &UserId) -> String {
  let raw = id.as_str();
  if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
    raw.to_owned()
  } else {
    hex::encode(&Sha256::digest(raw.as_bytes())[..12])
  }
}
