//! [`SqliteStore`]: the SQLite implementation of [`VerificationStore`].

use std::{path::Path, time::Duration};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use vouch_core::{
  request::{
    Action, BlockRequest, Change, Decided, DecisionEvent, NewSubmission,
    ReviewState, Status, Submission, SubmissionOutcome, Transition, UserId,
    VerificationRequest,
  },
  store::VerificationStore,
};

use crate::{
  encode::{
    RawDecision, RawRequest, SELECT_REQUEST, decode_documents, encode_documents,
    encode_dt, encode_status,
  },
  schema::SCHEMA,
  Error, Result,
};

/// How long a writer waits on another process holding the write lock before
/// the operation fails as unavailable.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REVIEW_CHANNEL_KEY: &str = "review_channel";

// ─── Transaction outcomes ────────────────────────────────────────────────────

/// Why a transaction wrote nothing. Turned into a domain error outside the
/// database thread.
enum Rejection {
  NotFound,
  Blocked,
  /// `action` is not allowed on an approved request.
  Approved(Action),
}

enum Txn<T> {
  Done(T),
  Rejected(Rejection),
}

fn reject(id: UserId, rejection: Rejection) -> Error {
  let core = match rejection {
    Rejection::NotFound => vouch_core::Error::NotFound(id),
    Rejection::Blocked => vouch_core::Error::Blocked(id),
    Rejection::Approved(action) => vouch_core::Error::InvalidTransition {
      requester_id: id,
      from: ReviewState::Approved,
      action,
    },
  };
  Error::Core(core)
}

/// A decision transaction's result: the reloaded row, plus the encoded
/// documents it dropped.
type RawDecided = (RawRequest, Option<String>);

fn decode_change(change: Change<RawDecided>) -> Result<Change<Decided>> {
  let decode = |(raw, dropped): RawDecided| -> Result<Decided> {
    Ok(Decided {
      request:             raw.into_request()?,
      discarded_documents: dropped
        .as_deref()
        .map(decode_documents)
        .transpose()?
        .unwrap_or_default(),
    })
  };
  Ok(match change {
    Change::Applied(raw) => Change::Applied(decode(raw)?),
    Change::Unchanged(raw) => Change::Unchanged(decode(raw)?),
  })
}

// ─── Row helpers (run on the database thread) ────────────────────────────────

fn load(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<RawRequest>> {
  conn
    .query_row(
      &format!("{SELECT_REQUEST} WHERE v.requester_id = ?1"),
      rusqlite::params![id],
      RawRequest::from_row,
    )
    .optional()
}

/// Like [`load`] for a row the current transaction knows exists.
fn reload(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<RawRequest> {
  load(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

fn is_blocked(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM blocked_users WHERE requester_id = ?1",
        rusqlite::params![id],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

fn stamp_processed(
  conn: &rusqlite::Connection,
  id: &str,
  to: Status,
  moderator: &str,
  at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE verifications
     SET status = ?2, processed_at = ?3, processed_by = ?4
     WHERE requester_id = ?1",
    rusqlite::params![id, encode_status(to), at, moderator],
  )?;
  Ok(())
}

/// Clear the document references of a row, returning the old encoding.
fn drop_documents(conn: &rusqlite::Connection, current: &RawRequest) -> rusqlite::Result<String> {
  conn.execute(
    "UPDATE verifications SET documents = '[]' WHERE requester_id = ?1",
    rusqlite::params![current.requester_id],
  )?;
  Ok(current.documents.clone())
}

fn append_decision(
  conn: &rusqlite::Connection,
  id: &str,
  action: Action,
  moderator: &str,
  reason: Option<&str>,
  at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO decisions (event_id, requester_id, action, moderator, reason, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      Uuid::new_v4().hyphenated().to_string(),
      id,
      action.as_ref(),
      moderator,
      reason,
      at,
    ],
  )?;
  Ok(())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A vouch verification store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted, and all
/// clones share its single database thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened verification store");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection, flushing the WAL.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    tracing::debug!("closed verification store");
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── VerificationStore impl ──────────────────────────────────────────────────

impl VerificationStore for SqliteStore {
  type Error = Error;

  // ── Submissions ───────────────────────────────────────────────────────────

  async fn upsert_submission(&self, input: NewSubmission) -> Result<Submission> {
    let id_str   = input.requester_id.as_str().to_owned();
    let docs_str = encode_documents(&input.documents)?;
    let now_str  = encode_dt(Utc::now());
    let NewSubmission { display_name, birthdate, .. } = input;

    let txn = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if is_blocked(&tx, &id_str)? {
          return Ok(Txn::Rejected(Rejection::Blocked));
        }

        let current: Option<(String, String)> = tx
          .query_row(
            "SELECT status, documents FROM verifications WHERE requester_id = ?1",
            rusqlite::params![id_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let (outcome, replaced) = match current {
          None => {
            tx.execute(
              "INSERT INTO verifications
                 (requester_id, display_name, birthdate, status, attempts,
                  submitted_at, documents)
               VALUES (?1, ?2, ?3, 'pending', 1, ?4, ?5)",
              rusqlite::params![id_str, display_name, birthdate, now_str, docs_str],
            )?;
            (SubmissionOutcome::Created, None)
          }
          Some((status, _)) if status == encode_status(Status::Approved) => {
            (SubmissionOutcome::AlreadyApproved, None)
          }
          Some((_, old_docs)) => {
            tx.execute(
              "UPDATE verifications
               SET display_name = ?2, birthdate = ?3, documents = ?4,
                   submitted_at = ?5, attempts = attempts + 1,
                   status = 'pending', processed_at = NULL, processed_by = NULL
               WHERE requester_id = ?1",
              rusqlite::params![id_str, display_name, birthdate, docs_str, now_str],
            )?;
            (SubmissionOutcome::Resubmitted, Some(old_docs))
          }
        };

        let raw = reload(&tx, &id_str)?;
        tx.commit()?;
        Ok(Txn::Done((outcome, raw, replaced)))
      })
      .await?;

    match txn {
      Txn::Done((outcome, raw, replaced)) => Ok(Submission {
        outcome,
        request: raw.into_request()?,
        replaced_documents: replaced
          .as_deref()
          .map(decode_documents)
          .transpose()?
          .unwrap_or_default(),
      }),
      Txn::Rejected(r) => Err(reject(input.requester_id, r)),
    }
  }

  async fn record_attempt(&self, id: UserId) -> Result<Option<u32>> {
    let id_str = id.into_inner();
    let attempts = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "UPDATE verifications SET attempts = attempts + 1
               WHERE requester_id = ?1
               RETURNING attempts",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(attempts)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get(&self, id: UserId) -> Result<Option<VerificationRequest>> {
    let id_str = id.into_inner();
    let raw = self
      .conn
      .call(move |conn| Ok(load(conn, &id_str)?))
      .await?;
    raw.map(RawRequest::into_request).transpose()
  }

  async fn list(&self, status: Option<Status>) -> Result<Vec<VerificationRequest>> {
    let status_str = status.map(encode_status);

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{SELECT_REQUEST}
           WHERE ?1 IS NULL OR v.status = ?1
           ORDER BY v.submitted_at, v.requester_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], RawRequest::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  async fn is_blocked(&self, id: UserId) -> Result<bool> {
    let id_str = id.into_inner();
    Ok(
      self
        .conn
        .call(move |conn| Ok(is_blocked(conn, &id_str)?))
        .await?,
    )
  }

  async fn history(&self, id: UserId) -> Result<Vec<DecisionEvent>> {
    let id_str = id.into_inner();

    let raws: Vec<RawDecision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, requester_id, action, moderator, reason, recorded_at
           FROM decisions
           WHERE requester_id = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawDecision {
              event_id:     row.get(0)?,
              requester_id: row.get(1)?,
              action:       row.get(2)?,
              moderator:    row.get(3)?,
              reason:       row.get(4)?,
              recorded_at:  row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDecision::into_event).collect()
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  async fn set_status(&self, input: Transition) -> Result<Change<Decided>> {
    let id_str  = input.requester_id.as_str().to_owned();
    let mod_str = input.moderator.as_str().to_owned();
    let now_str = encode_dt(Utc::now());
    let Transition { from, to, reason, discard_documents, .. } = input;
    let action  = match to {
      Status::Approved => Some(Action::Approve),
      Status::Denied => Some(Action::Deny),
      Status::Pending => None,
    };

    let txn = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = load(&tx, &id_str)? else {
          return Ok(Txn::Rejected(Rejection::NotFound));
        };
        if current.status != encode_status(from) {
          return Ok(Txn::Done(Change::Unchanged((current, None))));
        }

        if to == Status::Pending {
          tx.execute(
            "UPDATE verifications
             SET status = 'pending', processed_at = NULL, processed_by = NULL
             WHERE requester_id = ?1",
            rusqlite::params![id_str],
          )?;
        } else {
          stamp_processed(&tx, &id_str, to, &mod_str, &now_str)?;
        }
        if let Some(action) = action {
          append_decision(&tx, &id_str, action, &mod_str, reason.as_deref(), &now_str)?;
        }
        let dropped = if discard_documents {
          Some(drop_documents(&tx, &current)?)
        } else {
          None
        };

        let raw = reload(&tx, &id_str)?;
        tx.commit()?;
        Ok(Txn::Done(Change::Applied((raw, dropped))))
      })
      .await?;

    match txn {
      Txn::Done(change) => decode_change(change),
      Txn::Rejected(r) => Err(reject(input.requester_id, r)),
    }
  }

  async fn block(&self, input: BlockRequest) -> Result<Change<Decided>> {
    let id_str   = input.requester_id.as_str().to_owned();
    let mod_str  = input.moderator.as_str().to_owned();
    let reason   = input.reason.clone();
    let override_approval = input.override_approval;
    let discard_documents = input.discard_documents;
    let now_str  = encode_dt(Utc::now());

    let txn = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = load(&tx, &id_str)? else {
          return Ok(Txn::Rejected(Rejection::NotFound));
        };
        if current.blocked_by.is_some() {
          return Ok(Txn::Done(Change::Unchanged((current, None))));
        }
        if current.status == encode_status(Status::Approved) && !override_approval {
          return Ok(Txn::Rejected(Rejection::Approved(Action::Block)));
        }

        stamp_processed(&tx, &id_str, Status::Denied, &mod_str, &now_str)?;
        tx.execute(
          "INSERT OR REPLACE INTO blocked_users (requester_id, reason, blocked_by, blocked_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, reason, mod_str, now_str],
        )?;
        append_decision(&tx, &id_str, Action::Block, &mod_str, reason.as_deref(), &now_str)?;
        let dropped = if discard_documents {
          Some(drop_documents(&tx, &current)?)
        } else {
          None
        };

        let raw = reload(&tx, &id_str)?;
        tx.commit()?;
        Ok(Txn::Done(Change::Applied((raw, dropped))))
      })
      .await?;

    match txn {
      Txn::Done(change) => decode_change(change),
      Txn::Rejected(r) => Err(reject(input.requester_id, r)),
    }
  }

  async fn unblock(
    &self,
    id:        UserId,
    moderator: UserId,
  ) -> Result<Change<VerificationRequest>> {
    let id_str  = id.as_str().to_owned();
    let mod_str = moderator.into_inner();
    let now_str = encode_dt(Utc::now());

    let txn = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = load(&tx, &id_str)? else {
          return Ok(Txn::Rejected(Rejection::NotFound));
        };
        if current.blocked_by.is_none() {
          return Ok(Txn::Done(Change::Unchanged(current)));
        }

        tx.execute(
          "DELETE FROM blocked_users WHERE requester_id = ?1",
          rusqlite::params![id_str],
        )?;
        append_decision(&tx, &id_str, Action::Unblock, &mod_str, None, &now_str)?;

        let raw = reload(&tx, &id_str)?;
        tx.commit()?;
        Ok(Txn::Done(Change::Applied(raw)))
      })
      .await?;

    match txn {
      Txn::Done(change) => Ok(match change {
        Change::Applied(raw) => Change::Applied(raw.into_request()?),
        Change::Unchanged(raw) => Change::Unchanged(raw.into_request()?),
      }),
      Txn::Rejected(r) => Err(reject(id, r)),
    }
  }

  // ── Settings ──────────────────────────────────────────────────────────────

  async fn set_review_channel(&self, channel_id: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO settings (key, value) VALUES (?1, ?2)
           ON CONFLICT (key) DO UPDATE SET value = excluded.value",
          rusqlite::params![REVIEW_CHANNEL_KEY, channel_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn review_channel(&self) -> Result<Option<String>> {
    Ok(
      self
        .conn
        .call(|conn| {
          Ok(
            conn
              .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                rusqlite::params![REVIEW_CHANNEL_KEY],
                |row| row.get(0),
              )
              .optional()?,
          )
        })
        .await?,
    )
  }
}
