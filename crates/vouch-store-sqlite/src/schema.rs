//! SQL schema for the vouch SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per requester, updated in place.
CREATE TABLE IF NOT EXISTS verifications (
    requester_id  TEXT PRIMARY KEY,
    display_name  TEXT NOT NULL,
    birthdate     TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'approved', 'denied')),
    attempts      INTEGER NOT NULL DEFAULT 1 CHECK (attempts >= 1),
    submitted_at  TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    processed_at  TEXT,
    processed_by  TEXT,
    documents     TEXT NOT NULL DEFAULT '[]',   -- JSON array of PayloadRef
    CHECK ((status = 'pending') = (processed_at IS NULL)),
    CHECK ((processed_at IS NULL) = (processed_by IS NULL))
);

-- Presence of a row bars the requester from submitting.
CREATE TABLE IF NOT EXISTS blocked_users (
    requester_id TEXT PRIMARY KEY REFERENCES verifications(requester_id),
    reason       TEXT,
    blocked_by   TEXT NOT NULL,
    blocked_at   TEXT NOT NULL
);

-- Applied moderation decisions. Append-only.
CREATE TABLE IF NOT EXISTS decisions (
    event_id     TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL REFERENCES verifications(requester_id),
    action       TEXT NOT NULL,   -- 'approve' | 'deny' | 'block' | 'unblock'
    moderator    TEXT NOT NULL,
    reason       TEXT,
    recorded_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS verifications_status_idx ON verifications(status, submitted_at);
CREATE INDEX IF NOT EXISTS decisions_requester_idx  ON decisions(requester_id);

PRAGMA user_version = 1;
";
