//! SQLite backend for the vouch verification store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every mutating operation is a single
//! `BEGIN IMMEDIATE` transaction, which also serialises writers from other
//! processes sharing the same database file.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
