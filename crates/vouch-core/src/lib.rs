//! Core types and trait definitions for the vouch verification workflow.
//!
//! This crate has no HTTP or database dependencies. It defines
//! what a verification request is, the store abstraction that owns
//! it, and the pure parsing of inbound moderation events.

pub mod attempts;
pub mod command;
pub mod error;
pub mod event;
pub mod intent;
pub mod request;
pub mod store;

pub use error::{Error, Result};
pub use request::UserId;
