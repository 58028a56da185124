//! # sqlq
//!
//! Durable message queue on a relational table (Postgres or SQLite).
//!
//! Messages are claimed atomically (oldest first, one claimant per row),
//! then acknowledged (deleted) or released (moved to the tail). Claims
//! left behind by a crashed process are recovered when a queue with the
//! same fingerprint next starts.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod queue;
pub mod telemetry;

pub use crate::db::Db;
pub use crate::error::{Error, Result};
pub use crate::event::{QueueEvent, QueueEventKind};
pub use crate::queue::{ClaimToken, ClaimedMessage, Fingerprint, QueueOptions, SqlQueue};
