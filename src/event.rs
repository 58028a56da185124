//! Structured notifications emitted by a queue on every protocol step.
//!
//! Consumers subscribe to a queue's event stream to build dashboards,
//! audit logs or test assertions. The queue never waits on subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A structured event emitted by a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Monotonic per-queue sequence number. Consumers can detect gaps.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// Name of the queue that emitted it.
    pub queue: String,
    /// What happened.
    pub kind: QueueEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEventKind {
    Enqueued {
        message_id: Uuid,
        sequence_id: i64,
    },
    Received {
        message_id: Uuid,
        claim_token: i64,
    },
    Acknowledged {
        claim_token: i64,
    },
    Released {
        claim_token: i64,
        /// Sequence id of the requeued row; `None` when the row was gone.
        requeued_as: Option<i64>,
    },
    Cancelled {
        operation: String,
    },
}
