//! Queue addresses of the form `sql://<connection>/<queue>`.

use crate::db::query::validate_identifier;
use crate::error::{Error, Result};
use std::str::FromStr;

pub const SCHEME: &str = "sql";

/// A parsed queue address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueUri {
    raw: String,
    connection: String,
    queue: String,
}

impl QueueUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || {
            Error::Config(format!(
                "invalid queue uri '{raw}': expected {SCHEME}://{{connection-name}}/{{queue-name}}"
            ))
        };

        let (scheme, rest) = raw.split_once("://").ok_or_else(malformed)?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(Error::Config(format!(
                "invalid queue uri '{raw}': scheme must be '{SCHEME}', got '{scheme}'"
            )));
        }

        let (connection, queue) = rest.split_once('/').ok_or_else(malformed)?;
        let queue = queue.strip_suffix('/').unwrap_or(queue);
        if connection.is_empty() || queue.is_empty() || queue.contains('/') {
            return Err(malformed());
        }
        validate_identifier("queue", queue)?;

        Ok(Self {
            raw: raw.to_string(),
            connection: connection.to_string(),
            queue: queue.to_string(),
        })
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl FromStr for QueueUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for QueueUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
