//! Error types for sqlq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing settings, raised before any database work.
    #[error("configuration error: {0}")]
    Config(String),

    /// The backing table for a queue does not exist.
    #[error("queue table does not exist: {0}")]
    SchemaAbsent(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The operation was abandoned through its cancellation token before
    /// it produced an answer.
    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map a store error to [`Error::SchemaAbsent`] when it reports a
    /// missing table, otherwise wrap it unmodified.
    pub(crate) fn from_store(err: sqlx::Error, table: &str) -> Self {
        let missing = err.as_database_error().is_some_and(|db| {
            db.code().as_deref() == Some("42P01") || db.message().starts_with("no such table")
        });
        if missing {
            Error::SchemaAbsent(table.to_string())
        } else {
            Error::Database(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
