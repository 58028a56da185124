//! Database connection pool and scoped transactions.
//!
//! `Db` owns the pool for either Postgres or SQLite, picked from the URL
//! scheme. Every queue operation runs through a [`Session`], a transaction
//! that rolls back when dropped without [`Session::commit`].

pub mod query;

use crate::error::{Error, Result};
use query::{Dialect, Param, Statement};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Database, Encode, Postgres, Row, Sqlite, Transaction, Type};
use std::str::FromStr;
use uuid::Uuid;

/// A row of a queue table, as returned by claim and read statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub sequence_id: i64,
    pub message_id: Uuid,
    pub message_body: Vec<u8>,
}

/// Database handle. Owns the connection pool shared by every queue.
#[derive(Debug, Clone)]
pub enum Db {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl Db {
    /// Connect to the database named by `url` and create a connection pool.
    ///
    /// `postgres://` / `postgresql://` select Postgres, `sqlite:` selects
    /// SQLite. A SQLite pool holds a single connection: SQLite admits one
    /// writer at a time and `sqlite::memory:` must share one connection.
    pub async fn connect(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            Ok(Db::Postgres(pool))
        } else if url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?;
            Ok(Db::Sqlite(pool))
        } else {
            Err(Error::Config(format!(
                "unsupported database url scheme: expected postgres:// or sqlite:, got '{}'",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            Db::Postgres(_) => Dialect::Postgres,
            Db::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Simple health check — run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        match self {
            Db::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            Db::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Open a connection and begin a transaction on it.
    pub async fn begin(&self) -> Result<Session> {
        match self {
            Db::Postgres(pool) => Ok(Session::Postgres(pool.begin().await?)),
            Db::Sqlite(pool) => Ok(Session::Sqlite(pool.begin().await?)),
        }
    }

    pub async fn close(&self) {
        match self {
            Db::Postgres(pool) => pool.close().await,
            Db::Sqlite(pool) => pool.close().await,
        }
    }
}

/// A scoped connection with an open transaction.
pub enum Session {
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl Session {
    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&mut self, stmt: &Statement) -> sqlx::Result<u64> {
        let done = match self {
            Session::Postgres(tx) => {
                bind_params(sqlx::query::<Postgres>(&stmt.sql), &stmt.params)
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
            }
            Session::Sqlite(tx) => {
                bind_params(sqlx::query::<Sqlite>(&stmt.sql), &stmt.params)
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
            }
        };
        Ok(done)
    }

    /// Run a query that yields at most one queue row.
    pub async fn fetch_record(&mut self, stmt: &Statement) -> sqlx::Result<Option<QueueRecord>> {
        match self {
            Session::Postgres(tx) => {
                let row = bind_params(sqlx::query::<Postgres>(&stmt.sql), &stmt.params)
                    .fetch_optional(&mut **tx)
                    .await?;
                row.as_ref().map(pg_record).transpose()
            }
            Session::Sqlite(tx) => {
                let row = bind_params(sqlx::query::<Sqlite>(&stmt.sql), &stmt.params)
                    .fetch_optional(&mut **tx)
                    .await?;
                row.as_ref().map(sqlite_record).transpose()
            }
        }
    }

    /// Run a query whose first column of its single row is an integer.
    pub async fn fetch_scalar(&mut self, stmt: &Statement) -> sqlx::Result<i64> {
        match self {
            Session::Postgres(tx) => {
                let row = bind_params(sqlx::query::<Postgres>(&stmt.sql), &stmt.params)
                    .fetch_one(&mut **tx)
                    .await?;
                row.try_get(0)
            }
            Session::Sqlite(tx) => {
                let row = bind_params(sqlx::query::<Sqlite>(&stmt.sql), &stmt.params)
                    .fetch_one(&mut **tx)
                    .await?;
                row.try_get(0)
            }
        }
    }

    pub async fn commit(self) -> sqlx::Result<()> {
        match self {
            Session::Postgres(tx) => tx.commit().await,
            Session::Sqlite(tx) => tx.commit().await,
        }
    }
}

fn bind_params<'q, DB>(
    mut query: sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &'q [Param],
) -> sqlx::query::Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    i64: Encode<'q, DB> + Type<DB>,
    Uuid: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            Param::Int(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.as_str()),
            Param::Uuid(v) => query.bind(*v),
            Param::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

fn pg_record(row: &PgRow) -> sqlx::Result<QueueRecord> {
    Ok(QueueRecord {
        sequence_id: row.try_get("sequence_id")?,
        message_id: row.try_get("message_id")?,
        message_body: row.try_get("message_body")?,
    })
}

fn sqlite_record(row: &SqliteRow) -> sqlx::Result<QueueRecord> {
    Ok(QueueRecord {
        sequence_id: row.try_get("sequence_id")?,
        message_id: row.try_get("message_id")?,
        message_body: row.try_get("message_body")?,
    })
}
