//! Per-operation statement templates for a queue table.
//!
//! Identifiers (schema, queue) are validated once and spliced into the SQL
//! text quoted; every row value travels as a bound parameter.

use crate::error::{Error, Result};
use crate::queue::Fingerprint;
use uuid::Uuid;

/// Longest queue or schema name accepted. Leaves room for the index name
/// inside the Postgres 63-byte identifier limit.
pub const MAX_IDENTIFIER_LEN: usize = 48;

/// SQL dialect a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Bytes(Vec<u8>),
}

/// SQL text plus its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

/// Check that `name` is a plain SQL identifier.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start
        || name.len() > MAX_IDENTIFIER_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Config(format!(
            "invalid {kind} name '{name}': expected [A-Za-z_][A-Za-z0-9_]* of at most {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    Ok(())
}

/// Builds the statements for one queue table.
#[derive(Debug, Clone)]
pub struct QueryFactory {
    dialect: Dialect,
    schema: String,
    queue: String,
    table: String,
}

impl QueryFactory {
    /// Validate the names and prepare templates for `schema.queue`.
    ///
    /// SQLite has no schemas; the schema name is validated but not used.
    pub fn new(dialect: Dialect, schema: &str, queue: &str) -> Result<Self> {
        validate_identifier("schema", schema)?;
        validate_identifier("queue", queue)?;

        let table = match dialect {
            Dialect::Postgres => format!(r#""{schema}"."{queue}""#),
            Dialect::Sqlite => format!(r#""{queue}""#),
        };

        Ok(Self {
            dialect,
            schema: schema.to_string(),
            queue: queue.to_string(),
            table,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Qualified, quoted table name as used in the statements.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Statements that create the table and its claim index when absent,
    /// executed in order inside one transaction.
    pub fn create(&self) -> Vec<Statement> {
        let table = &self.table;
        let index = format!(r#""ix_{}_claim_id""#, self.queue);

        match self.dialect {
            Dialect::Postgres => vec![
                // Serializes concurrent creators of any queue in this schema.
                Statement::new("SELECT pg_advisory_xact_lock(hashtext($1))")
                    .bind(Param::Text(self.schema.clone())),
                // CREATE SCHEMA needs the database CREATE privilege even with
                // IF NOT EXISTS, so only issue it for a missing schema.
                Statement::new(format!(
                    r#"DO $$ BEGIN
                        IF NOT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = '{schema}') THEN
                            EXECUTE 'CREATE SCHEMA "{schema}"';
                        END IF;
                    END $$"#,
                    schema = self.schema
                )),
                Statement::new(format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        sequence_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                        message_id UUID NOT NULL,
                        message_body BYTEA NOT NULL,
                        claim_token BYTEA NULL,
                        claimed_at TIMESTAMPTZ NULL,
                        claim_id UUID NULL
                    )"
                )),
                Statement::new(format!(
                    "CREATE INDEX IF NOT EXISTS {index} ON {table} (claim_id)"
                )),
            ],
            Dialect::Sqlite => vec![
                Statement::new(format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
                        message_id BLOB NOT NULL,
                        message_body BLOB NOT NULL,
                        claim_token BLOB NULL,
                        claimed_at TEXT NULL,
                        claim_id BLOB NULL
                    )"
                )),
                Statement::new(format!(
                    "CREATE INDEX IF NOT EXISTS {index} ON {table} (claim_id)"
                )),
            ],
        }
    }

    pub fn drop(&self) -> Statement {
        Statement::new(format!("DROP TABLE IF EXISTS {}", self.table))
    }

    /// Scalar: 1 when the table exists, 0 otherwise.
    pub fn exists(&self) -> Statement {
        match self.dialect {
            Dialect::Postgres => Statement::new(
                "SELECT COUNT(*) FROM pg_catalog.pg_tables \
                 WHERE schemaname::text = $1 AND tablename::text = $2",
            )
            .bind(Param::Text(self.schema.clone()))
            .bind(Param::Text(self.queue.clone())),
            Dialect::Sqlite => Statement::new(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
            )
            .bind(Param::Text(self.queue.clone())),
        }
    }

    pub fn count(&self) -> Statement {
        Statement::new(format!("SELECT COUNT(*) FROM {}", self.table))
    }

    /// Remove every row. Never resets the sequence.
    pub fn purge(&self) -> Statement {
        match self.dialect {
            Dialect::Postgres => Statement::new(format!("TRUNCATE TABLE {}", self.table)),
            Dialect::Sqlite => Statement::new(format!("DELETE FROM {}", self.table)),
        }
    }

    /// Insert a message at the tail, returning its `sequence_id`.
    pub fn enqueue(&self, message_id: Uuid, body: &[u8]) -> Statement {
        Statement::new(format!(
            "INSERT INTO {} (message_id, message_body) VALUES ($1, $2) RETURNING sequence_id",
            self.table
        ))
        .bind(Param::Uuid(message_id))
        .bind(Param::Bytes(body.to_vec()))
    }

    /// Mark the oldest unclaimed row as claimed by `fingerprint` under
    /// `claim_id`. Pair with [`QueryFactory::read_claimed`] in the same
    /// transaction.
    pub fn claim(&self, fingerprint: &Fingerprint, claim_id: Uuid) -> Statement {
        let table = &self.table;
        let candidate = match self.dialect {
            Dialect::Postgres => format!(
                "SELECT sequence_id FROM {table} WHERE claim_token IS NULL \
                 ORDER BY sequence_id LIMIT 1 FOR UPDATE SKIP LOCKED"
            ),
            Dialect::Sqlite => format!(
                "SELECT sequence_id FROM {table} WHERE claim_token IS NULL \
                 ORDER BY sequence_id LIMIT 1"
            ),
        };

        Statement::new(format!(
            "UPDATE {table} SET claim_token = $1, claimed_at = CURRENT_TIMESTAMP, claim_id = $2 \
             WHERE sequence_id = ({candidate})"
        ))
        .bind(Param::Bytes(fingerprint.as_bytes().to_vec()))
        .bind(Param::Uuid(claim_id))
    }

    /// Select the row stamped with `claim_id`.
    pub fn read_claimed(&self, claim_id: Uuid) -> Statement {
        Statement::new(format!(
            "SELECT sequence_id, message_id, message_body FROM {} WHERE claim_id = $1",
            self.table
        ))
        .bind(Param::Uuid(claim_id))
    }

    /// Delete a claimed row. Unclaimed rows are left alone.
    pub fn acknowledge(&self, sequence_id: i64) -> Statement {
        Statement::new(format!(
            "DELETE FROM {} WHERE sequence_id = $1 AND claim_token IS NOT NULL",
            self.table
        ))
        .bind(Param::Int(sequence_id))
    }

    /// Clear the claim fields of every row claimed by `fingerprint`.
    pub fn release_claims(&self, fingerprint: &Fingerprint) -> Statement {
        Statement::new(format!(
            "UPDATE {} SET claim_token = NULL, claimed_at = NULL, claim_id = NULL \
             WHERE claim_token = $1",
            self.table
        ))
        .bind(Param::Bytes(fingerprint.as_bytes().to_vec()))
    }

    /// Select one claimed row by `sequence_id`, locking it where the
    /// engine can.
    pub fn read(&self, sequence_id: i64) -> Statement {
        let lock = match self.dialect {
            Dialect::Postgres => " FOR UPDATE",
            Dialect::Sqlite => "",
        };
        Statement::new(format!(
            "SELECT sequence_id, message_id, message_body FROM {} \
             WHERE sequence_id = $1 AND claim_token IS NOT NULL{lock}",
            self.table
        ))
        .bind(Param::Int(sequence_id))
    }

    pub fn remove(&self, sequence_id: i64) -> Statement {
        Statement::new(format!(
            "DELETE FROM {} WHERE sequence_id = $1",
            self.table
        ))
        .bind(Param::Int(sequence_id))
    }
}
