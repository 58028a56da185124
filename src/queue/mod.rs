//! The queue: claim, acknowledge and release over one table.
//!
//! Every operation goes through a per-instance gate (a mutex holding the
//! queue's [`Lifecycle`]). The first operation to pass the gate runs crash
//! recovery: rows still claimed under this queue's [`Fingerprint`] are
//! made claimable again. Other instances' claims are never touched.
//!
//! Concurrency between processes sharing a table is settled by the
//! database: the claim statement locks the row it takes, and release
//! moves a row inside one transaction.

pub mod fingerprint;

pub use fingerprint::Fingerprint;

use crate::config::uri::QueueUri;
use crate::db::query::QueryFactory;
use crate::db::{Db, Session};
use crate::error::{Error, Result};
use crate::event::{QueueEvent, QueueEventKind};
use crate::telemetry::metrics;
use crate::telemetry::queue::{record_outcome, start_queue_span};
use chrono::Utc;
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Default capacity of the notification channel.
const EVENT_CAPACITY: usize = 256;

/// Handle returned by a claim; acknowledges or releases that row.
///
/// The value is the row's sequence id. Zero or negative means "no claim"
/// and makes acknowledge/release a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClaimToken(pub i64);

impl ClaimToken {
    pub fn is_absent(&self) -> bool {
        self.0 <= 0
    }
}

impl std::fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message taken off the queue, pending acknowledge or release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedMessage {
    pub token: ClaimToken,
    pub message_id: Uuid,
    pub body: Vec<u8>,
}

/// Per-queue settings.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Schema holding the table (ignored by SQLite).
    pub schema: String,
    /// Identity stamped on claims and used for crash recovery.
    pub fingerprint: Fingerprint,
    /// Cooperative cancellation for every operation of the queue.
    pub cancellation: CancellationToken,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            fingerprint: Fingerprint::deployment(),
            cancellation: CancellationToken::new(),
        }
    }
}

impl QueueOptions {
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub fn fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Initialization state kept inside the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Ready,
}

/// Outcome of a gated operation body.
enum Step<T> {
    Done(T),
    Cancelled,
}

/// A named, table-backed message queue.
pub struct SqlQueue {
    name: String,
    db: Db,
    queries: QueryFactory,
    fingerprint: Fingerprint,
    cancel: CancellationToken,
    gate: Mutex<Lifecycle>,
    events: broadcast::Sender<QueueEvent>,
    event_seq: AtomicU64,
}

impl SqlQueue {
    /// Build a queue over table `name`. Names are validated here, before
    /// any database work.
    pub fn new(name: &str, db: Db, options: QueueOptions) -> Result<Self> {
        let queries = QueryFactory::new(db.dialect(), &options.schema, name)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            name: name.to_string(),
            db,
            queries,
            fingerprint: options.fingerprint,
            cancel: options.cancellation,
            gate: Mutex::new(Lifecycle::Uninitialized),
            events,
            event_seq: AtomicU64::new(0),
        })
    }

    /// Build a queue from a `sql://<connection>/<queue>` address. The
    /// caller resolves the connection name to `db`.
    pub fn from_uri(uri: &QueueUri, db: Db, options: QueueOptions) -> Result<Self> {
        Self::new(uri.queue(), db, options)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Subscribe to this queue's notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Create the table and its claim index if absent.
    pub async fn create(&self) -> Result<()> {
        self.observe("create", || Ok(()), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let mut session = self.db.begin().await?;
            for stmt in self.queries.create() {
                session.execute(&stmt).await.map_err(self.store_err())?;
            }
            session.commit().await.map_err(self.store_err())?;

            info!(queue = %self.name, dialect = %self.queries.dialect(), "queue table ready");
            Ok(Step::Done(()))
        })
        .await
    }

    /// Drop the table if present.
    pub async fn drop(&self) -> Result<()> {
        self.observe("drop", || Ok(()), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let dropped = async {
                let mut session = self.db.begin().await?;
                session
                    .execute(&self.queries.drop())
                    .await
                    .map_err(self.store_err())?;
                session.commit().await.map_err(self.store_err())
            }
            .await;
            absent_ok(dropped)?;

            info!(queue = %self.name, "queue table dropped");
            Ok(Step::Done(()))
        })
        .await
    }

    /// Remove every message if the table is present.
    pub async fn purge(&self) -> Result<()> {
        self.observe("purge", || Ok(()), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };
            if !self.table_exists().await? {
                return Ok(Step::Done(()));
            }

            let purged = async {
                let mut session = self.db.begin().await?;
                session
                    .execute(&self.queries.purge())
                    .await
                    .map_err(self.store_err())?;
                session.commit().await.map_err(self.store_err())
            }
            .await;
            absent_ok(purged)?;

            info!(queue = %self.name, "queue purged");
            Ok(Step::Done(()))
        })
        .await
    }

    /// Whether the backing table exists.
    pub async fn exists(&self) -> Result<bool> {
        self.observe("exists", || Err(Error::Cancelled), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };
            Ok(Step::Done(self.table_exists().await?))
        })
        .await
    }

    /// Number of rows, claimed or not. An absent table counts as empty.
    pub async fn count(&self) -> Result<i64> {
        self.observe("count", || Err(Error::Cancelled), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };
            Ok(Step::Done(absent_ok(self.row_count().await)?))
        })
        .await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        self.observe("is_empty", || Err(Error::Cancelled), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };
            Ok(Step::Done(absent_ok(self.row_count().await)? == 0))
        })
        .await
    }

    /// Append a message, returning its sequence id. `None` when the
    /// operation was cancelled before anything was written.
    pub async fn enqueue(&self, message_id: Uuid, body: &[u8]) -> Result<Option<i64>> {
        self.observe("enqueue", || Ok(None), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let mut session = self.db.begin().await?;
            let sequence_id = session
                .fetch_scalar(&self.queries.enqueue(message_id, body))
                .await
                .map_err(self.store_err())?;
            session.commit().await.map_err(self.store_err())?;

            debug!(queue = %self.name, %message_id, sequence_id, "enqueued");
            self.emit(QueueEventKind::Enqueued {
                message_id,
                sequence_id,
            });
            Ok(Step::Done(Some(sequence_id)))
        })
        .await
    }

    /// Claim the oldest unclaimed message. `None` when there is none.
    pub async fn claim(&self) -> Result<Option<ClaimedMessage>> {
        self.observe("claim", || Ok(None), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let claim_id = Uuid::new_v4();
            let mut session = self.db.begin().await?;
            let claimed = session
                .execute(&self.queries.claim(&self.fingerprint, claim_id))
                .await
                .map_err(self.store_err())?;
            let record = if claimed == 0 {
                None
            } else {
                session
                    .fetch_record(&self.queries.read_claimed(claim_id))
                    .await
                    .map_err(self.store_err())?
            };
            session.commit().await.map_err(self.store_err())?;

            let Some(record) = record else {
                debug!(queue = %self.name, "no unclaimed message");
                return Ok(Step::Done(None));
            };

            let token = ClaimToken(record.sequence_id);
            debug!(queue = %self.name, message_id = %record.message_id, %token, "claimed");
            self.emit(QueueEventKind::Received {
                message_id: record.message_id,
                claim_token: token.0,
            });
            Ok(Step::Done(Some(ClaimedMessage {
                token,
                message_id: record.message_id,
                body: record.message_body,
            })))
        })
        .await
    }

    /// Permanently remove a claimed message.
    pub async fn acknowledge(&self, token: ClaimToken) -> Result<()> {
        if token.is_absent() {
            return Ok(());
        }

        self.observe("acknowledge", || Ok(()), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let mut session = self.db.begin().await?;
            let removed = session
                .execute(&self.queries.acknowledge(token.0))
                .await
                .map_err(self.store_err())?;
            session.commit().await.map_err(self.store_err())?;

            debug!(queue = %self.name, %token, removed, "acknowledged");
            self.emit(QueueEventKind::Acknowledged {
                claim_token: token.0,
            });
            Ok(Step::Done(()))
        })
        .await
    }

    /// Give a claimed message back by moving it to the tail of the queue.
    ///
    /// The row is read, removed and re-inserted in one transaction, so it
    /// gets a new sequence id. A row that is already gone is left alone.
    pub async fn release(&self, token: ClaimToken) -> Result<()> {
        if token.is_absent() {
            return Ok(());
        }

        self.observe("release", || Ok(()), async {
            let Some(_gate) = self.enter().await? else {
                return Ok(Step::Cancelled);
            };

            let mut session = self.db.begin().await?;
            let requeued_as = self.requeue(&mut session, token).await?;
            session.commit().await.map_err(self.store_err())?;

            debug!(queue = %self.name, %token, ?requeued_as, "released");
            self.emit(QueueEventKind::Released {
                claim_token: token.0,
                requeued_as,
            });
            Ok(Step::Done(()))
        })
        .await
    }

    async fn requeue(&self, session: &mut Session, token: ClaimToken) -> Result<Option<i64>> {
        let Some(record) = session
            .fetch_record(&self.queries.read(token.0))
            .await
            .map_err(self.store_err())?
        else {
            return Ok(None);
        };

        session
            .execute(&self.queries.remove(record.sequence_id))
            .await
            .map_err(self.store_err())?;
        let sequence_id = session
            .fetch_scalar(
                &self
                    .queries
                    .enqueue(record.message_id, &record.message_body),
            )
            .await
            .map_err(self.store_err())?;
        Ok(Some(sequence_id))
    }

    /// Pass the gate, initializing the queue on first use.
    ///
    /// Returns `None` when the cancellation token fired before or while
    /// waiting; the caller must then return [`Step::Cancelled`].
    async fn enter(&self) -> Result<Option<MutexGuard<'_, Lifecycle>>> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let mut lifecycle = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            guard = self.gate.lock() => guard,
        };

        if *lifecycle == Lifecycle::Uninitialized {
            self.recover().await?;
            *lifecycle = Lifecycle::Ready;
            debug!(queue = %self.name, fingerprint = %self.fingerprint, "queue initialized");
        }

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(lifecycle))
    }

    /// Make rows claimed under this fingerprint claimable again.
    async fn recover(&self) -> Result<()> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let released = async {
            let mut session = self.db.begin().await?;
            let released = session
                .execute(&self.queries.release_claims(&self.fingerprint))
                .await
                .map_err(self.store_err())?;
            session.commit().await.map_err(self.store_err())?;
            Ok::<_, Error>(released)
        }
        .await;
        let released = absent_ok(released)?;

        if released > 0 {
            warn!(
                queue = %self.name,
                fingerprint = %self.fingerprint,
                released,
                "released orphaned claims"
            );
            metrics::recovered_claims().add(released, &[KeyValue::new("queue", self.name.clone())]);
        }
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool> {
        let mut session = self.db.begin().await?;
        let found = session
            .fetch_scalar(&self.queries.exists())
            .await
            .map_err(self.store_err())?;
        session.commit().await.map_err(self.store_err())?;
        Ok(found > 0)
    }

    async fn row_count(&self) -> Result<i64> {
        let mut session = self.db.begin().await?;
        let count = session
            .fetch_scalar(&self.queries.count())
            .await
            .map_err(self.store_err())?;
        session.commit().await.map_err(self.store_err())?;
        Ok(count)
    }

    /// Run an operation body inside its span, recording metrics and
    /// turning a cancelled body into a notification plus `on_cancel()`.
    async fn observe<T>(
        &self,
        operation: &'static str,
        on_cancel: impl FnOnce() -> Result<T>,
        body: impl Future<Output = Result<Step<T>>>,
    ) -> Result<T> {
        debug_assert!(metrics::OPERATIONS.contains(&operation));
        let span = start_queue_span(&self.name, operation);
        let started = Instant::now();

        let (outcome, result) = match body.instrument(span.clone()).await {
            Ok(Step::Done(value)) => ("ok", Ok(value)),
            Ok(Step::Cancelled) => {
                debug!(queue = %self.name, operation, "cancelled");
                self.emit(QueueEventKind::Cancelled {
                    operation: operation.to_string(),
                });
                ("cancelled", on_cancel())
            }
            Err(e) => ("error", Err(e)),
        };

        record_outcome(&span, outcome);
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("operation", operation),
                KeyValue::new("outcome", outcome),
            ],
        );
        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", operation)],
        );
        result
    }

    fn emit(&self, kind: QueueEventKind) {
        let event = QueueEvent {
            seq: self.event_seq.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            queue: self.name.clone(),
            kind,
        };
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn store_err(&self) -> impl Fn(sqlx::Error) -> Error + '_ {
        move |e| Error::from_store(e, &self.name)
    }
}

/// Treat a missing table as success with the default value.
fn absent_ok<T: Default>(result: Result<T>) -> Result<T> {
    match result {
        Err(Error::SchemaAbsent(_)) => Ok(T::default()),
        other => other,
    }
}
