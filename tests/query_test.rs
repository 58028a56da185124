//! Statement templates per dialect.

use sqlq::Error;
use sqlq::db::query::{Dialect, Param, QueryFactory, validate_identifier};
use sqlq::queue::Fingerprint;
use uuid::Uuid;

#[test]
fn identifiers_are_validated() {
    assert!(validate_identifier("queue", "orders").is_ok());
    assert!(validate_identifier("queue", "_inbox_2").is_ok());

    let too_long = "x".repeat(49);
    for bad in ["", "2fast", "with-dash", "quote\"d", "semi;colon", too_long.as_str()] {
        assert!(
            matches!(validate_identifier("queue", bad), Err(Error::Config(_))),
            "expected {bad:?} to be rejected"
        );
    }

    assert!(QueryFactory::new(Dialect::Postgres, "bad schema", "orders").is_err());
}

#[test]
fn postgres_tables_are_schema_qualified() {
    let q = QueryFactory::new(Dialect::Postgres, "queues", "orders").unwrap();
    assert_eq!(q.table(), r#""queues"."orders""#);
    assert_eq!(q.purge().sql, r#"TRUNCATE TABLE "queues"."orders""#);

    let create = q.create();
    assert!(create[0].sql.contains("pg_advisory_xact_lock"));
    assert_eq!(create[0].params, vec![Param::Text("queues".to_string())]);
    assert!(create.iter().any(|s| s.sql.contains("CREATE TABLE IF NOT EXISTS")));
    assert!(
        !create.iter().any(|s| s.sql.contains("CREATE SCHEMA IF NOT EXISTS")),
        "schema creation must be skipped when the schema exists"
    );
    assert!(
        create
            .iter()
            .any(|s| s.sql.contains(r#"CREATE INDEX IF NOT EXISTS "ix_orders_claim_id""#))
    );
}

#[test]
fn postgres_schema_is_created_only_when_missing() {
    let create = QueryFactory::new(Dialect::Postgres, "queues", "orders")
        .unwrap()
        .create();

    let guarded = create
        .iter()
        .find(|s| s.sql.contains("CREATE SCHEMA"))
        .expect("schema statement");
    assert!(guarded.sql.contains("pg_catalog.pg_namespace WHERE nspname = 'queues'"));
    assert!(guarded.sql.contains(r#"EXECUTE 'CREATE SCHEMA "queues"'"#));
    assert!(guarded.params.is_empty());
}

#[test]
fn sqlite_tables_ignore_schema() {
    let q = QueryFactory::new(Dialect::Sqlite, "queues", "orders").unwrap();
    assert_eq!(q.table(), r#""orders""#);
    assert_eq!(q.purge().sql, r#"DELETE FROM "orders""#);
    assert_eq!(q.exists().params, vec![Param::Text("orders".to_string())]);
    assert!(q.create()[0].sql.contains("AUTOINCREMENT"));
}

#[test]
fn claim_takes_oldest_unclaimed_row() {
    let fingerprint = Fingerprint::from_identity("worker");
    let claim_id = Uuid::new_v4();

    let pg = QueryFactory::new(Dialect::Postgres, "public", "orders")
        .unwrap()
        .claim(&fingerprint, claim_id);
    assert!(pg.sql.contains("claim_token IS NULL"));
    assert!(pg.sql.contains("ORDER BY sequence_id LIMIT 1 FOR UPDATE SKIP LOCKED"));
    assert_eq!(
        pg.params,
        vec![
            Param::Bytes(fingerprint.as_bytes().to_vec()),
            Param::Uuid(claim_id)
        ]
    );

    let lite = QueryFactory::new(Dialect::Sqlite, "public", "orders")
        .unwrap()
        .claim(&fingerprint, claim_id);
    assert!(lite.sql.contains("ORDER BY sequence_id LIMIT 1"));
    assert!(!lite.sql.contains("SKIP LOCKED"));
}

#[test]
fn release_claims_matches_only_the_fingerprint() {
    let fingerprint = Fingerprint::from_identity("worker");
    let stmt = QueryFactory::new(Dialect::Postgres, "public", "orders")
        .unwrap()
        .release_claims(&fingerprint);

    assert!(stmt.sql.contains("SET claim_token = NULL, claimed_at = NULL, claim_id = NULL"));
    assert!(stmt.sql.contains("WHERE claim_token = $1"));
    assert_eq!(stmt.params, vec![Param::Bytes(fingerprint.as_bytes().to_vec())]);
}

#[test]
fn row_values_are_bound_not_inlined() {
    let q = QueryFactory::new(Dialect::Postgres, "public", "orders").unwrap();
    let message_id = Uuid::new_v4();

    let enqueue = q.enqueue(message_id, b"payload");
    assert!(enqueue.sql.ends_with("RETURNING sequence_id"));
    assert!(!enqueue.sql.contains(&message_id.to_string()));
    assert_eq!(
        enqueue.params,
        vec![Param::Uuid(message_id), Param::Bytes(b"payload".to_vec())]
    );

    assert!(q.read(42).sql.ends_with("FOR UPDATE"));
    assert_eq!(q.remove(42).params, vec![Param::Int(42)]);
}

#[test]
fn acknowledge_and_release_only_touch_claimed_rows() {
    let q = QueryFactory::new(Dialect::Sqlite, "public", "orders").unwrap();

    let ack = q.acknowledge(42);
    assert!(ack.sql.contains("sequence_id = $1 AND claim_token IS NOT NULL"));
    assert_eq!(ack.params, vec![Param::Int(42)]);

    assert!(q.read(42).sql.contains("AND claim_token IS NOT NULL"));
}
