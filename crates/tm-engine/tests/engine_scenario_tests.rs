//! End-to-end scenarios driving the orchestrator against an in-memory store.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tm_core::config::RetryConfig;
use tm_core::{ModelNode, NodeName, Value};
use tm_engine::{Orchestrator, RunRequest, RunStatus};
use tm_store::{DuckDbStore, Store};

fn ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
}

fn node(yaml: &str) -> ModelNode {
    serde_yaml::from_str(yaml).unwrap()
}

fn reviews_node() -> ModelNode {
    node(
        "name: reviews\n\
         materialized: incremental\n\
         select: SELECT * FROM src_reviews\n\
         unique_key: [listing_id, review_date, reviewer_name]\n\
         incremental_column: review_date\n",
    )
}

async fn store_with_reviews() -> Arc<DuckDbStore> {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    store
        .atomic_write(
            "CREATE TABLE src_reviews AS SELECT * FROM (VALUES \
             (1, TIMESTAMP '2023-01-01 00:00:00', 'ann', 'good'), \
             (2, TIMESTAMP '2023-01-02 00:00:00', 'bob', 'fine'), \
             (3, TIMESTAMP '2023-01-03 00:00:00', 'cat', 'nice')) \
             AS t(listing_id, review_date, reviewer_name, comments)",
        )
        .await
        .unwrap();
    store
}

fn engine(store: &Arc<DuckDbStore>, nodes: Vec<ModelNode>) -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::new(
            Arc::clone(store) as Arc<dyn Store>,
            nodes,
            2,
            RetryConfig::default(),
            None,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_first_incremental_run_full_loads_with_keys() {
    let store = store_with_reviews().await;
    let engine = engine(&store, vec![reviews_node()]);

    let outcome = engine.submit("reviews", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.rows.unwrap().inserted, 3);

    let distinct = store
        .read("SELECT COUNT(DISTINCT tm_key) FROM reviews")
        .await
        .unwrap();
    assert_eq!(distinct.scalar(), Some(&Value::Integer(3)));

    let watermark = store
        .read("SELECT MAX(review_date) FROM reviews")
        .await
        .unwrap();
    assert_eq!(
        watermark.scalar().and_then(|v| v.as_timestamp()),
        Some(ts("2023-01-03 00:00:00"))
    );
}

#[tokio::test]
async fn test_watermark_continuation_appends_only_new_rows() {
    let store = store_with_reviews().await;
    let engine = engine(&store, vec![reviews_node()]);

    engine.submit("reviews", RunRequest::default()).await;
    store
        .atomic_write(
            "INSERT INTO src_reviews VALUES \
             (4, TIMESTAMP '2023-01-04 00:00:00', 'dan', 'great')",
        )
        .await
        .unwrap();

    let outcome = engine.submit("reviews", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.rows.unwrap().inserted, 1);
    assert_eq!(store.row_count("reviews").await.unwrap(), 4);

    // Already-processed rows were not rewritten
    let untouched = store
        .read("SELECT comments FROM reviews WHERE listing_id = 1")
        .await
        .unwrap();
    assert_eq!(untouched.scalar(), Some(&Value::Text("good".to_string())));
}

#[tokio::test]
async fn test_behind_watermark_window_needs_backfill() {
    let store = store_with_reviews().await;
    let engine = engine(&store, vec![reviews_node()]);
    engine.submit("reviews", RunRequest::default()).await;

    let request = RunRequest {
        start: Some(ts("2023-01-01 00:00:00")),
        end: Some(ts("2023-01-03 00:00:00")),
        backfill: false,
        full_refresh: false,
    };
    let outcome = engine.submit("reviews", request.clone()).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.error.unwrap().contains("backfill"));

    // Authorized backfill replays the window; existing keys are skipped
    let outcome = engine
        .submit(
            "reviews",
            RunRequest {
                backfill: true,
                ..request
            },
        )
        .await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.rows.unwrap().inserted, 0);
    assert_eq!(store.row_count("reviews").await.unwrap(), 3);
}

#[tokio::test]
async fn test_full_refresh_is_idempotent() {
    let store = store_with_reviews().await;
    let engine = engine(&store, vec![reviews_node()]);
    let request = RunRequest {
        full_refresh: true,
        ..RunRequest::default()
    };

    engine.submit("reviews", request.clone()).await;
    let first = store
        .read("SELECT * FROM reviews ORDER BY listing_id")
        .await
        .unwrap();

    let outcome = engine.submit("reviews", request).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    let second = store
        .read("SELECT * FROM reviews ORDER BY listing_id")
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_snapshot_tracks_attribute_change_as_two_records() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    store
        .atomic_write(
            "CREATE TABLE src_hosts AS SELECT * FROM (VALUES \
             (42, 'sunny rentals'), (7, 'coastal stays')) AS t(host_id, hostname)",
        )
        .await
        .unwrap();
    let engine = engine(
        &store,
        vec![node(
            "name: hosts\n\
             materialized: snapshot\n\
             select: SELECT * FROM src_hosts\n\
             unique_key: [host_id]\n\
             tracked_columns: [hostname]\n",
        )],
    );

    let outcome = engine.submit("hosts", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.rows.unwrap().inserted, 2);

    store
        .atomic_write("UPDATE src_hosts SET hostname = 'sunny stays' WHERE host_id = 42")
        .await
        .unwrap();
    let outcome = engine.submit("hosts", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);
    let rows = outcome.rows.unwrap();
    assert_eq!(rows.inserted, 1);
    assert_eq!(rows.updated, 1);

    // Two records for the changed key, exactly one of them open
    let history = store
        .read("SELECT COUNT(*) FROM hosts WHERE host_id = 42")
        .await
        .unwrap();
    assert_eq!(history.scalar(), Some(&Value::Integer(2)));
    let open = store
        .read("SELECT COUNT(*) FROM hosts WHERE host_id = 42 AND tm_valid_to IS NULL")
        .await
        .unwrap();
    assert_eq!(open.scalar(), Some(&Value::Integer(1)));

    // Validity intervals tile: the closed record ends where the open one starts
    let seam = store
        .read(
            "SELECT COUNT(*) FROM hosts prev JOIN hosts cur \
             ON prev.host_id = cur.host_id \
             WHERE prev.host_id = 42 \
             AND prev.tm_valid_to = cur.tm_valid_from \
             AND cur.tm_valid_to IS NULL",
        )
        .await
        .unwrap();
    assert_eq!(seam.scalar(), Some(&Value::Integer(1)));

    // The untouched key keeps its single open record
    let unchanged = store
        .read("SELECT COUNT(*) FROM hosts WHERE host_id = 7")
        .await
        .unwrap();
    assert_eq!(unchanged.scalar(), Some(&Value::Integer(1)));
}

#[tokio::test]
async fn test_drift_fail_fast_writes_nothing() {
    let store = store_with_reviews().await;
    let mut guarded = reviews_node();
    guarded.on_schema_change = tm_core::SchemaPolicy::Fail;
    let engine = engine(&store, vec![guarded]);

    // First run establishes the baseline
    let outcome = engine.submit("reviews", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Succeeded);

    store
        .atomic_write("ALTER TABLE src_reviews ADD COLUMN sentiment VARCHAR")
        .await
        .unwrap();
    store
        .atomic_write(
            "INSERT INTO src_reviews VALUES \
             (5, TIMESTAMP '2023-01-05 00:00:00', 'eve', 'ok', 'neutral')",
        )
        .await
        .unwrap();

    let outcome = engine.submit("reviews", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.error.unwrap().contains("sentiment"));
    // The aborted run wrote nothing
    assert_eq!(store.row_count("reviews").await.unwrap(), 3);

    // Unresolved drift fails again on the next run
    let outcome = engine.submit("reviews", RunRequest::default()).await;
    assert_eq!(outcome.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_graph_run_materializes_in_dependency_order() {
    let store = store_with_reviews().await;
    let engine = engine(
        &store,
        vec![
            node("name: stg_reviews\nselect: SELECT * FROM src_reviews\n"),
            node(
                "name: review_counts\nmaterialized: table\ndepends_on: [stg_reviews]\n\
                 select: SELECT listing_id, COUNT(*) AS n FROM src_reviews GROUP BY listing_id\n",
            ),
            reviews_node(),
        ],
    );

    let selection = vec![
        NodeName::new("stg_reviews"),
        NodeName::new("review_counts"),
        NodeName::new("reviews"),
    ];
    let summary = engine
        .run_graph(&selection, RunRequest::default())
        .await
        .unwrap();

    assert!(summary.all_succeeded());
    assert_eq!(summary.count(RunStatus::Succeeded), 3);
    // Views leave no relation behind
    assert!(!store.relation_exists("stg_reviews").await.unwrap());
    assert_eq!(store.row_count("review_counts").await.unwrap(), 3);
    assert_eq!(store.row_count("reviews").await.unwrap(), 3);
}
