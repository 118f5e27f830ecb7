use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tm_core::node_name::NodeName;
use tm_core::window::{PartitionWindow, WindowSource};
use tm_core::Value;
use tm_store::{DuckDbStore, Store};

use super::MergeExecutor;
use crate::error::EngineError;
use crate::orchestrator::CancelFlag;
use crate::plan::{PlanAction, RunPlan};

fn ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
}

fn window_for(start: &str, end: &str) -> PartitionWindow {
    PartitionWindow {
        start: ts(start),
        end: ts(end),
        source: WindowSource::Explicit,
    }
}

fn reviews_node(on_conflict: &str) -> tm_core::ModelNode {
    serde_yaml::from_str(&format!(
        "name: reviews\n\
         materialized: incremental\n\
         select: SELECT * FROM src_reviews\n\
         unique_key: [listing_id, review_date, reviewer_name]\n\
         incremental_column: review_date\n\
         on_conflict: {}\n",
        on_conflict
    ))
    .unwrap()
}

fn plan(action: PlanAction) -> RunPlan {
    RunPlan {
        node: NodeName::new("reviews"),
        action,
        schema_changes: Vec::new(),
        attempt: 1,
        planned_at: Utc::now(),
    }
}

async fn seed_source(store: &DuckDbStore) {
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
}

#[tokio::test]
async fn test_rebuild_keyed_writes_distinct_keys() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);

    let counts = executor
        .execute(
            &reviews_node("no_op"),
            plan(PlanAction::RebuildKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();
    assert_eq!(counts.inserted, 3);
    assert_eq!(counts.updated, 0);

    let distinct = store
        .read("SELECT COUNT(DISTINCT tm_key) FROM reviews")
        .await
        .unwrap();
    assert_eq!(distinct.scalar(), Some(&Value::Integer(3)));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);
    let node = reviews_node("no_op");

    let template = plan(PlanAction::RebuildKeyed {
        extract: "SELECT * FROM src_reviews".to_string(),
    });
    executor
        .execute(&node, template.clone(), &CancelFlag::new())
        .await
        .unwrap();
    let first = store
        .read("SELECT * FROM reviews ORDER BY listing_id")
        .await
        .unwrap();

    executor
        .execute(&node, template, &CancelFlag::new())
        .await
        .unwrap();
    let second = store
        .read("SELECT * FROM reviews ORDER BY listing_id")
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_append_no_op_skips_existing_keys() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);
    let node = reviews_node("no_op");

    executor
        .execute(
            &node,
            plan(PlanAction::RebuildKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    // Day 3 reappears in the extract alongside a new day-4 row
    store
        .atomic_write(
            "INSERT INTO src_reviews VALUES \
             (4, TIMESTAMP '2023-01-04 00:00:00', 'dan', 'great')",
        )
        .await
        .unwrap();
    let counts = executor
        .execute(
            &node,
            plan(PlanAction::AppendKeyed {
                extract: "SELECT * FROM src_reviews \
                          WHERE review_date >= TIMESTAMP '2023-01-03 00:00:00'"
                    .to_string(),
                window: window_for("2023-01-03 00:00:00", "2023-01-05 00:00:00"),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.updated, 0);
    assert_eq!(store.row_count("reviews").await.unwrap(), 4);
}

#[tokio::test]
async fn test_append_update_replaces_colliding_rows() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);
    let node = reviews_node("update");

    executor
        .execute(
            &node,
            plan(PlanAction::RebuildKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    // Same business key with a new payload, plus a genuinely new row
    store
        .atomic_write(
            "UPDATE src_reviews SET comments = 'revised' \
             WHERE listing_id = 3",
        )
        .await
        .unwrap();
    store
        .atomic_write(
            "INSERT INTO src_reviews VALUES \
             (4, TIMESTAMP '2023-01-04 00:00:00', 'dan', 'great')",
        )
        .await
        .unwrap();
    let counts = executor
        .execute(
            &node,
            plan(PlanAction::AppendKeyed {
                extract: "SELECT * FROM src_reviews \
                          WHERE review_date >= TIMESTAMP '2023-01-03 00:00:00'"
                    .to_string(),
                window: window_for("2023-01-03 00:00:00", "2023-01-05 00:00:00"),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    // The revised row counts only as an update, not as an insert too
    assert_eq!(counts.inserted, 1);
    assert_eq!(counts.updated, 1);
    assert_eq!(store.row_count("reviews").await.unwrap(), 4);
    let revised = store
        .read("SELECT comments FROM reviews WHERE listing_id = 3")
        .await
        .unwrap();
    assert_eq!(revised.scalar(), Some(&Value::Text("revised".to_string())));
}

#[tokio::test]
async fn test_append_creates_missing_target() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);

    // Explicit-window first run: no target yet
    let counts = executor
        .execute(
            &reviews_node("no_op"),
            plan(PlanAction::AppendKeyed {
                extract: "SELECT * FROM src_reviews \
                          WHERE review_date < TIMESTAMP '2023-01-02 00:00:00'"
                    .to_string(),
                window: window_for("2023-01-01 00:00:00", "2023-01-02 00:00:00"),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(counts.inserted, 1);
    assert_eq!(store.row_count("reviews").await.unwrap(), 1);
}

#[tokio::test]
async fn test_append_ignores_column_changes_when_creating_target() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);

    // An accepted column addition carried into a first run must not be
    // applied before the target exists; the CREATE covers it.
    let counts = executor
        .execute(
            &reviews_node("no_op"),
            RunPlan {
                node: NodeName::new("reviews"),
                action: PlanAction::AppendKeyed {
                    extract: "SELECT * FROM src_reviews".to_string(),
                    window: window_for("2023-01-01 00:00:00", "2023-01-05 00:00:00"),
                },
                schema_changes: vec![
                    "ALTER TABLE \"reviews\" ADD COLUMN \"comments\" VARCHAR".to_string(),
                ],
                attempt: 1,
                planned_at: Utc::now(),
            },
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    assert_eq!(counts.inserted, 3);
    let columns = store
        .read("SELECT comments FROM reviews WHERE listing_id = 1")
        .await
        .unwrap();
    assert_eq!(columns.scalar(), Some(&Value::Text("good".to_string())));
}

#[tokio::test]
async fn test_cancelled_run_leaves_target_untouched() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    seed_source(&store).await;
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);
    let node = reviews_node("no_op");

    executor
        .execute(
            &node,
            plan(PlanAction::RebuildKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
            }),
            &CancelFlag::new(),
        )
        .await
        .unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let err = executor
        .execute(
            &node,
            plan(PlanAction::AppendKeyed {
                extract: "SELECT * FROM src_reviews".to_string(),
                window: window_for("2023-01-01 00:00:00", "2023-01-05 00:00:00"),
            }),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled { .. }));
    assert_eq!(store.row_count("reviews").await.unwrap(), 3);
}

#[tokio::test]
async fn test_no_op_plan_writes_nothing() {
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    let executor = MergeExecutor::new(Arc::clone(&store) as Arc<dyn Store>);
    let node: tm_core::ModelNode =
        serde_yaml::from_str("name: reviews\nselect: SELECT 1\n").unwrap();

    let counts = executor
        .execute(&node, plan(PlanAction::NoOp), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(counts.inserted, 0);
    assert!(!store.relation_exists("reviews").await.unwrap());
}
