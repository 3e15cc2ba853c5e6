/// Impression engine tests
///
/// End-to-end behaviour of recording views, threshold flushes and failure
/// isolation through the public engine API.
/// Run with: cargo test --test impression_engine_tests

use async_trait::async_trait;
use impressions::{
    CounterKey, DurableStore, EngineConfig, EntityKind, FLUSH_AMOUNT, FastCounterStore,
    IMPRESSIONS_COLUMN, ImpressionEngine, ImpressionError, MemoryCounterStore, MemoryDurableStore,
    Post, Project, Result, User,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio_test::assert_ok;
use uuid::Uuid;

/// Durable store wrapper recording every call and failing for chosen ids
struct RecordingDurable {
    inner: MemoryDurableStore,
    calls: Mutex<Vec<(String, String, i64)>>,
    failing_ids: HashSet<String>,
}

impl RecordingDurable {
    async fn new(failing_ids: &[String]) -> Self {
        Self {
            inner: MemoryDurableStore::with_entity_tables().await,
            calls: Mutex::new(Vec::new()),
            failing_ids: failing_ids.iter().cloned().collect(),
        }
    }

    fn calls(&self) -> Vec<(String, String, i64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DurableStore for RecordingDurable {
    async fn add_to_column(&self, table: &str, id: &str, column: &str, amount: i64) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((table.to_string(), id.to_string(), amount));
        if self.failing_ids.contains(id) {
            return Err(ImpressionError::DurableStore("deadlock detected".into()));
        }
        self.inner.add_to_column(table, id, column, amount).await
    }
}

/// Counter store whose reads always fail
struct UnavailableCounters;

#[async_trait]
impl FastCounterStore for UnavailableCounters {
    async fn get(&self, _key: &CounterKey) -> Result<u64> {
        Err(ImpressionError::CounterStore("connection refused".into()))
    }

    async fn increment(&self, _key: &CounterKey) -> Result<()> {
        Err(ImpressionError::CounterStore("connection refused".into()))
    }

    async fn reset(&self, _key: &CounterKey) -> Result<()> {
        Err(ImpressionError::CounterStore("connection refused".into()))
    }
}

fn post() -> Post {
    Post {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        content: "hello".to_string(),
        impressions: 0,
    }
}

fn project() -> Project {
    Project {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        title: "interact".to_string(),
        is_private: false,
        impressions: 0,
    }
}

async fn seed(durable: &MemoryDurableStore, kind: EntityKind, ids: &[String]) {
    for id in ids {
        durable.insert_row(kind.table(), id).await.unwrap();
    }
}

struct Harness {
    engine: ImpressionEngine,
    counters: Arc<MemoryCounterStore>,
    durable: Arc<RecordingDurable>,
}

async fn harness(failing_ids: &[String]) -> Harness {
    let counters = Arc::new(MemoryCounterStore::new());
    let durable = Arc::new(RecordingDurable::new(failing_ids).await);
    let engine = ImpressionEngine::new(counters.clone(), durable.clone(), EngineConfig::default())
        .unwrap();
    Harness {
        engine,
        counters,
        durable,
    }
}

#[tokio::test]
async fn test_tenth_view_flushes_once() {
    let h = harness(&[]).await;
    let p = post();
    seed(&h.durable.inner, EntityKind::Post, &[p.id.to_string()]).await;

    for _ in 0..10 {
        h.engine.record_now(std::slice::from_ref(&p)).await;
    }

    let key = EntityKind::Post.counter_key(&p.id.to_string());
    assert_eq!(h.counters.get(&key).await.unwrap(), 0);
    assert_eq!(
        h.durable.calls(),
        vec![("posts".to_string(), p.id.to_string(), FLUSH_AMOUNT)]
    );
    let stored = h
        .durable
        .inner
        .read_column("posts", &p.id.to_string(), IMPRESSIONS_COLUMN)
        .await
        .unwrap();
    assert_eq!(stored, Some(10));
}

#[tokio::test]
async fn test_fewer_than_ten_views_only_count() {
    for views in 1..=9u64 {
        let h = harness(&[]).await;
        let p = project();

        for _ in 0..views {
            h.engine.record_now(std::slice::from_ref(&p)).await;
        }

        let key = EntityKind::Project.counter_key(&p.id.to_string());
        assert_eq!(h.counters.get(&key).await.unwrap(), views, "after {} views", views);
        assert!(h.durable.calls().is_empty());
    }
}

#[tokio::test]
async fn test_twenty_views_flush_twice() {
    let h = harness(&[]).await;
    let p = post();
    seed(&h.durable.inner, EntityKind::Post, &[p.id.to_string()]).await;

    for _ in 0..20 {
        h.engine.record_now(std::slice::from_ref(&p)).await;
    }

    assert_eq!(h.durable.calls().len(), 2);
    let stored = h
        .durable
        .inner
        .read_column("posts", &p.id.to_string(), IMPRESSIONS_COLUMN)
        .await
        .unwrap();
    assert_eq!(stored, Some(2 * FLUSH_AMOUNT));
}

#[tokio::test]
async fn test_mixed_prior_counts_scenario() {
    let h = harness(&[]).await;
    let posts = vec![post(), post(), post()];
    let ids: Vec<String> = posts.iter().map(|p| p.id.to_string()).collect();
    seed(&h.durable.inner, EntityKind::Post, &ids).await;

    for (id, prior) in ids.iter().zip([8u64, 9, 0]) {
        h.counters.set(&EntityKind::Post.counter_key(id), prior).await;
    }

    let report = h.engine.record_now(&posts).await;

    assert!(!report.aborted);
    assert_eq!(report.flush.dispatched, 1);
    assert_eq!(report.flush.completed, 1);

    let counts = [
        h.counters.get(&EntityKind::Post.counter_key(&ids[0])).await.unwrap(),
        h.counters.get(&EntityKind::Post.counter_key(&ids[1])).await.unwrap(),
        h.counters.get(&EntityKind::Post.counter_key(&ids[2])).await.unwrap(),
    ];
    assert_eq!(counts, [9, 0, 1]);
    assert_eq!(h.durable.calls(), vec![("posts".to_string(), ids[1].clone(), 10)]);
}

#[tokio::test]
async fn test_flush_calls_never_exceed_entities() {
    let h = harness(&[]).await;
    let posts: Vec<Post> = (0..12).map(|_| post()).collect();
    let ids: Vec<String> = posts.iter().map(|p| p.id.to_string()).collect();
    seed(&h.durable.inner, EntityKind::Post, &ids).await;
    for id in &ids {
        h.counters.set(&EntityKind::Post.counter_key(id), 9).await;
    }

    let report = h.engine.record_now(&posts).await;

    let calls = h.durable.calls();
    assert_eq!(calls.len(), ids.len());
    assert_eq!(report.flush.completed, ids.len());
    let distinct: HashSet<_> = calls.iter().map(|(_, id, _)| id.clone()).collect();
    assert_eq!(distinct.len(), ids.len());
}

#[tokio::test]
async fn test_durable_failure_is_isolated() {
    let projects: Vec<Project> = (0..4).map(|_| project()).collect();
    let ids: Vec<String> = projects.iter().map(|p| p.id.to_string()).collect();
    let h = harness(&ids[1..2]).await;
    seed(&h.durable.inner, EntityKind::Project, &ids).await;
    for id in &ids {
        h.counters.set(&EntityKind::Project.counter_key(id), 9).await;
    }

    let report = h.engine.record_now(&projects).await;

    assert_eq!(report.flush.dispatched, 4);
    assert_eq!(report.flush.completed, 3);
    assert_eq!(report.flush.failed, 1);
    for (i, id) in ids.iter().enumerate() {
        let stored = h
            .durable
            .inner
            .read_column("projects", id, IMPRESSIONS_COLUMN)
            .await
            .unwrap();
        let expected = if i == 1 { 0 } else { FLUSH_AMOUNT };
        assert_eq!(stored, Some(expected));
    }

    // The failed unit is not retried and its counter already restarted.
    let key = EntityKind::Project.counter_key(&ids[1]);
    assert_eq!(h.counters.get(&key).await.unwrap(), 0);
    assert_eq!(h.engine.stats().flushes_failed, 1);
}

#[tokio::test]
async fn test_counter_outage_is_silent() {
    let durable = Arc::new(RecordingDurable::new(&[]).await);
    let engine = ImpressionEngine::new(
        Arc::new(UnavailableCounters),
        durable.clone(),
        EngineConfig::default(),
    )
    .unwrap();

    // Stands in for the listing handler: recording returns and the response
    // is built regardless of the outage.
    let users = vec![
        User {
            id: Uuid::new_v4(),
            username: "ada".into(),
            impressions: 0,
        },
        User {
            id: Uuid::new_v4(),
            username: "grace".into(),
            impressions: 0,
        },
    ];
    engine.record_user_impressions(&users);
    let response = format!("{} users", users.len());
    assert_eq!(response, "2 users");

    assert_ok!(engine.shutdown().await);
    let stats = engine.stats();
    assert_eq!(stats.batches_received, 1);
    assert_eq!(stats.passes_aborted, 1);
    assert!(durable.calls().is_empty());

    let report = engine.record_now(&users).await;
    assert!(report.aborted);
}

#[tokio::test]
async fn test_reset_of_zero_counter_is_noop() {
    let counters = MemoryCounterStore::new();
    let key = EntityKind::Event.counter_key("fresh");

    assert_ok!(counters.reset(&key).await);
    assert_ok!(counters.reset(&key).await);
    assert_eq!(counters.get(&key).await.unwrap(), 0);
}

#[tokio::test]
async fn test_background_recording_drains_on_shutdown() {
    let h = harness(&[]).await;
    let posts: Vec<Post> = (0..3).map(|_| post()).collect();
    let ids: Vec<String> = posts.iter().map(|p| p.id.to_string()).collect();
    seed(&h.durable.inner, EntityKind::Post, &ids).await;

    for _ in 0..10 {
        h.engine.record_post_impressions(&posts);
        // Keep batches for the same keys from overlapping.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_ok!(h.engine.shutdown().await);

    let stats = h.engine.stats();
    assert_eq!(stats.batches_received, 10);
    assert_eq!(stats.batches_dropped, 0);
    assert_eq!(stats.flushes_completed, 3);
    for id in &ids {
        let stored = h
            .durable
            .inner
            .read_column("posts", id, IMPRESSIONS_COLUMN)
            .await
            .unwrap();
        assert_eq!(stored, Some(FLUSH_AMOUNT));
    }
}

#[tokio::test]
async fn test_record_after_shutdown_is_dropped() {
    let h = harness(&[]).await;
    assert_ok!(h.engine.shutdown().await);
    assert_ok!(h.engine.shutdown().await);

    h.engine.record_impressions(&[post()]);

    let stats = h.engine.stats();
    assert_eq!(stats.batches_received, 0);
    assert_eq!(stats.batches_dropped, 1);
    assert!(h.counters.is_empty().await);
}

#[tokio::test]
async fn test_empty_batch_is_ignored() {
    let h = harness(&[]).await;
    let none: Vec<Post> = Vec::new();

    h.engine.record_impressions(&none);
    let report = h.engine.record_now(&none).await;

    assert_eq!(report.flush.dispatched, 0);
    assert_eq!(h.engine.stats().batches_received, 0);
}

#[tokio::test]
async fn test_record_with_custom_extractor() {
    let h = harness(&[]).await;
    let slugs = vec!["alpha".to_string(), "beta".to_string()];

    h.engine.record_with(EntityKind::Opening, &slugs, |slug| slug.to_uppercase());
    assert_ok!(h.engine.shutdown().await);

    assert_eq!(h.counters.get(&EntityKind::Opening.counter_key("ALPHA")).await.unwrap(), 1);
    assert_eq!(h.counters.get(&EntityKind::Opening.counter_key("BETA")).await.unwrap(), 1);
    assert_eq!(h.counters.get(&EntityKind::Opening.counter_key("alpha")).await.unwrap(), 0);
}
