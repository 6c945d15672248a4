//! End-to-end runs of the sync service over in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use pinsync_common::{Error, EventDomain, EventKind, Result};
use pinsync_remote::{EventEnvelope, EventPage, EventSource, MemoryEventSource, PageRequest, SortOrder};
use pinsync_store::{EventFilter, EventStore, MemoryStore, SqliteStore};
use pinsync_sync::{RetryPolicy, SyncConfig, SyncProgress, SyncService};

/// Sleeps before every fetch so runs of different domains interleave.
struct SlowSource {
    inner: MemoryEventSource,
    delay: Duration,
}

#[async_trait]
impl EventSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn fetch_events(
        &self,
        domain: EventDomain,
        page: u64,
        size: u64,
        sort: SortOrder,
    ) -> Result<EventPage> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_events(domain, page, size, sort).await
    }
}

/// Fails the first `failures` runs at their opening size-1 request.
struct FlakySource {
    inner: MemoryEventSource,
    failures: u32,
    error: fn() -> Error,
    runs: AtomicU32,
}

#[async_trait]
impl EventSource for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch_events(
        &self,
        domain: EventDomain,
        page: u64,
        size: u64,
        sort: SortOrder,
    ) -> Result<EventPage> {
        if size == 1 && self.runs.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err((self.error)());
        }
        self.inner.fetch_events(domain, page, size, sort).await
    }
}

fn fast_retries(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
    }
}

fn created(n: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(1_713_000_000 + i64::from(n) * 60, 0).unwrap()
}

fn mic_envelope(n: u32) -> EventEnvelope {
    EventEnvelope {
        id: Uuid::new_v4(),
        event_creation_time: created(n),
        event_type: Some("AI_MIC_INTERACTION".to_string()),
        event_data: json!({"request": format!("question {}", n), "response": "answer"}),
    }
}

fn call_envelope(n: u32) -> EventEnvelope {
    EventEnvelope {
        id: Uuid::new_v4(),
        event_creation_time: created(n),
        event_type: None,
        event_data: json!({"peers": [{"displayName": "Ada"}], "durationSeconds": n}),
    }
}

fn seed(source: &MemoryEventSource, domain: EventDomain, count: u32) -> Vec<EventEnvelope> {
    let events: Vec<_> = (0..count)
        .map(|n| match domain {
            EventDomain::PhoneCall => call_envelope(n),
            _ => mic_envelope(n),
        })
        .collect();
    source.set_events(domain, events.clone());
    events
}

fn service(source: &MemoryEventSource, store: Arc<dyn EventStore>) -> SyncService {
    SyncService::new(Arc::new(source.clone()), store, SyncConfig::default()).unwrap()
}

async fn local_ids(store: &dyn EventStore, kind: EventKind) -> HashSet<Uuid> {
    store
        .fetch(kind, EventFilter::All)
        .await
        .unwrap()
        .iter()
        .map(|e| e.uuid())
        .collect()
}

fn ids(events: &[EventEnvelope]) -> HashSet<Uuid> {
    events.iter().map(|e| e.id).collect()
}

fn request(page: u64, size: u64) -> PageRequest {
    PageRequest {
        domain: EventDomain::AiMic,
        page,
        size,
    }
}

#[tokio::test]
async fn test_sync_converges_to_remote() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 47);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(report.total, 47);
    assert_eq!(report.processed, 47);
    assert_eq!(report.pages_fetched, 4);
    assert!(report.reconciled);
    assert_eq!(
        report.progress,
        SyncProgress {
            current: 47,
            total: 47,
            busy: true
        }
    );
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, ids(&remote));
}

#[tokio::test]
async fn test_pagination_requests() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 47);
    let service = service(&source, Arc::new(MemoryStore::new()));

    service.sync(EventDomain::AiMic).await.unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0], request(0, 1));
    assert_eq!(requests[1], request(0, 15));

    let concurrent: HashSet<(u64, u64)> = requests[2..]
        .iter()
        .map(|r| (r.page, r.size))
        .collect();
    let expected: HashSet<(u64, u64)> = [(0, 20), (1, 20), (2, 20)].into_iter().collect();
    assert_eq!(concurrent, expected);
}

#[tokio::test]
async fn test_small_remote_needs_no_concurrent_phase() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 15);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(source.requests(), vec![request(0, 1), request(0, 15)]);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 15);
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 33);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    service.sync(EventDomain::AiMic).await.unwrap();
    let first = store.fetch(EventKind::AiMic, EventFilter::All).await.unwrap();

    let report = service.sync(EventDomain::AiMic).await.unwrap();
    let second = store.fetch(EventKind::AiMic, EventFilter::All).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(report.deleted, 0);
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, ids(&remote));
}

#[tokio::test]
async fn test_reconciliation_removes_stale() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 3);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    service.sync(EventDomain::AiMic).await.unwrap();
    assert!(source.remove_event(EventDomain::AiMic, remote[1].id));

    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(report.deleted, 1);
    let expected: HashSet<Uuid> = [remote[0].id, remote[2].id].into_iter().collect();
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, expected);
}

#[tokio::test]
async fn test_empty_remote_clears_local() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 5);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());
    service.sync(EventDomain::AiMic).await.unwrap();

    source.set_events(EventDomain::AiMic, Vec::new());
    source.clear_requests();
    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(report.deleted, 5);
    assert_eq!(source.requests(), vec![request(0, 1), request(0, 15)]);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reconciliation_scoped_to_domain() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 4);
    seed(&source, EventDomain::PhoneCall, 6);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    service.sync(EventDomain::PhoneCall).await.unwrap();
    service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(store.count(EventKind::PhoneCall).await.unwrap(), 6);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 4);
}

#[tokio::test]
async fn test_page_failure_keeps_first_page() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 47);
    let store = Arc::new(MemoryStore::new());

    // A leftover entity the remote no longer knows about.
    let stale = mic_envelope(999);
    let stale_event = (pinsync_sync::SyncStrategy::for_domain(EventDomain::AiMic).decode)(&stale)
        .unwrap();
    store.insert(stale_event).await.unwrap();
    store.save(EventKind::AiMic).await.unwrap();

    let service = service(&source, store.clone());
    source.fail_page(EventDomain::AiMic, 1, 20);

    let result = service.sync(EventDomain::AiMic).await;
    assert!(matches!(result, Err(Error::Network(_))));

    // First page committed, concurrent phase discarded, no reconciliation.
    let local = local_ids(store.as_ref(), EventKind::AiMic).await;
    let first_page: HashSet<Uuid> = remote[..15].iter().map(|e| e.id).collect();
    assert_eq!(local.len(), 16);
    assert!(local.is_superset(&first_page));
    assert!(local.contains(&stale.id));
    assert_eq!(store.staged_len(), 0);
    assert_eq!(
        service.progress(EventDomain::AiMic).unwrap().snapshot(),
        SyncProgress::default()
    );

    source.clear_failures();
    service.sync(EventDomain::AiMic).await.unwrap();
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, ids(&remote));
}

#[tokio::test]
async fn test_probe_failure_changes_nothing() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 10);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());
    source.fail_page(EventDomain::AiMic, 0, 1);

    assert!(service.sync(EventDomain::AiMic).await.is_err());
    assert_eq!(source.requests().len(), 1);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 0);
}

#[tokio::test]
async fn test_decode_failure_aborts_run() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 30);
    source.push_event(
        EventDomain::AiMic,
        EventEnvelope {
            id: Uuid::new_v4(),
            event_creation_time: created(500),
            event_type: None,
            event_data: json!({"request": "no response"}),
        },
    );
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    let result = service.sync(EventDomain::AiMic).await;

    assert!(matches!(result, Err(Error::Decode(_))));
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 15);
}

#[tokio::test]
async fn test_reconciliation_failure_is_swallowed() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 3);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());
    service.sync(EventDomain::AiMic).await.unwrap();

    source.remove_event(EventDomain::AiMic, remote[0].id);
    store.set_fail_deletes(true);
    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert!(!report.reconciled);
    assert_eq!(report.deleted, 0);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 3);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_resets() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 95);
    let service = service(&source, Arc::new(MemoryStore::new()));
    let mut rx = service.progress(EventDomain::AiMic).unwrap().subscribe();

    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            seen.push(*rx.borrow_and_update());
        }
        seen
    });

    let report = service.sync(EventDomain::AiMic).await.unwrap();
    assert_eq!(
        service.progress(EventDomain::AiMic).unwrap().snapshot(),
        SyncProgress::default()
    );
    drop(service);

    let seen = observer.await.unwrap();
    let busy: Vec<_> = seen.iter().filter(|p| p.busy).collect();
    for pair in busy.windows(2) {
        assert!(pair[1].current >= pair[0].current, "progress went back: {:?}", pair);
    }
    for p in &busy {
        assert!(p.current <= report.total);
    }
    assert_eq!(busy.last().map(|p| p.current), Some(95));
    assert_eq!(report.progress.current, report.total);
    assert_eq!(seen.last(), Some(&SyncProgress::default()));
}

#[tokio::test]
async fn test_duplicate_on_first_page_counted_once() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 10);
    source.push_event(EventDomain::AiMic, remote[3].clone());
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    let report = service.sync(EventDomain::AiMic).await.unwrap();

    assert_eq!(report.total, 11);
    assert_eq!(report.processed, 10);
    assert_eq!(report.progress.current, 10);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 10);
}

#[tokio::test]
async fn test_failing_domain_does_not_touch_other_domain() {
    let memory = MemoryEventSource::new();
    let calls = seed(&memory, EventDomain::PhoneCall, 50);
    seed(&memory, EventDomain::AiMic, 47);
    memory.fail_page(EventDomain::AiMic, 1, 20);

    let source = Arc::new(SlowSource {
        inner: memory,
        delay: Duration::from_millis(5),
    });
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(
        SyncService::new(source, store.clone(), SyncConfig::default()).unwrap(),
    );

    let mic = tokio::spawn({
        let service = service.clone();
        async move { service.sync(EventDomain::AiMic).await }
    });
    let call = tokio::spawn({
        let service = service.clone();
        async move { service.sync(EventDomain::PhoneCall).await }
    });

    assert!(matches!(mic.await.unwrap(), Err(Error::Network(_))));
    let report = call.await.unwrap().unwrap();
    assert_eq!(report.processed, 50);
    assert!(report.reconciled);
    assert_eq!(local_ids(store.as_ref(), EventKind::PhoneCall).await, ids(&calls));
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 15);
    assert_eq!(store.staged_len(), 0);
}

#[tokio::test]
async fn test_sync_with_retry_recovers_from_transient_failures() {
    let memory = MemoryEventSource::new();
    let remote = seed(&memory, EventDomain::AiMic, 23);
    let source = Arc::new(FlakySource {
        inner: memory,
        failures: 2,
        error: || Error::Network("connection reset".to_string()),
        runs: AtomicU32::new(0),
    });
    let store = Arc::new(MemoryStore::new());
    let service = SyncService::new(source.clone(), store.clone(), SyncConfig::default()).unwrap();

    let report = service
        .sync_with_retry(EventDomain::AiMic, &fast_retries(3))
        .await
        .unwrap();

    assert_eq!(report.processed, 23);
    assert_eq!(source.runs.load(Ordering::SeqCst), 3);
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, ids(&remote));
}

#[tokio::test]
async fn test_sync_with_retry_gives_up() {
    let memory = MemoryEventSource::new();
    seed(&memory, EventDomain::AiMic, 5);
    let source = Arc::new(FlakySource {
        inner: memory,
        failures: u32::MAX,
        error: || Error::Network("down".to_string()),
        runs: AtomicU32::new(0),
    });
    let service =
        SyncService::new(source.clone(), Arc::new(MemoryStore::new()), SyncConfig::default())
            .unwrap();

    let result = service
        .sync_with_retry(EventDomain::AiMic, &fast_retries(2))
        .await;

    assert!(matches!(result, Err(Error::Network(_))));
    assert_eq!(source.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_sync_with_retry_stops_on_permanent_error() {
    let memory = MemoryEventSource::new();
    seed(&memory, EventDomain::AiMic, 5);
    let source = Arc::new(FlakySource {
        inner: memory,
        failures: 1,
        error: || Error::Authentication("token expired".to_string()),
        runs: AtomicU32::new(0),
    });
    let service =
        SyncService::new(source.clone(), Arc::new(MemoryStore::new()), SyncConfig::default())
            .unwrap();

    let result = service
        .sync_with_retry(EventDomain::AiMic, &fast_retries(5))
        .await;

    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(source.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_by_ids() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::PhoneCall, 8);
    let service = service(&source, Arc::new(MemoryStore::new()));
    service.sync(EventDomain::PhoneCall).await.unwrap();

    let wanted: HashSet<Uuid> = [remote[2].id, remote[5].id, Uuid::new_v4()]
        .into_iter()
        .collect();
    let found = service.get(EventDomain::PhoneCall, wanted).await.unwrap();

    let found: Vec<Uuid> = found.iter().map(|e| e.uuid()).collect();
    assert_eq!(found, vec![remote[2].id, remote[5].id]);
    assert!(service
        .get(EventDomain::AiMic, ids(&remote))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_sync_all_continues_past_failure() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 5);
    seed(&source, EventDomain::PhoneCall, 5);
    source.fail_page(EventDomain::PhoneCall, 0, 1);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());

    let results = service.sync_all().await;

    assert_eq!(results.len(), 4);
    for (domain, result) in &results {
        match domain {
            EventDomain::PhoneCall => assert!(result.is_err()),
            _ => assert!(result.is_ok(), "{} failed", domain),
        }
    }
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 5);
}

#[tokio::test]
async fn test_sign_out_removes_everything() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 12);
    seed(&source, EventDomain::PhoneCall, 7);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());
    service.sync_all().await;

    let summary = service.sign_out().await.unwrap();

    assert_eq!(summary.deleted, 19);
    for (_, count) in service.counts().await.unwrap() {
        assert_eq!(count, 0);
    }
}

#[tokio::test]
async fn test_failed_sign_out_keeps_everything() {
    let source = MemoryEventSource::new();
    seed(&source, EventDomain::AiMic, 12);
    seed(&source, EventDomain::PhoneCall, 7);
    let store = Arc::new(MemoryStore::new());
    let service = service(&source, store.clone());
    service.sync_all().await;

    store.set_fail_saves(true);
    assert!(service.sign_out().await.is_err());
    store.set_fail_saves(false);

    assert_eq!(store.staged_len(), 0);
    assert_eq!(store.count(EventKind::AiMic).await.unwrap(), 12);
    assert_eq!(store.count(EventKind::PhoneCall).await.unwrap(), 7);
}

#[tokio::test]
async fn test_concurrent_syncs_of_one_domain() {
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::AiMic, 60);
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(service(&source, store.clone()));

    let a = tokio::spawn({
        let service = service.clone();
        async move { service.sync(EventDomain::AiMic).await }
    });
    let b = tokio::spawn({
        let service = service.clone();
        async move { service.sync(EventDomain::AiMic).await }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
    assert_eq!(local_ids(store.as_ref(), EventKind::AiMic).await, ids(&remote));
}

#[tokio::test]
async fn test_sync_into_sqlite_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let source = MemoryEventSource::new();
    let remote = seed(&source, EventDomain::PhoneCall, 41);

    {
        let store: Arc<dyn EventStore> = Arc::new(SqliteStore::open(&db_path).unwrap());
        let service = service(&source, store);
        let report = service.sync(EventDomain::PhoneCall).await.unwrap();
        assert_eq!(report.processed, 41);
    }

    let reopened = SqliteStore::open(&db_path).unwrap();
    assert_eq!(local_ids(&reopened, EventKind::PhoneCall).await, ids(&remote));
}
