//! In-memory event store for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

use pinsync_common::{Error, EventKind, Result};

use crate::entity::LocalEvent;
use crate::store::{EventFilter, EventStore, SaveSummary, StagedOp, Staging};

/// In-memory event store.
///
/// Useful for testing and development. Staged operations sit in a per-kind
/// log and are applied under the committed map's write lock, so a reader
/// never observes half of a save. Saves and deletes can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    committed: RwLock<BTreeMap<(EventKind, Uuid), LocalEvent>>,
    staged: Mutex<Staging>,
    fail_saves: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail with a store error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete` calls fail with a store error.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of operations waiting for a save, across all kinds.
    pub fn staged_len(&self) -> usize {
        self.staged.lock().unwrap().len()
    }

    fn commit(&self, ops: Vec<StagedOp>) -> Result<SaveSummary> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Store("Injected save failure".to_string()));
        }

        let mut summary = SaveSummary::default();
        let mut committed = self.committed.write().unwrap();

        for op in ops {
            match op {
                StagedOp::Upsert(event) => {
                    committed.insert((event.kind(), event.uuid()), event);
                    summary.upserted += 1;
                }
                StagedOp::Delete { kind, filter } => {
                    let before = committed.len();
                    committed.retain(|(k, uuid), _| *k != kind || !filter.matches(uuid));
                    summary.deleted += before - committed.len();
                }
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, event: LocalEvent) -> Result<()> {
        let kind = event.kind();
        self.staged.lock().unwrap().push(kind, StagedOp::Upsert(event));
        Ok(())
    }

    async fn delete(&self, kind: EventKind, filter: EventFilter) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Store("Injected delete failure".to_string()));
        }
        self.staged
            .lock()
            .unwrap()
            .push(kind, StagedOp::Delete { kind, filter });
        Ok(())
    }

    async fn save(&self, kind: EventKind) -> Result<SaveSummary> {
        let ops = self.staged.lock().unwrap().take(kind);
        self.commit(ops)
    }

    async fn save_all(&self) -> Result<SaveSummary> {
        let ops = self.staged.lock().unwrap().take_all();
        self.commit(ops)
    }

    async fn rollback(&self, kind: EventKind) -> Result<()> {
        self.staged.lock().unwrap().take(kind);
        Ok(())
    }

    async fn fetch(&self, kind: EventKind, filter: EventFilter) -> Result<Vec<LocalEvent>> {
        let committed = self.committed.read().unwrap();
        let mut events: Vec<LocalEvent> = committed
            .iter()
            .filter(|((k, uuid), _)| *k == kind && filter.matches(uuid))
            .map(|(_, event)| event.clone())
            .collect();
        events.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.uuid().cmp(&b.uuid()))
        });
        Ok(events)
    }

    async fn count(&self, kind: EventKind) -> Result<usize> {
        let committed = self.committed.read().unwrap();
        Ok(committed.keys().filter(|(k, _)| *k == kind).count())
    }
}
