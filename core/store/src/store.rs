//! Event store trait definition.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use pinsync_common::{EventKind, Result};

use crate::entity::LocalEvent;

/// Predicate over entity identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every entity of the kind.
    All,
    /// Only the listed identifiers.
    Ids(HashSet<Uuid>),
    /// Every identifier except the listed ones.
    NotIn(HashSet<Uuid>),
}

impl EventFilter {
    /// Whether an identifier satisfies this filter.
    pub fn matches(&self, uuid: &Uuid) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Ids(ids) => ids.contains(uuid),
            EventFilter::NotIn(ids) => !ids.contains(uuid),
        }
    }
}

/// What a `save` applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Entities inserted or replaced.
    pub upserted: usize,
    /// Entities removed by staged deletes.
    pub deleted: usize,
}

/// A write waiting for the next `save`.
#[derive(Debug, Clone)]
pub(crate) enum StagedOp {
    Upsert(LocalEvent),
    Delete { kind: EventKind, filter: EventFilter },
}

/// Staged writes, kept apart per entity kind.
///
/// Runs for different domains stage into different kinds, so committing
/// or discarding one kind never touches work staged for another.
#[derive(Debug, Default)]
pub(crate) struct Staging {
    ops: BTreeMap<EventKind, Vec<StagedOp>>,
}

impl Staging {
    pub(crate) fn push(&mut self, kind: EventKind, op: StagedOp) {
        self.ops.entry(kind).or_default().push(op);
    }

    /// Remove and return the ops staged for `kind`.
    pub(crate) fn take(&mut self, kind: EventKind) -> Vec<StagedOp> {
        self.ops.remove(&kind).unwrap_or_default()
    }

    /// Remove and return every staged op, grouped by kind order.
    pub(crate) fn take_all(&mut self) -> Vec<StagedOp> {
        std::mem::take(&mut self.ops).into_values().flatten().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.ops.values().map(Vec::len).sum()
    }
}

/// Transactional store for local event entities.
///
/// `insert` and `delete` are staged per entity kind. `save(kind)` applies
/// the operations staged for that kind, in staging order, as one atomic
/// commit; `rollback(kind)` discards them. Work staged for other kinds is
/// left alone. Readers (`fetch`, `count`) only see committed state.
/// Implementations must accept concurrent `insert` calls from multiple
/// tasks.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Stage an insert. An entity with the same kind and uuid is replaced.
    async fn insert(&self, event: LocalEvent) -> Result<()>;

    /// Stage deletion of every entity of `kind` matching `filter`.
    ///
    /// The filter is evaluated against the state at `save` time.
    async fn delete(&self, kind: EventKind, filter: EventFilter) -> Result<()>;

    /// Commit the operations staged for `kind`.
    ///
    /// # Postconditions
    /// - On success nothing is staged for `kind` and all of its operations
    ///   are visible
    /// - On failure none of them are visible and nothing is staged for `kind`
    /// - Operations staged for other kinds stay staged
    ///
    /// # Errors
    /// - `Store` if the backend could not commit
    async fn save(&self, kind: EventKind) -> Result<SaveSummary>;

    /// Commit everything staged for every kind as one commit.
    async fn save_all(&self) -> Result<SaveSummary>;

    /// Discard the operations staged for `kind` without applying them.
    async fn rollback(&self, kind: EventKind) -> Result<()>;

    /// Committed entities of `kind` matching `filter`, oldest first.
    async fn fetch(&self, kind: EventKind, filter: EventFilter) -> Result<Vec<LocalEvent>>;

    /// Number of committed entities of `kind`.
    async fn count(&self, kind: EventKind) -> Result<usize>;
}
