//! Core sync engine that mirrors one remote domain into the local store.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pinsync_common::{Error, EventDomain, Result};
use pinsync_remote::{EventPage, EventSource, SortOrder};
use pinsync_store::{EventFilter, EventStore};

use crate::progress::{ProgressReporter, ProgressSink, ProgressUpdater, SyncProgress};
use crate::strategy::SyncStrategy;

/// Upper bound accepted for `max_concurrent_pages`.
pub const MAX_CONCURRENT_PAGES: usize = 64;

/// Configuration for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Size of the page fetched and committed before the concurrent phase.
    pub first_page_size: u64,
    /// Size of every page fetched in the concurrent phase.
    pub chunk_size: u64,
    /// Pages in flight at once during the concurrent phase.
    pub max_concurrent_pages: usize,
    /// Order requested from the remote.
    pub sort: SortOrder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            first_page_size: 15,
            chunk_size: 20,
            max_concurrent_pages: 8,
            sort: SortOrder::CreationTimeAsc,
        }
    }
}

impl SyncConfig {
    /// Check the configuration.
    ///
    /// # Errors
    /// - `Config` if a page size is zero or the concurrency bound is outside
    ///   `1..=MAX_CONCURRENT_PAGES`
    pub fn validate(&self) -> Result<()> {
        if self.first_page_size == 0 {
            return Err(Error::Config("first_page_size must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if !(1..=MAX_CONCURRENT_PAGES).contains(&self.max_concurrent_pages) {
            return Err(Error::Config(format!(
                "max_concurrent_pages must be between 1 and {}",
                MAX_CONCURRENT_PAGES
            )));
        }
        Ok(())
    }
}

/// Which pages a run fetches once the total is known.
///
/// The first page covers offsets `[0, first_page_size)`. Chunk page `p`
/// covers `[p * chunk_size, (p + 1) * chunk_size)`. Chunk page 0 is only
/// needed when the first page is smaller than a chunk and does not already
/// hold everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub total: u64,
    pub first_page_size: u64,
    pub chunk_size: u64,
}

impl PagePlan {
    pub fn new(total: u64, config: &SyncConfig) -> Self {
        Self {
            total,
            first_page_size: config.first_page_size,
            chunk_size: config.chunk_size,
        }
    }

    /// Number of chunk-sized pages the total spans.
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.chunk_size)
    }

    /// Whether chunk page 0 must be fetched to cover the offsets between
    /// the end of the first page and the start of chunk page 1.
    pub fn needs_gap_page(&self) -> bool {
        self.first_page_size < self.chunk_size && self.total > self.first_page_size
    }

    /// Chunk page indices for the concurrent phase, ascending.
    pub fn concurrent_pages(&self) -> Vec<u64> {
        let start = if self.needs_gap_page() { 0 } else { 1 };
        (start..self.total_pages()).collect()
    }
}

/// Outcome of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub domain: EventDomain,
    /// Total reported by the probe.
    pub total: u64,
    /// Items decoded and stored, excluding gap-page duplicates.
    pub processed: u64,
    /// Data pages fetched, the probe excluded.
    pub pages_fetched: u64,
    /// Entities removed by reconciliation.
    pub deleted: usize,
    /// Whether reconciliation committed. A failed reconciliation does not
    /// fail the run.
    pub reconciled: bool,
    pub duration: Duration,
    /// Progress as observers last saw it before the reset to idle.
    pub progress: SyncProgress,
}

/// Mirrors remote domains into a local store.
pub struct SyncEngine {
    source: Arc<dyn EventSource>,
    store: Arc<dyn EventStore>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    ///
    /// # Errors
    /// - `Config` if `config` does not validate
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn EventStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            store,
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Run one full sync of `strategy`'s domain.
    ///
    /// # Preconditions
    /// - No other run for the same domain is in progress
    ///
    /// # Postconditions
    /// - On success the store holds exactly the entities the remote listed,
    ///   unless reconciliation failed (see `SyncReport::reconciled`)
    /// - On failure the store holds whatever was committed before the
    ///   failing step; staged work is discarded
    /// - In both cases `progress` is idle again when this returns
    ///
    /// # Errors
    /// - Any source error from the probe or a data page
    /// - `Decode` if an envelope does not decode
    /// - `Store` if an insert or commit fails
    pub async fn run(
        &self,
        strategy: &SyncStrategy,
        progress: &ProgressSink,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        info!(
            "Starting sync of {} via {} into {}",
            strategy.domain,
            self.source.name(),
            self.store.name()
        );

        let (reporter, updater) = ProgressUpdater::start(progress);
        let mut result = self.run_inner(strategy, &reporter, start).await;

        if result.is_err() {
            if let Err(e) = self.store.rollback(strategy.kind).await {
                warn!("Failed to discard staged changes: {}", e);
            }
        }
        drop(reporter);
        let last_progress = updater.finish().await;
        if let Ok(report) = &mut result {
            report.progress = last_progress;
        }

        match &result {
            Ok(report) => info!(
                "Sync of {} completed in {:?}: {} processed, {} deleted",
                report.domain, report.duration, report.processed, report.deleted
            ),
            Err(e) => error!("Sync of {} failed: {}", strategy.domain, e),
        }

        result
    }

    async fn run_inner(
        &self,
        strategy: &SyncStrategy,
        reporter: &ProgressReporter,
        start: Instant,
    ) -> Result<SyncReport> {
        let domain = strategy.domain;

        let probe = self.fetch(domain, 0, 1).await?;
        let plan = PagePlan::new(probe.total_elements, &self.config);
        reporter.total(plan.total);
        debug!("{} reports {} items", domain, plan.total);

        // First page, committed on its own so early items show up quickly.
        let first = self.fetch(domain, 0, plan.first_page_size).await?;
        let mut first_ids = HashSet::with_capacity(first.content.len());
        for envelope in &first.content {
            if !first_ids.insert(envelope.id) {
                debug!("{}: duplicate {} on first page", domain, envelope.id);
                continue;
            }
            let event = (strategy.decode)(envelope)?;
            self.store.insert(event).await?;
            reporter.processed(1);
        }
        self.store.save(strategy.kind).await?;
        let mut processed = first_ids.len() as u64;
        let mut pages_fetched = 1;

        let pages = plan.concurrent_pages();
        let mut seen = first_ids.clone();
        if !pages.is_empty() {
            debug!("{}: fetching {} more pages", domain, pages.len());
            pages_fetched += pages.len() as u64;

            let first_ids = &first_ids;
            let mut results = stream::iter(pages)
                .map(|page| self.process_page(strategy, page, first_ids, reporter))
                .buffer_unordered(self.config.max_concurrent_pages);

            while let Some(ids) = results.try_next().await? {
                processed += ids.len() as u64;
                seen.extend(ids);
            }
        }
        self.store.save(strategy.kind).await?;

        let (deleted, reconciled) = match self.reconcile(strategy, seen).await {
            Some(deleted) => (deleted, true),
            None => (0, false),
        };

        Ok(SyncReport {
            domain,
            total: plan.total,
            processed,
            pages_fetched,
            deleted,
            reconciled,
            duration: start.elapsed(),
            progress: SyncProgress::default(),
        })
    }

    /// Fetch, decode and stage one chunk page. Returns the ids it staged.
    async fn process_page(
        &self,
        strategy: &SyncStrategy,
        page: u64,
        skip: &HashSet<Uuid>,
        reporter: &ProgressReporter,
    ) -> Result<Vec<Uuid>> {
        let data = self.fetch(strategy.domain, page, self.config.chunk_size).await?;

        let events = data
            .content
            .iter()
            .filter(|envelope| !skip.contains(&envelope.id))
            .map(strategy.decode)
            .collect::<Result<Vec<_>>>()?;

        let mut ids = Vec::with_capacity(events.len());
        for event in events {
            ids.push(event.uuid());
            self.store.insert(event).await?;
        }
        reporter.processed(ids.len() as u64);
        debug!("{}: page {} staged {} items", strategy.domain, page, ids.len());

        Ok(ids)
    }

    /// Delete local entities of the strategy's kind that the run did not see.
    ///
    /// Errors are logged and swallowed; `None` means nothing was deleted.
    async fn reconcile(&self, strategy: &SyncStrategy, seen: HashSet<Uuid>) -> Option<usize> {
        let result = async {
            self.store
                .delete(strategy.kind, EventFilter::NotIn(seen))
                .await?;
            self.store.save(strategy.kind).await
        }
        .await;

        match result {
            Ok(summary) => {
                if summary.deleted > 0 {
                    info!("{}: removed {} stale items", strategy.domain, summary.deleted);
                }
                Some(summary.deleted)
            }
            Err(e) => {
                warn!("{}: reconciliation failed: {}", strategy.domain, e);
                if let Err(e) = self.store.rollback(strategy.kind).await {
                    warn!("Failed to discard staged changes: {}", e);
                }
                None
            }
        }
    }

    async fn fetch(&self, domain: EventDomain, page: u64, size: u64) -> Result<EventPage> {
        self.source
            .fetch_events(domain, page, size, self.config.sort)
            .await
    }
}
