//! Sync service: one engine, one progress sink per domain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use pinsync_common::{Error, EventDomain, EventKind, Result};
use pinsync_remote::EventSource;
use pinsync_store::{EventFilter, EventStore, LocalEvent, SaveSummary};

use crate::engine::{SyncConfig, SyncEngine, SyncReport};
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;
use crate::strategy::SyncStrategy;

struct DomainSlot {
    strategy: &'static SyncStrategy,
    progress: ProgressSink,
    /// Held for the duration of a run.
    running: Mutex<()>,
}

/// Front door for syncing every domain against one source and store.
pub struct SyncService {
    engine: SyncEngine,
    slots: HashMap<EventDomain, DomainSlot>,
}

impl SyncService {
    /// Create a service for all four domains.
    ///
    /// # Errors
    /// - `Config` if `config` does not validate
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn EventStore>,
        config: SyncConfig,
    ) -> Result<Self> {
        let engine = SyncEngine::new(source, store, config)?;
        let slots = EventDomain::ALL
            .into_iter()
            .map(|domain| {
                let slot = DomainSlot {
                    strategy: SyncStrategy::for_domain(domain),
                    progress: ProgressSink::new(),
                    running: Mutex::new(()),
                };
                (domain, slot)
            })
            .collect();

        Ok(Self { engine, slots })
    }

    fn slot(&self, domain: EventDomain) -> Result<&DomainSlot> {
        self.slots
            .get(&domain)
            .ok_or_else(|| Error::InvalidInput(format!("No strategy for {}", domain)))
    }

    /// Sync one domain. A second call for the same domain waits for the
    /// first to finish; different domains run independently.
    pub async fn sync(&self, domain: EventDomain) -> Result<SyncReport> {
        let slot = self.slot(domain)?;
        let _running = slot.running.lock().await;
        self.engine.run(slot.strategy, &slot.progress).await
    }

    /// Sync one domain, starting a fresh run after each transient failure
    /// until `policy` gives up.
    ///
    /// # Errors
    /// - The first non-transient error
    /// - The last error once `policy.max_retries` retries have been spent
    pub async fn sync_with_retry(
        &self,
        domain: EventDomain,
        policy: &RetryPolicy,
    ) -> Result<SyncReport> {
        let mut attempt = 0;
        loop {
            match self.sync(domain).await {
                Ok(report) => {
                    if attempt > 0 {
                        info!("Sync of {} succeeded on attempt {}", domain, attempt + 1);
                    }
                    return Ok(report);
                }
                Err(e) if policy.should_retry(attempt, &e) => {
                    let delay = policy.delay(attempt);
                    attempt += 1;
                    warn!(
                        "Sync of {} failed on attempt {}: {}. Retrying in {:?}",
                        domain, attempt, e, delay
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sync every domain in turn. A failing domain does not stop the others.
    pub async fn sync_all(&self) -> Vec<(EventDomain, Result<SyncReport>)> {
        let mut results = Vec::with_capacity(EventDomain::ALL.len());
        for domain in EventDomain::ALL {
            let result = self.sync(domain).await;
            if let Err(e) = &result {
                warn!("Continuing after failed sync of {}: {}", domain, e);
            }
            results.push((domain, result));
        }
        results
    }

    /// Progress sink of a domain.
    pub fn progress(&self, domain: EventDomain) -> Result<&ProgressSink> {
        Ok(&self.slot(domain)?.progress)
    }

    /// Remove every local entity of every kind in one commit.
    ///
    /// Waits for running syncs so a run cannot re-insert entities after the
    /// wipe.
    pub async fn sign_out(&self) -> Result<SaveSummary> {
        let mut guards = Vec::with_capacity(EventDomain::ALL.len());
        for domain in EventDomain::ALL {
            guards.push(self.slot(domain)?.running.lock().await);
        }

        let store = self.engine.store();
        let result = async {
            for kind in EventKind::ALL {
                store.delete(kind, EventFilter::All).await?;
            }
            store.save_all().await
        }
        .await;
        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                for kind in EventKind::ALL {
                    if let Err(rollback) = store.rollback(kind).await {
                        warn!("Failed to discard staged {} deletes: {}", kind.as_str(), rollback);
                    }
                }
                return Err(e);
            }
        };

        info!("Signed out, removed {} local items", summary.deleted);
        Ok(summary)
    }

    /// Committed entity count per kind.
    pub async fn counts(&self) -> Result<Vec<(EventKind, usize)>> {
        let store = self.engine.store();
        let mut counts = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            counts.push((kind, store.count(kind).await?));
        }
        Ok(counts)
    }

    /// Committed entities of a domain, oldest first.
    pub async fn events(&self, domain: EventDomain) -> Result<Vec<LocalEvent>> {
        self.engine
            .store()
            .fetch(domain.kind(), EventFilter::All)
            .await
    }

    /// Committed entities of a domain with the given ids, oldest first.
    /// Unknown ids are skipped.
    pub async fn get(&self, domain: EventDomain, ids: HashSet<Uuid>) -> Result<Vec<LocalEvent>> {
        self.engine
            .store()
            .fetch(domain.kind(), EventFilter::Ids(ids))
            .await
    }
}
