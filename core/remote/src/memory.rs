//! In-memory event source for testing and offline fixtures.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use pinsync_common::{Error, EventDomain, Result};

use crate::source::{EventEnvelope, EventPage, EventSource, SortOrder};

/// A request observed by the memory source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub domain: EventDomain,
    pub page: u64,
    pub size: u64,
}

#[derive(Default)]
struct Inner {
    events: HashMap<EventDomain, Vec<EventEnvelope>>,
    requests: Vec<PageRequest>,
    failing_pages: HashSet<(EventDomain, u64, u64)>,
}

/// In-memory event source.
///
/// Useful for testing and offline work. Events are served in creation-time
/// order using the same offset paging as the remote API, every request is
/// recorded, and individual pages can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryEventSource {
    inner: Arc<RwLock<Inner>>,
}

/// On-disk fixture layout: one entry per domain.
#[derive(Deserialize)]
struct FixtureDomain {
    domain: EventDomain,
    #[serde(default)]
    events: Vec<EventEnvelope>,
}

impl MemoryEventSource {
    /// Create a new empty memory source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load events from a JSON fixture file.
    ///
    /// The file holds an array of `{"domain": "AI_MIC", "events": [...]}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let fixture: Vec<FixtureDomain> = serde_json::from_str(&content)
            .map_err(|e| Error::Decode(format!("Invalid event fixture: {}", e)))?;

        let source = Self::new();
        for entry in fixture {
            source.set_events(entry.domain, entry.events);
        }
        Ok(source)
    }

    /// Replace the full listing for a domain.
    pub fn set_events(&self, domain: EventDomain, events: Vec<EventEnvelope>) {
        let mut inner = self.inner.write().unwrap();
        inner.events.insert(domain, events);
    }

    /// Append one event to a domain.
    pub fn push_event(&self, domain: EventDomain, event: EventEnvelope) {
        let mut inner = self.inner.write().unwrap();
        inner.events.entry(domain).or_default().push(event);
    }

    /// Remove an event from a domain. Returns whether it existed.
    pub fn remove_event(&self, domain: EventDomain, id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        let Some(events) = inner.events.get_mut(&domain) else {
            return false;
        };
        let before = events.len();
        events.retain(|e| e.id != id);
        events.len() != before
    }

    /// Make every request for `(domain, page, size)` fail with a network error.
    pub fn fail_page(&self, domain: EventDomain, page: u64, size: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.failing_pages.insert((domain, page, size));
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        self.inner.write().unwrap().failing_pages.clear();
    }

    /// Requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<PageRequest> {
        self.inner.read().unwrap().requests.clone()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.inner.write().unwrap().requests.clear();
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_events(
        &self,
        domain: EventDomain,
        page: u64,
        size: u64,
        sort: SortOrder,
    ) -> Result<EventPage> {
        if size == 0 {
            return Err(Error::InvalidInput("Page size must be positive".to_string()));
        }

        let mut inner = self.inner.write().unwrap();
        inner.requests.push(PageRequest { domain, page, size });

        if inner.failing_pages.contains(&(domain, page, size)) {
            return Err(Error::Network(format!(
                "Injected failure for {} page {} (size {})",
                domain, page, size
            )));
        }

        let mut events = inner.events.get(&domain).cloned().unwrap_or_default();
        events.sort_by(|a, b| {
            a.event_creation_time
                .cmp(&b.event_creation_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        if sort == SortOrder::CreationTimeDesc {
            events.reverse();
        }

        let total = events.len() as u64;
        let start = page.saturating_mul(size).min(total) as usize;
        let end = page.saturating_add(1).saturating_mul(size).min(total) as usize;

        Ok(EventPage {
            content: events[start..end].to_vec(),
            total_elements: total,
            total_pages: Some(total.div_ceil(size)),
            number: Some(page),
            size: Some(size),
        })
    }
}
