//! Remote event source trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pinsync_common::{EventDomain, Result};

/// A single remote event record.
///
/// The payload in `event_data` is domain-specific and left undecoded here;
/// turning it into a local entity is the decoder's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Stable unique identifier of the event.
    pub id: Uuid,
    /// When the device recorded the event.
    pub event_creation_time: DateTime<Utc>,
    /// Remote type label (e.g. "AI_MIC_INTERACTION").
    #[serde(default)]
    pub event_type: Option<String>,
    /// Domain-specific payload.
    #[serde(default)]
    pub event_data: serde_json::Value,
}

/// One page of a paginated event listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events on this page.
    #[serde(default)]
    pub content: Vec<EventEnvelope>,
    /// Total number of events in the domain across all pages.
    pub total_elements: u64,
    /// Total number of pages at the requested size.
    #[serde(default)]
    pub total_pages: Option<u64>,
    /// Zero-based index of this page.
    #[serde(default)]
    pub number: Option<u64>,
    /// Requested page size.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Sort order for event listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Oldest first. Gives deterministic paging while new events arrive.
    #[default]
    CreationTimeAsc,
    /// Newest first.
    CreationTimeDesc,
}

impl SortOrder {
    /// Value sent as the `sort` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            SortOrder::CreationTimeAsc => "eventCreationTime,ASC",
            SortOrder::CreationTimeDesc => "eventCreationTime,DESC",
        }
    }
}

/// Paginated, read-only source of event history.
///
/// Pages are zero-based and offset-indexed: page `p` at size `s` covers
/// listing positions `p * s .. (p + 1) * s`.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Get the source name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Fetch one page of events for a domain.
    ///
    /// # Postconditions
    /// - `total_elements` reflects the whole domain, not just this page
    /// - `content` has at most `size` items
    ///
    /// # Errors
    /// - `Network` for transport or HTTP failures
    /// - `Authentication` if credentials were rejected
    /// - `Decode` if the response body is malformed
    async fn fetch_events(
        &self,
        domain: EventDomain,
        page: u64,
        size: u64,
        sort: SortOrder,
    ) -> Result<EventPage>;
}
