//! Remote event source abstraction for PinSync.
//!
//! This module provides a trait-based interface over the paginated,
//! read-only event history API and a registry for resolving a source by
//! name and configuration.
//!
//! # Design Principles
//! - Read-only: sources never mutate remote state
//! - Async operations: every fetch is a suspension point
//! - Unified error semantics: transport failures are `Error::Network`,
//!   malformed bodies are `Error::Decode`

pub mod http;
pub mod memory;
pub mod registry;
pub mod source;

pub use http::{HttpEventSource, HttpSourceConfig};
pub use memory::{MemoryEventSource, PageRequest};
pub use registry::{SourceFactory, SourceRegistry, create_default_registry};
pub use source::{EventEnvelope, EventPage, EventSource, SortOrder};
