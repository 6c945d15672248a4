//! Local event store for PinSync.
//!
//! Holds the four local event entity variants and a transactional store
//! abstraction with two backends:
//! - `MemoryStore` for tests and ephemeral sessions
//! - `SqliteStore` for persistent on-device storage
//!
//! Writes are staged and only become visible to readers on `save`, which
//! applies the staged operations atomically.

pub mod entity;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use entity::{AiMicEvent, LocalEvent, MusicEvent, PhoneCallEvent, TranslationEvent};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{EventFilter, EventStore, SaveSummary};
