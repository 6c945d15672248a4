//! PinSync Sync Engine
//!
//! Mirrors remote event domains into a local store:
//! - Probe, first page, then bounded concurrent page fetches
//! - Reconciliation of entities the remote no longer lists
//! - Progress reporting through a single updater task
//! - Whole-run retry with a doubling, jittered delay

pub mod decoder;
pub mod engine;
pub mod progress;
pub mod retry;
pub mod service;
pub mod strategy;

// Re-export main types
pub use decoder::DecodeFn;
pub use engine::{PagePlan, SyncConfig, SyncEngine, SyncReport, MAX_CONCURRENT_PAGES};
pub use progress::{ProgressEvent, ProgressReporter, ProgressSink, ProgressUpdater, SyncProgress};
pub use retry::RetryPolicy;
pub use service::SyncService;
pub use strategy::{SyncStrategy, STRATEGIES};
