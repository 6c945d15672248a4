//! Common utilities and types shared across PinSync modules.
//!
//! This module provides the error taxonomy and the event domain tags that
//! every other crate in the workspace agrees on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EventDomain, EventKind};
