//! HTTP event source for the notable-events API.
//!
//! This module provides the production backend:
//! - Bearer-token authorization from configuration
//! - Paged `GET /notable-events/mydata` requests
//! - Status-code mapping onto the common error taxonomy

pub mod client;

pub use client::{HttpEventSource, HttpSourceConfig, create_http_source};
