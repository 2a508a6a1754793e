// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod clock;
pub mod config;
pub mod registry;

// Fetching: strategies, per-source orchestration, caches, retry
pub mod ingest;

pub mod health;
pub mod recency;

pub mod model;
pub mod curate;
pub mod engine;
pub mod merge;

// HTTP surface
pub mod api;
pub mod metrics;

pub use crate::api::router;
pub use crate::engine::DiscoveryEngine;
pub use crate::model::{CuratedItem, DiscoveryResult};
