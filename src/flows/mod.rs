//! Flows module - Command handlers combining cache, render and backends
//!
//! Provides:
//! - resolve: batch resolution into the project cache
//! - cache: list, show and prune index entries
//! - migrate: move the project cache into a shared library
//! - render: plan inspection and incremental rendering

pub mod cache;
pub mod migrate;
pub mod render;
pub mod resolve;
