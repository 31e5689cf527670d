//! Cache module - Source cache under `.reel/` and the shared library
//!
//! Provides:
//! - source: reference classification and identifier keys
//! - index: persisted entries and links
//! - store: atomic JSON persistence
//! - fetch: download/copy and probe with injected tools
//! - resolve: the per-row resolve state machine
//! - migrate: reconciliation between the project cache and a shared library

pub mod fetch;
pub mod index;
pub mod migrate;
pub mod resolve;
pub mod source;
pub mod store;
