//! Render module - Staleness detection and incremental rendering
//!
//! Provides:
//! - fingerprint: global and per-segment input digests
//! - state: persisted output fingerprints
//! - detect: Skip/Render classification
//! - plan: render plan loading
//! - pool: bounded worker pool running the external renderer

pub mod detect;
pub mod fingerprint;
pub mod plan;
pub mod pool;
pub mod state;
