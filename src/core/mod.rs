//! Core module - Shared plumbing for every command
//!
//! This module provides:
//! - Error taxonomy (ReelError)
//! - Unified record model and output rendering
//! - Settings and cache directory layout
//! - Logging setup
//! - Path and hashing utilities

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod output;
pub mod paths;
pub mod util;
