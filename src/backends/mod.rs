//! Backends module - External tool integrations
//!
//! Provides:
//! - exec: cancellable subprocess runner and per-row tool logs
//! - ytdlp: yt-dlp downloader
//! - ffprobe: ffprobe metadata prober
//! - doctor: dependency checking

pub mod doctor;
pub mod exec;
pub mod ffprobe;
pub mod ytdlp;
