//! ffprobe integration
//!
//! Calls the prober with JSON output and parses `format` and `streams` into
//! [`ProbeMetadata`]. Optional fields may be absent; an unparseable duration
//! reads as 0.0. Anything without a `format` object and a `streams` array is
//! a probe failure.

use std::path::Path;

use serde_json::Value;

use crate::backends::exec::{run_tool, ExecContext, ToolCommand, ToolLog};
use crate::cache::fetch::Prober;
use crate::cache::index::ProbeMetadata;
use crate::core::error::{ReelError, Result};

/// Prober backed by an ffprobe-compatible executable
#[derive(Debug, Clone)]
pub struct FfProbe {
    program: String,
}

impl FfProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, path: &Path) -> ToolCommand {
        ToolCommand::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path.to_string_lossy())
    }
}

impl Prober for FfProbe {
    fn probe(&self, ctx: &ExecContext, path: &Path, log: &ToolLog) -> Result<ProbeMetadata> {
        let output = run_tool(ctx, "probe", &self.command(path), Some(log))?
            .require_success(&self.program, Some(log))?;

        parse_probe_output(&output.stdout).map_err(|message| {
            log.note(&format!("probe output rejected: {}", message));
            ReelError::tool(&self.program, message, Some(log.path().to_path_buf()))
        })
    }
}

fn parse_duration(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Parse prober JSON into metadata
pub fn parse_probe_output(stdout: &str) -> std::result::Result<ProbeMetadata, String> {
    if stdout.trim().is_empty() {
        return Err("empty probe output".to_string());
    }

    let raw: Value =
        serde_json::from_str(stdout).map_err(|e| format!("unparseable probe output: {}", e))?;

    let format = raw
        .get("format")
        .filter(|f| f.is_object())
        .ok_or_else(|| "probe output has no format object".to_string())?;
    let streams = raw
        .get("streams")
        .filter(|s| s.is_array())
        .ok_or_else(|| "probe output has no streams array".to_string())?;

    let text = |key: &str| {
        format
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(ProbeMetadata {
        format_name: text("format_name"),
        format_long_name: text("format_long_name"),
        duration_s: parse_duration(format.get("duration")),
        streams_raw: streams.clone(),
        format_raw: format.clone(),
        raw,
    })
}
