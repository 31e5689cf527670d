//! Exec module - Cancellable external tool invocation
//!
//! Every downloader, prober and renderer invocation goes through [`run_tool`].
//! The child is polled until it exits; if the caller's [`CancelToken`] fires
//! or an explicit deadline passes, the child is killed and an error returned.
//! There is no implicit timeout.
//!
//! Each invocation can append a section to a [`ToolLog`], a plain-text file
//! kept next to the cache for post-hoc debugging:
//!
//! ```text
//! # Task: probe
//! # Command: ffprobe -v error -print_format json ...
//! # Exit Code: Some(0)
//! # Duration: 41ms
//! # Success: true
//!
//! ## STDOUT:
//! {...}
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::error::{ReelError, Result};
use crate::core::util::CancelToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cancellation and optional deadline carried by every external invocation
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl ExecContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Impose a deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| Instant::now() + t);
        self
    }
}

/// An external command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(' ') {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl ToolOutput {
    /// Convert a non-zero exit into a tool error carrying the stderr tail and log path
    pub fn require_success(self, tool: &str, log: Option<&ToolLog>) -> Result<ToolOutput> {
        if self.success {
            return Ok(self);
        }
        let tail = stderr_tail(&self.stderr, 3);
        let message = if tail.is_empty() {
            format!("exit code {:?}", self.exit_code)
        } else {
            format!("exit code {:?}: {}", self.exit_code, tail)
        };
        Err(ReelError::tool(tool, message, log.map(|l| l.path().to_path_buf())))
    }
}

fn stderr_tail(stderr: &str, lines: usize) -> String {
    let collected: Vec<&str> = stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join(" | ")
}

/// Deterministic per-row log file
#[derive(Debug, Clone)]
pub struct ToolLog {
    path: PathBuf,
}

impl ToolLog {
    /// Create (or truncate) the log at `path`
    pub fn create(path: &Path, title: &str) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        writeln!(file, "# Row: {}", title)?;
        writeln!(file, "# Started: {}", chrono::Utc::now().to_rfc3339())?;
        writeln!(file)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, content: &str) {
        let written = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(content.as_bytes()));
        if let Err(e) = written {
            warn!(log = %self.path.display(), error = %e, "could not append to tool log");
        }
    }

    /// Append a free-form note line
    pub fn note(&self, message: &str) {
        self.append(&format!("# Note: {}\n", message));
    }

    /// Append one invocation section
    pub fn record(&self, task: &str, command: &ToolCommand, result: &ToolOutput) {
        let mut content = format!(
            "# Task: {}\n# Command: {}\n# Exit Code: {:?}\n# Duration: {}ms\n# Success: {}\n\n## STDOUT:\n{}\n",
            task,
            command.display(),
            result.exit_code,
            result.duration_ms,
            result.success,
            result.stdout
        );
        if !result.stderr.is_empty() {
            content.push_str(&format!("\n## STDERR:\n{}\n", result.stderr));
        }
        content.push('\n');
        self.append(&content);
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut s = String::new();
        if let Some(mut r) = reader {
            let mut buf = Vec::new();
            if r.read_to_end(&mut buf).is_ok() {
                s = String::from_utf8_lossy(&buf).to_string();
            }
        }
        s
    })
}

/// errno for "text file busy" on Linux and macOS
const ETXTBSY: i32 = 26;

/// Spawn with piped output, retrying briefly on ETXTBSY (a freshly written executable
/// may still be held open by a concurrently forked process)
fn spawn(command: &ToolCommand) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        let result = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        match result {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempts < 5 => {
                attempts += 1;
                thread::sleep(POLL_INTERVAL);
            }
            other => return other,
        }
    }
}

/// Run `command` to completion, honoring cancellation and the optional deadline
///
/// A non-zero exit is returned as `Ok` with `success == false`; use
/// [`ToolOutput::require_success`] to turn it into an error.
pub fn run_tool(
    ctx: &ExecContext,
    task: &str,
    command: &ToolCommand,
    log: Option<&ToolLog>,
) -> Result<ToolOutput> {
    if ctx.cancel.is_cancelled() {
        return Err(ReelError::Cancelled);
    }

    let start = Instant::now();
    debug!(task, command = %command.display(), "spawning tool");

    let mut child = spawn(command).map_err(|e| {
        if let Some(log) = log {
            log.note(&format!("{}: failed to start {}: {}", task, command.program, e));
        }
        ReelError::tool(
            &command.program,
            format!("failed to start: {}", e),
            log.map(|l| l.path().to_path_buf()),
        )
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                let cancelled = ctx.cancel.is_cancelled();
                let expired = ctx.deadline.map(|d| Instant::now() >= d).unwrap_or(false);
                if cancelled || expired {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout.join();
                    let _ = stderr.join();
                    let reason = if cancelled { "cancelled" } else { "deadline exceeded" };
                    if let Some(log) = log {
                        log.note(&format!("{}: {} after {}ms", task, reason, start.elapsed().as_millis()));
                    }
                    warn!(task, reason, "tool killed");
                    return Err(if cancelled {
                        ReelError::Cancelled
                    } else {
                        ReelError::tool(
                            &command.program,
                            "deadline exceeded",
                            log.map(|l| l.path().to_path_buf()),
                        )
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                return Err(ReelError::tool(
                    &command.program,
                    format!("failed to wait for process: {}", e),
                    log.map(|l| l.path().to_path_buf()),
                ));
            }
        }
    };

    let output = ToolOutput {
        exit_code: status.code(),
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: status.success(),
    };

    if let Some(log) = log {
        log.record(task, command, &output);
    }
    debug!(task, exit_code = ?output.exit_code, duration_ms = output.duration_ms, "tool finished");

    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_run_tool_captures_output_and_logs() {
        let temp = tempdir().unwrap();
        let log = ToolLog::create(&temp.path().join("logs/row.log"), "row-1").unwrap();

        let output = run_tool(&ExecContext::default(), "echo", &sh("echo hello; echo oops >&2"), Some(&log))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");

        let content = fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("# Row: row-1"));
        assert!(content.contains("# Task: echo"));
        assert!(content.contains("## STDERR:"));
    }

    #[test]
    fn test_non_zero_exit_becomes_tool_error() {
        let temp = tempdir().unwrap();
        let log = ToolLog::create(&temp.path().join("row.log"), "row").unwrap();
        let output = run_tool(&ExecContext::default(), "fail", &sh("echo bad >&2; exit 3"), Some(&log))
            .unwrap();
        assert!(!output.success);

        let err = output.require_success("fake", Some(&log)).unwrap_err();
        match err {
            ReelError::ToolExecution { tool, message, log: Some(path) } => {
                assert_eq!(tool, "fake");
                assert!(message.contains("bad"));
                assert_eq!(path, temp.path().join("row.log"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_program_is_tool_error() {
        let err = run_tool(
            &ExecContext::default(),
            "missing",
            &ToolCommand::new("/definitely/not/here"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::ToolExecution { .. }));
    }

    #[test]
    fn test_pre_cancelled_context_does_not_spawn() {
        let ctx = ExecContext::default();
        ctx.cancel.cancel();
        let err = run_tool(&ctx, "sleep", &sh("sleep 5"), None).unwrap_err();
        assert!(matches!(err, ReelError::Cancelled));
    }

    #[test]
    fn test_cancel_kills_running_child() {
        let ctx = ExecContext::default();
        let token = ctx.cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            token.cancel();
        });

        let start = Instant::now();
        let err = run_tool(&ctx, "sleep", &sh("exec sleep 10"), None).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, ReelError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_kills_running_child() {
        let ctx = ExecContext::default().with_timeout(Some(Duration::from_millis(100)));
        let err = run_tool(&ctx, "sleep", &sh("exec sleep 10"), None).unwrap_err();
        match err {
            ReelError::ToolExecution { message, .. } => assert!(message.contains("deadline")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_etxtbsy_is_text_file_busy() {
        let err = std::io::Error::from_raw_os_error(ETXTBSY);
        assert!(err.to_string().to_lowercase().contains("text file busy"));
    }

    #[test]
    fn test_command_display_quotes_spaces() {
        let cmd = ToolCommand::new("ffprobe").args(["-i", "my clip.mp4"]);
        assert_eq!(cmd.display(), "ffprobe -i 'my clip.mp4'");
    }
}
