//! Render pool - Bounded fan-out of external render invocations
//!
//! Each worker owns one render subprocess at a time. Results arrive in
//! completion order and are re-sorted by plan index before being returned.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use chrono::Utc;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{info, warn};

use crate::backends::exec::{run_tool, ExecContext, ToolCommand, ToolLog};
use crate::cache::source::identifier_key;
use crate::core::error::{ReelError, Result};
use crate::core::util::{is_regular_file, CancelToken};
use crate::render::fingerprint::{RenderConfig, Segment};
use crate::render::state::SegmentState;

/// One segment to render
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub index: usize,
    pub segment: Segment,
    pub input_hash: String,
}

#[derive(Debug)]
pub struct RenderOutcome {
    pub index: usize,
    pub output_path: String,
    pub log: PathBuf,
    pub result: Result<SegmentState>,
}

/// Substitute `{input}`, `{output}` and `{duration}` into the configured command
pub fn build_command(cfg: &RenderConfig, segment: &Segment) -> Result<ToolCommand> {
    let mut parts = cfg.command.iter().map(|part| {
        part.replace("{input}", &segment.source_identity)
            .replace("{output}", &segment.output_path)
            .replace("{duration}", &segment.duration_s.to_string())
    });
    let program = parts
        .next()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ReelError::validation("render command is empty"))?;
    Ok(ToolCommand::new(program).args(parts))
}

pub struct RenderPool {
    pool: ThreadPool,
}

impl RenderPool {
    /// `workers == 0` sizes the pool to the logical CPU count
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("reel-render-{}", i))
            .build()
            .map_err(|e| ReelError::Io(std::io::Error::other(e)))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run(
        &self,
        cfg: &RenderConfig,
        jobs: Vec<RenderJob>,
        cancel: &CancelToken,
        logs_dir: &Path,
    ) -> Vec<RenderOutcome> {
        let (tx, rx) = mpsc::channel();
        self.pool.scope(|scope| {
            for job in jobs {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let _ = tx.send(render_one(cfg, job, cancel, logs_dir));
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<RenderOutcome> = rx.into_iter().collect();
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}

fn render_one(cfg: &RenderConfig, job: RenderJob, cancel: &CancelToken, logs_dir: &Path) -> RenderOutcome {
    let output_path = job.segment.output_path.clone();
    let log_path = logs_dir.join(format!("render-{}.log", identifier_key(&output_path)));
    let result = render_segment(cfg, &job, cancel, &log_path);

    match &result {
        Ok(_) => info!(index = job.index, output = %output_path, "rendered"),
        Err(e) => warn!(index = job.index, output = %output_path, error = %e, "render failed"),
    }
    RenderOutcome {
        index: job.index,
        output_path,
        log: log_path,
        result,
    }
}

/// A failed or interrupted render may leave a truncated file behind
fn discard_partial(output: &Path, log: &ToolLog) {
    if !output.exists() {
        return;
    }
    match std::fs::remove_file(output) {
        Ok(()) => log.note(&format!("removed partial output {}", output.display())),
        Err(e) => warn!(output = %output.display(), error = %e, "could not remove partial output"),
    }
}

fn render_segment(
    cfg: &RenderConfig,
    job: &RenderJob,
    cancel: &CancelToken,
    log_path: &Path,
) -> Result<SegmentState> {
    if cancel.is_cancelled() {
        return Err(ReelError::Cancelled);
    }
    let command = build_command(cfg, &job.segment)?;
    let log = ToolLog::create(log_path, &job.segment.output_path)?;

    let output = Path::new(&job.segment.output_path);
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let ctx = ExecContext::new(cancel.clone());
    let ran = run_tool(&ctx, "render", &command, Some(&log))
        .and_then(|out| out.require_success(&command.program, Some(&log)));
    if let Err(e) = ran {
        discard_partial(output, &log);
        return Err(e);
    }

    if !is_regular_file(output) {
        log.note("render exited successfully but produced no output");
        return Err(ReelError::tool(
            &command.program,
            format!("no output written to {}", output.display()),
            Some(log_path.to_path_buf()),
        ));
    }

    Ok(SegmentState {
        input_hash: job.input_hash.clone(),
        rendered_at: Utc::now(),
        source_path: job.segment.source_identity.clone(),
        duration_s: job.segment.duration_s,
    })
}
