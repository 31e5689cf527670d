//! Render flows - Plan inspection and incremental rendering

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::core::config::Settings;
use crate::core::error::ReelError;
use crate::core::model::{Kind, Meta, Record, RecordSet};
use crate::core::output::{OutputConfig, Renderer};
use crate::core::util::CancelToken;
use crate::render::detect::{detect_changes, Action, PlannedAction};
use crate::render::fingerprint::global_config_hash;
use crate::render::plan::RenderPlan;
use crate::render::pool::{RenderJob, RenderOutcome, RenderPool};
use crate::render::state::RenderState;

fn action_record(plan: &RenderPlan, action: &PlannedAction) -> Record {
    let segment = &plan.segments[action.index];
    Record::new(Kind::Action)
        .with_id(action.input_hash.clone())
        .with_path(action.output_path.clone())
        .with_status(action.action.label())
        .with_data(serde_json::json!({
            "index": action.index,
            "reason": action.action.reason(),
            "source": segment.source_identity,
        }))
        .with_meta(Meta {
            duration_s: Some(segment.duration_s),
            ..Default::default()
        })
}

fn summary(render: usize, skip: usize, extra: serde_json::Value) -> Record {
    let mut data = serde_json::json!({ "render": render, "skip": skip });
    if let (Some(obj), serde_json::Value::Object(more)) = (data.as_object_mut(), extra) {
        obj.extend(more);
    }
    Record::new(Kind::Summary).with_data(data)
}

/// Classify every segment of `plan` against the stored state
pub fn plan_records(plan: &RenderPlan, state: &RenderState, force: bool) -> (Vec<PlannedAction>, RecordSet) {
    let actions = detect_changes(
        state,
        &plan.segments,
        &plan.config,
        &plan.filename_template,
        force,
    );
    let records = actions.iter().map(|a| action_record(plan, a)).collect();
    (actions, records)
}

/// Run the plan command
pub fn run_plan(
    settings: &Settings,
    plan_path: &Path,
    force: bool,
    prune: bool,
    config: OutputConfig,
) -> Result<()> {
    let plan = RenderPlan::load(plan_path, &settings.root)?;
    let state_path = settings.cache.render_state_path();
    let mut state = RenderState::load(&state_path)?;

    let (actions, mut records) = plan_records(&plan, &state, force);
    let render = actions.iter().filter(|a| a.action.is_render()).count();

    let pruned = if prune {
        let removed = state.prune(&plan.output_keys());
        if !removed.is_empty() {
            state
                .save(&state_path)
                .with_context(|| format!("Failed to save render state {}", state_path.display()))?;
        }
        removed
    } else {
        Vec::new()
    };

    records.push(summary(
        render,
        actions.len() - render,
        serde_json::json!({ "pruned": pruned }),
    ));
    Renderer::with_config(config).print(&records);
    Ok(())
}

fn outcome_record(plan: &RenderPlan, action: &PlannedAction, outcome: &RenderOutcome) -> Record {
    let mut record = action_record(plan, action);
    match &outcome.result {
        Ok(_) => record.with_status("rendered"),
        Err(e) => {
            record = record.with_status("failed").with_error(e.to_issue());
            if let Some(data) = record.data.as_mut().and_then(|d| d.as_object_mut()) {
                data.insert(
                    "log".to_string(),
                    serde_json::Value::String(outcome.log.to_string_lossy().to_string()),
                );
            }
            record
        }
    }
}

/// Render stale segments and commit the results once
///
/// Returns the records in plan order and the number of failed segments.
/// A cancelled batch commits nothing.
pub fn render_plan(
    settings: &Settings,
    plan: &RenderPlan,
    force: bool,
    workers: Option<usize>,
    cancel: &CancelToken,
) -> Result<(RecordSet, usize)> {
    let state_path = settings.cache.render_state_path();
    let mut state = RenderState::load(&state_path)?;
    let before = state.clone();

    let actions = detect_changes(
        &state,
        &plan.segments,
        &plan.config,
        &plan.filename_template,
        force,
    );
    let jobs: Vec<RenderJob> = actions
        .iter()
        .filter(|a| a.action.is_render())
        .map(|a| RenderJob {
            index: a.index,
            segment: plan.segments[a.index].clone(),
            input_hash: a.input_hash.clone(),
        })
        .collect();

    let pool = RenderPool::new(workers.unwrap_or(plan.config.workers))?;
    info!(jobs = jobs.len(), workers = pool.workers(), "rendering");
    let outcomes = pool.run(&plan.config, jobs, cancel, &settings.cache.logs_dir());

    if cancel.is_cancelled()
        || outcomes
            .iter()
            .any(|o| matches!(o.result, Err(ReelError::Cancelled)))
    {
        bail!("Render cancelled; render state left unchanged");
    }

    let rendered = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|s| (o.output_path.clone(), s.clone())))
        .collect();
    state.commit(&global_config_hash(&plan.config), rendered);
    for failed in outcomes.iter().filter(|o| o.result.is_err()) {
        state.forget(&failed.output_path);
    }
    state.prune(&plan.output_keys());
    if state != before {
        state
            .save(&state_path)
            .with_context(|| format!("Failed to save render state {}", state_path.display()))?;
    }

    let by_index: HashMap<usize, &RenderOutcome> = outcomes.iter().map(|o| (o.index, o)).collect();
    let mut records = RecordSet::new();
    let mut failed = 0;
    for action in &actions {
        match (action.action, by_index.get(&action.index)) {
            (Action::Render(_), Some(outcome)) => {
                if outcome.result.is_err() {
                    failed += 1;
                }
                records.push(outcome_record(plan, action, outcome));
            }
            _ => records.push(action_record(plan, action)),
        }
    }
    let render = outcomes.len();
    records.push(summary(
        render - failed,
        actions.len() - render,
        serde_json::json!({ "failed": failed }),
    ));
    Ok((records, failed))
}

/// Run the render command
pub fn run_render(
    settings: &Settings,
    plan_path: &Path,
    force: bool,
    workers: Option<usize>,
    config: OutputConfig,
) -> Result<()> {
    let plan = RenderPlan::load(plan_path, &settings.root)?;
    let (records, failed) = render_plan(settings, &plan, force, workers, &CancelToken::new())?;
    Renderer::with_config(config).print(&records);

    if failed > 0 {
        bail!("{} segment(s) failed to render", failed);
    }
    Ok(())
}
