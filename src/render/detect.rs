//! Change detection - Classify each planned segment as Skip or Render

use std::path::Path;

use serde::Serialize;

use crate::render::fingerprint::{global_config_hash, segment_input_hash, RenderConfig, Segment};
use crate::render::state::RenderState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Forced,
    New,
    ConfigChanged,
    InputChanged,
    OutputMissing,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Forced => "forced",
            Reason::New => "new",
            Reason::ConfigChanged => "config_changed",
            Reason::InputChanged => "input_changed",
            Reason::OutputMissing => "output_missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Render(Reason),
}

impl Action {
    pub fn is_render(&self) -> bool {
        matches!(self, Action::Render(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Skip => "skip",
            Action::Render(_) => "render",
        }
    }

    pub fn reason(&self) -> Option<Reason> {
        match self {
            Action::Skip => None,
            Action::Render(reason) => Some(*reason),
        }
    }
}

/// Decision for one segment, in plan order
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub index: usize,
    pub output_path: String,
    pub input_hash: String,
    pub action: Action,
}

/// First matching rule wins: forced, new, config changed, input changed,
/// output missing; otherwise skip
pub fn detect_changes(
    state: &RenderState,
    segments: &[Segment],
    cfg: &RenderConfig,
    template: &str,
    force: bool,
) -> Vec<PlannedAction> {
    let global_hash = global_config_hash(cfg);

    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let input_hash = segment_input_hash(segment, template);
            let action = match state.get(&segment.output_path) {
                _ if force => Action::Render(Reason::Forced),
                None => Action::Render(Reason::New),
                Some(_) if state.global_config_hash != global_hash => {
                    Action::Render(Reason::ConfigChanged)
                }
                Some(stored) if stored.input_hash != input_hash => {
                    Action::Render(Reason::InputChanged)
                }
                Some(_) if !Path::new(&segment.output_path).exists() => {
                    Action::Render(Reason::OutputMissing)
                }
                Some(_) => Action::Skip,
            };
            PlannedAction {
                index,
                output_path: segment.output_path.clone(),
                input_hash,
                action,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::state::SegmentState;
    use chrono::Utc;
    use std::fs;
    use tempfile::tempdir;

    fn segment(output: &Path) -> Segment {
        Segment {
            source_identity: "/media/a.mp4".to_string(),
            output_path: output.to_string_lossy().to_string(),
            duration_s: 5.0,
            ..Default::default()
        }
    }

    fn rendered(cfg: &RenderConfig, seg: &Segment, template: &str) -> RenderState {
        let mut state = RenderState::default();
        state.commit(
            &global_config_hash(cfg),
            vec![(
                seg.output_path.clone(),
                SegmentState {
                    input_hash: segment_input_hash(seg, template),
                    rendered_at: Utc::now(),
                    source_path: seg.source_identity.clone(),
                    duration_s: seg.duration_s,
                },
            )],
        );
        state
    }

    #[test]
    fn test_unchanged_then_output_deleted() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("a.mp4");
        fs::write(&out, "rendered").unwrap();
        let cfg = RenderConfig::default();
        let seg = segment(&out);
        let state = rendered(&cfg, &seg, "{title}.mp4");

        let actions = detect_changes(&state, &[seg.clone()], &cfg, "{title}.mp4", false);
        assert_eq!(actions[0].action, Action::Skip);

        fs::remove_file(&out).unwrap();
        let actions = detect_changes(&state, &[seg], &cfg, "{title}.mp4", false);
        assert_eq!(actions[0].action, Action::Render(Reason::OutputMissing));
    }

    #[test]
    fn test_new_segment() {
        let temp = tempdir().unwrap();
        let seg = segment(&temp.path().join("a.mp4"));
        let actions = detect_changes(&RenderState::default(), &[seg], &RenderConfig::default(), "", false);
        assert_eq!(actions[0].action, Action::Render(Reason::New));
        assert_eq!(actions[0].index, 0);
    }

    #[test]
    fn test_force_wins() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("a.mp4");
        fs::write(&out, "x").unwrap();
        let cfg = RenderConfig::default();
        let seg = segment(&out);
        let state = rendered(&cfg, &seg, "");
        let actions = detect_changes(&state, &[seg], &cfg, "", true);
        assert_eq!(actions[0].action, Action::Render(Reason::Forced));
    }

    #[test]
    fn test_config_change_precedes_input_change() {
        let temp = tempdir().unwrap();
        let out = temp.path().join("a.mp4");
        fs::write(&out, "x").unwrap();
        let cfg = RenderConfig::default();
        let mut seg = segment(&out);
        let state = rendered(&cfg, &seg, "");

        seg.duration_s = 9.0;
        let actions = detect_changes(&state, &[seg.clone()], &cfg, "", false);
        assert_eq!(actions[0].action, Action::Render(Reason::InputChanged));

        let mut cfg2 = cfg.clone();
        cfg2.codec.video_codec = "libx265".to_string();
        let actions = detect_changes(&state, &[seg], &cfg2, "", false);
        assert_eq!(actions[0].action, Action::Render(Reason::ConfigChanged));
    }

    #[test]
    fn test_input_change_precedes_missing_output() {
        let temp = tempdir().unwrap();
        let cfg = RenderConfig::default();
        let mut seg = segment(&temp.path().join("never-written.mp4"));
        let state = rendered(&cfg, &seg, "");
        seg.source_identity = "/media/b.mp4".to_string();
        let actions = detect_changes(&state, &[seg], &cfg, "", false);
        assert_eq!(actions[0].action, Action::Render(Reason::InputChanged));
    }
}
