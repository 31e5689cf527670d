//! Render fingerprints
//!
//! Two digests decide staleness: a global one over every render-affecting
//! setting, and a per-segment one over everything that feeds a single output.
//! Both are SHA-1 over canonical JSON; maps are `BTreeMap` so key order is
//! stable across runs.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::util::{hash_bytes, HashAlgorithm};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid PLACEHOLDER regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub crf: Option<u32>,
    pub preset: Option<String>,
    pub resolution: Option<String>,
    pub fps: Option<f64>,
    pub extra_args: Vec<String>,
}

/// One overlay element: what text, where, and when
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySegment {
    pub style: BTreeMap<String, String>,
    pub start_s: f64,
    pub end_s: f64,
    pub text_template: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayProfile {
    pub segments: Vec<OverlaySegment>,
}

/// Global render settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub codec: CodecSettings,
    pub overlay_profiles: BTreeMap<String, OverlayProfile>,
    /// Render command line; `{input}`, `{output}` and `{duration}` are substituted per segment
    pub command: Vec<String>,
    /// Worker pool size, 0 means one per logical CPU. Not part of the global hash.
    pub workers: usize,
}

/// A planned output, opaque beyond these fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub source_identity: String,
    pub overlay_profile_name: String,
    pub resolved_overlay_segments: Vec<OverlaySegment>,
    pub output_path: String,
    pub filename_template: String,
    pub duration_s: f64,
    pub custom_fields: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct GlobalView<'a> {
    codec: &'a CodecSettings,
    overlay_profiles: &'a BTreeMap<String, OverlayProfile>,
    command: &'a [String],
}

#[derive(Serialize)]
struct SegmentView<'a> {
    source_identity: &'a str,
    overlay_profile_name: &'a str,
    overlay_segments: &'a [OverlaySegment],
    filename_template: &'a str,
    duration_s: f64,
    custom_fields: BTreeMap<&'a str, &'a str>,
}

fn digest<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hash_bytes(&bytes, HashAlgorithm::Sha1)
}

/// Placeholder names used in `template`, e.g. `{title}` yields `title`
pub fn placeholders(template: &str) -> BTreeSet<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub fn global_config_hash(cfg: &RenderConfig) -> String {
    digest(&GlobalView {
        codec: &cfg.codec,
        overlay_profiles: &cfg.overlay_profiles,
        command: &cfg.command,
    })
}

/// The segment's own filename template, or `template` when it has none
pub fn effective_template<'a>(segment: &'a Segment, template: &'a str) -> &'a str {
    if segment.filename_template.is_empty() {
        template
    } else {
        &segment.filename_template
    }
}

/// Digest over everything that feeds one output
///
/// Custom fields count only when an overlay text template or the filename
/// template references them, so unrelated row columns never force a re-render.
pub fn segment_input_hash(segment: &Segment, template: &str) -> String {
    let filename_template = effective_template(segment, template);

    let mut referenced: BTreeSet<&str> = placeholders(filename_template);
    for overlay in &segment.resolved_overlay_segments {
        referenced.extend(placeholders(&overlay.text_template));
    }

    let custom_fields = segment
        .custom_fields
        .iter()
        .filter(|(k, _)| referenced.contains(k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    digest(&SegmentView {
        source_identity: &segment.source_identity,
        overlay_profile_name: &segment.overlay_profile_name,
        overlay_segments: &segment.resolved_overlay_segments,
        filename_template,
        duration_s: segment.duration_s,
        custom_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        let mut custom_fields = BTreeMap::new();
        custom_fields.insert("title".to_string(), "Opening".to_string());
        custom_fields.insert("notes".to_string(), "unused".to_string());
        Segment {
            source_identity: "/media/a.mp4".to_string(),
            overlay_profile_name: "lower-third".to_string(),
            resolved_overlay_segments: vec![OverlaySegment {
                start_s: 0.0,
                end_s: 3.0,
                text_template: "{title}".to_string(),
                ..Default::default()
            }],
            output_path: "/out/a.mp4".to_string(),
            filename_template: String::new(),
            duration_s: 12.5,
            custom_fields,
        }
    }

    #[test]
    fn test_placeholders() {
        let found = placeholders("{index}_{title}-{title}.mp4 {not valid}");
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["index", "title"]);
    }

    #[test]
    fn test_segment_hash_is_stable() {
        let s = segment();
        assert_eq!(segment_input_hash(&s, "{title}.mp4"), segment_input_hash(&s, "{title}.mp4"));
        assert_eq!(segment_input_hash(&s, "x").len(), 40);
    }

    #[test]
    fn test_segment_hash_tracks_inputs() {
        let base = segment();
        let h = segment_input_hash(&base, "{title}.mp4");

        let mut s = base.clone();
        s.source_identity = "/media/b.mp4".to_string();
        assert_ne!(segment_input_hash(&s, "{title}.mp4"), h);

        let mut s = base.clone();
        s.resolved_overlay_segments[0].end_s = 4.0;
        assert_ne!(segment_input_hash(&s, "{title}.mp4"), h);

        let mut s = base.clone();
        s.duration_s = 13.0;
        assert_ne!(segment_input_hash(&s, "{title}.mp4"), h);

        assert_ne!(segment_input_hash(&base, "{title}-v2.mp4"), h);

        let mut s = base.clone();
        s.custom_fields.insert("title".to_string(), "Closing".to_string());
        assert_ne!(segment_input_hash(&s, "{title}.mp4"), h);
    }

    #[test]
    fn test_unreferenced_fields_do_not_matter() {
        let base = segment();
        let mut s = base.clone();
        s.custom_fields.insert("notes".to_string(), "changed".to_string());
        s.custom_fields.insert("extra".to_string(), "new".to_string());
        s.output_path = "/elsewhere/a.mp4".to_string();
        assert_eq!(segment_input_hash(&s, "{title}.mp4"), segment_input_hash(&base, "{title}.mp4"));
    }

    #[test]
    fn test_segment_template_overrides_global() {
        let mut s = segment();
        s.filename_template = "{notes}.mp4".to_string();
        let h = segment_input_hash(&s, "{title}.mp4");
        assert_eq!(h, segment_input_hash(&s, "anything"));

        s.custom_fields.insert("notes".to_string(), "changed".to_string());
        assert_ne!(segment_input_hash(&s, "{title}.mp4"), h);
    }

    #[test]
    fn test_global_hash_ignores_workers() {
        let mut cfg = RenderConfig::default();
        cfg.codec.video_codec = "libx264".to_string();
        let h = global_config_hash(&cfg);

        cfg.workers = 8;
        assert_eq!(global_config_hash(&cfg), h);

        cfg.codec.crf = Some(20);
        assert_ne!(global_config_hash(&cfg), h);

        let mut cfg2 = RenderConfig::default();
        cfg2.codec.video_codec = "libx264".to_string();
        cfg2.overlay_profiles
            .insert("p".to_string(), OverlayProfile::default());
        assert_ne!(global_config_hash(&cfg2), h);
    }
}
