//! Doctor - External tool checks

use anyhow::Result;
use tracing::warn;

use crate::core::config::Settings;
use crate::core::model::{Kind, Record, RecordSet, ReelIssue};
use crate::core::output::{OutputConfig, Renderer};
use crate::core::util::command_exists;

/// Dependency status
#[derive(Debug, Clone)]
pub struct DependencyStatus {
    pub name: String,
    pub available: bool,
    pub command: String,
    pub required: bool,
    pub notes: Option<String>,
}

impl DependencyStatus {
    fn new(name: &str, command: &str, required: bool, notes: &str) -> Self {
        Self {
            name: name.to_string(),
            available: command_exists(command),
            command: command.to_string(),
            required,
            notes: Some(notes.to_string()),
        }
    }

    pub fn to_record(&self) -> Record {
        let mut record = Record::new(Kind::Dependency)
            .with_id(self.name.clone())
            .with_path(self.command.clone())
            .with_status(if self.available { "found" } else { "missing" })
            .with_data(serde_json::json!({
                "required": self.required,
                "notes": self.notes,
            }));

        if !self.available && self.required {
            record = record.with_error(ReelIssue::new(
                "MISSING_DEPENDENCY",
                format!("{} is required but `{}` was not found", self.name, self.command),
            ));
        }
        record
    }
}

/// Check the configured downloader and prober, plus ffmpeg for rendering
pub fn check_dependencies(settings: &Settings) -> Vec<DependencyStatus> {
    vec![
        DependencyStatus::new(
            "downloader",
            &settings.downloader,
            true,
            "Install: pipx install yt-dlp (or set --downloader / REEL_DOWNLOADER)",
        ),
        DependencyStatus::new(
            "prober",
            &settings.prober,
            true,
            "Install: ffmpeg package provides ffprobe (or set --prober / REEL_PROBER)",
        ),
        DependencyStatus::new(
            "ffmpeg",
            "ffmpeg",
            false,
            "Used by typical render commands",
        ),
    ]
}

pub fn doctor_records(settings: &Settings) -> RecordSet {
    check_dependencies(settings)
        .iter()
        .map(DependencyStatus::to_record)
        .collect()
}

/// Run the doctor command
pub fn run_doctor(settings: &Settings, config: OutputConfig) -> Result<()> {
    let records = doctor_records(settings);
    Renderer::with_config(config).print(&records);

    if records.error_count() > 0 {
        warn!("some required dependencies are missing");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_check_dependencies() {
        let temp = tempdir().unwrap();
        let settings = Settings::new(temp.path()).with_tools("sh", "definitely-not-a-real-prober");
        let deps = check_dependencies(&settings);

        let names: Vec<_> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["downloader", "prober", "ffmpeg"]);
        assert!(!deps[1].available);
    }

    #[test]
    fn test_missing_required_is_error_record() {
        let dep = DependencyStatus {
            name: "prober".to_string(),
            available: false,
            command: "nope".to_string(),
            required: true,
            notes: None,
        };
        let record = dep.to_record();
        assert_eq!(record.status.as_deref(), Some("missing"));
        assert_eq!(record.errors[0].code, "MISSING_DEPENDENCY");

        let optional = DependencyStatus {
            required: false,
            ..dep
        };
        assert!(optional.to_record().errors.is_empty());
    }
}
