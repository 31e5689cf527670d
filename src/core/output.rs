//! Output module
//!
//! Renders RecordSet to different output formats: jsonl, json, md

use crate::core::model::{Kind, Record, RecordSet};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jsonl,
    Json,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "json" => Ok(OutputFormat::Json),
            "md" | "markdown" => Ok(OutputFormat::Markdown),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Output configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl OutputConfig {
    pub fn with_pretty(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }
}

/// Renderer for record sets
pub struct Renderer {
    config: OutputConfig,
}

impl Renderer {
    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Render a record set to a string
    pub fn render(&self, records: &RecordSet) -> String {
        match self.config.format {
            OutputFormat::Jsonl => self.render_jsonl(records),
            OutputFormat::Json => self.render_json(records),
            OutputFormat::Markdown => self.render_markdown(records),
        }
    }

    /// Render and print to stdout, skipping empty output
    pub fn print(&self, records: &RecordSet) {
        let output = self.render(records);
        if !output.is_empty() {
            println!("{}", output);
        }
    }

    /// Render as JSON Lines (one JSON object per line)
    fn render_jsonl(&self, records: &RecordSet) -> String {
        records
            .items
            .iter()
            .filter_map(|item| {
                if self.config.pretty {
                    serde_json::to_string_pretty(item).ok()
                } else {
                    serde_json::to_string(item).ok()
                }
            })
            .collect::<Vec<_>>()
            .join(if self.config.pretty { "\n\n" } else { "\n" })
    }

    /// Render as a single JSON array
    fn render_json(&self, records: &RecordSet) -> String {
        if self.config.pretty {
            serde_json::to_string_pretty(&records.items).unwrap_or_else(|_| "[]".to_string())
        } else {
            serde_json::to_string(&records.items).unwrap_or_else(|_| "[]".to_string())
        }
    }

    /// Render as Markdown, one section per record kind
    fn render_markdown(&self, records: &RecordSet) -> String {
        let mut output = String::new();

        let errors: Vec<_> = records
            .items
            .iter()
            .filter(|r| r.kind == Kind::Error)
            .collect();
        if !errors.is_empty() {
            output.push_str("## Errors\n\n");
            for item in errors {
                for error in &item.errors {
                    output.push_str(&format!("- **{}**: {}\n", error.code, error.message));
                }
            }
            output.push('\n');
        }

        let sections = [
            (Kind::Entry, "Cache Entries"),
            (Kind::Resolve, "Resolved Sources"),
            (Kind::Action, "Render Actions"),
            (Kind::Migration, "Migration"),
            (Kind::Dependency, "Dependencies"),
            (Kind::Summary, "Summary"),
        ];

        for (kind, title) in sections {
            let items: Vec<_> = records.items.iter().filter(|r| r.kind == kind).collect();
            if items.is_empty() {
                continue;
            }
            output.push_str(&format!("## {}\n\n", title));
            for item in items {
                self.render_item_md(&mut output, item);
            }
            output.push('\n');
        }

        output
    }

    fn render_item_md(&self, output: &mut String, item: &Record) {
        output.push('-');
        if let Some(status) = &item.status {
            output.push_str(&format!(" **{}**", status));
        }
        if let Some(id) = &item.id {
            output.push_str(&format!(" `{}`", id));
        }
        if let Some(path) = &item.path {
            output.push_str(&format!(" -> `{}`", path));
        }
        if let Some(size) = item.meta.size {
            output.push_str(&format!(" ({} bytes)", size));
        }
        if item.meta.dry_run {
            output.push_str(" _(dry run)_");
        }
        output.push('\n');

        if let Some(data) = &item.data {
            if item.kind == Kind::Summary {
                if let Some(map) = data.as_object() {
                    for (key, value) in map {
                        output.push_str(&format!("  - {}: {}\n", key, value));
                    }
                }
            }
        }

        for error in &item.errors {
            output.push_str(&format!("  - ⚠️ {}: {}\n", error.code, error.message));
        }
    }
}
