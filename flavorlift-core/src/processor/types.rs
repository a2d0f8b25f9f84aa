use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::MigrationConfig;

use super::error::ProcessorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaths {
    pub original: PathBuf,
    pub original_part: PathBuf,
    pub output: PathBuf,
    pub output_partial: PathBuf,
}

impl AssetPaths {
    pub fn new(config: &MigrationConfig, local_name: &str) -> Self {
        let extension = config.source.target_extension.trim_start_matches('.');
        let original_name = format!("{local_name}_original.{extension}");
        let output_stem = format!("{local_name}_{}", config.output.output_suffix);
        let originals = config.originals_dir();
        let transcoded = config.transcoded_dir();
        Self {
            original: originals.join(&original_name),
            original_part: originals.join(format!("{original_name}.part")),
            output: transcoded.join(format!("{output_stem}.mp4")),
            output_partial: transcoded.join(format!("{output_stem}.partial.mp4")),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Success,
    Skipped(String),
    Failed(ProcessorError),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Skipped(_) => "skipped",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetReport {
    pub local_name: String,
    pub entry_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AssetReport {
    pub fn new(local_name: &str, entry_id: &str, outcome: &Outcome) -> Self {
        let (error_kind, detail) = match outcome {
            Outcome::Success => (None, None),
            Outcome::Skipped(reason) => (None, Some(reason.clone())),
            Outcome::Failed(err) => (Some(err.kind().to_string()), Some(err.to_string())),
        };
        Self {
            local_name: local_name.to_string(),
            entry_id: entry_id.to_string(),
            outcome: outcome.label().to_string(),
            error_kind,
            detail,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub assets: Vec<AssetReport>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, assets: Vec<AssetReport>) -> Self {
        let count = |label: &str| assets.iter().filter(|a| a.outcome == label).count();
        Self {
            started_at,
            finished_at: Utc::now(),
            succeeded: count("success"),
            skipped: count("skipped"),
            failed: count("failed"),
            assets,
        }
    }

    pub fn total(&self) -> usize {
        self.assets.len()
    }
}
