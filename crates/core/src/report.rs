//! Run report
//!
//! Summarizes a pipeline run on stdout and optionally persists it as YAML or JSON,
//! chosen by the report file extension.

use crate::config::RunConfig;
use crate::distribution::DistributionRecord;
use crate::errors::{ReportError, Result};
use crate::git::GitMetadata;
use crate::pipeline::RunResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default report file name
pub const DEFAULT_REPORT_FILE: &str = "report.yml";

const RULE: &str = "----------------------------------------------------------";

/// Serialization format of a report file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Yaml,
    Json,
}

impl ReportFormat {
    /// Format for a file name, `None` for unsupported extensions
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml" | "yaml") => Some(Self::Yaml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub git: GitMetadata,
    pub report_file: String,
}

/// Everything known about one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub meta: ReportMeta,
    pub distribution: DistributionRecord,
    pub config: RunConfig,
    pub hosts: Vec<String>,
    pub result: RunResult,
}

impl RunReport {
    pub fn new(
        report_file: impl Into<PathBuf>,
        git: GitMetadata,
        distribution: DistributionRecord,
        config: RunConfig,
        hosts: Vec<String>,
        result: RunResult,
    ) -> Self {
        Self {
            meta: ReportMeta {
                timestamp: Utc::now(),
                git,
                report_file: report_file.into().display().to_string(),
            },
            distribution,
            config,
            hosts,
            result,
        }
    }

    /// Human-readable summary table
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let r = &self.result;
        let rows: Vec<(&str, String)> = vec![
            ("Syntax check", r.syntax_check.to_string()),
            ("Requirements installed", r.requirements_installed.to_string()),
            ("Run result", r.role_run.to_string()),
            ("Run time", format!("{:.2?}", r.role_run_duration)),
            ("Idempotence result", r.idempotence.to_string()),
            ("Idempotence time", format!("{:.2?}", r.idempotence_duration)),
        ];

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "Ansible Role Tester Report");
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "{:<26}{}", "Timestamp:", self.meta.timestamp.to_rfc3339());
        let _ = writeln!(out, "{:<26}{}", "Distribution:", self.distribution.image_reference);
        if self.meta.git.is_repository() {
            let _ = writeln!(out, "{:<26}{}", "Repository URL:", self.meta.git.repository);
            let _ = writeln!(out, "{:<26}{}", "Repository commit:", self.meta.git.commit_hash);
            let _ = writeln!(out, "{:<26}{}", "Local changes:", self.meta.git.local_changes);
        }
        let _ = writeln!(out, "{}", RULE);
        for (label, value) in rows {
            let _ = writeln!(out, "{:<26}{}", format!("{}:", label), value);
        }
        let _ = writeln!(out, "{}", RULE);
        let _ = writeln!(out, "{:<26}{}", "Docker run:", r.docker_run);
        let _ = writeln!(out, "{:<26}{}", "Docker kill:", r.docker_killed);
        let _ = writeln!(out, "{}", RULE);
        out
    }

    /// Serialize in the given format
    pub fn render(&self, format: ReportFormat) -> Result<String> {
        let rendered = match format {
            ReportFormat::Yaml => serde_yaml::to_string(self).map_err(ReportError::from)?,
            ReportFormat::Json => serde_json::to_string_pretty(self).map_err(ReportError::from)?,
        };
        Ok(rendered)
    }

    /// Write the report file, replacing any existing one
    ///
    /// Returns `None` when the extension selects no file format.
    pub fn write(&self) -> Result<Option<PathBuf>> {
        let path = PathBuf::from(&self.meta.report_file);
        let Some(format) = ReportFormat::from_path(&path) else {
            warn!(
                "Report file {} has no .yml, .yaml or .json extension, not writing it",
                path.display()
            );
            return Ok(None);
        };

        let rendered = self.render(format)?;
        std::fs::write(&path, rendered).map_err(|source| ReportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("Report data has been written to {}", path.display());
        Ok(Some(path))
    }

    /// Print the summary and write the file
    pub fn publish(&self) -> Result<Option<PathBuf>> {
        println!("{}", self.summary());
        self.write()
    }
}
