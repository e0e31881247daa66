//! Report generation.
//!
//! A [`Report`] wraps a finished pipeline run with run metadata and the
//! optional follow-up analyses, and renders to Markdown or JSON.

mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::models::{Finding, FindingSummary, ImpactScores, Severity};
use crate::pipeline::{PipelineResult, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run-level information shown at the top of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub bill: String,
    pub title: String,
    pub analysis_date: DateTime<Utc>,
    pub model_used: String,
    pub status: RunStatus,
    pub stage_executions: usize,
    pub duration_seconds: f64,
    pub findings: FindingSummary,
}

/// A complete analysis report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub result: PipelineResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactScores>,
}

/// Severity counts over every finding the run produced: investigative
/// findings, amendment changes and alignment drawbacks.
pub fn summarize_findings(result: &PipelineResult) -> FindingSummary {
    let state = &result.state;
    let mut summary = FindingSummary::default();
    if let Some(findings) = &state.investigation {
        summary.merge(&FindingSummary::from_findings(&findings.pork_barrel_spending));
        summary.merge(&FindingSummary::from_findings(&findings.trojan_horses));
        summary.merge(&FindingSummary::from_findings(&findings.sleeper_provisions));
        summary.merge(&FindingSummary::from_findings(&findings.beneficiaries));
    }
    for entry in state.history.iter().flatten() {
        summary.merge(&FindingSummary::from_findings(&entry.changes));
    }
    if let Some(alignment) = &state.alignment {
        summary.merge(&FindingSummary::from_findings(&alignment.drawbacks));
    }
    summary
}

impl Report {
    pub fn new(result: PipelineResult, model_used: impl Into<String>) -> Self {
        let title = result
            .state
            .metadata
            .as_ref()
            .map(|m| m.title.clone())
            .unwrap_or_default();
        let metadata = ReportMetadata {
            bill: result.state.bill.to_string(),
            title,
            analysis_date: Utc::now(),
            model_used: model_used.into(),
            status: result.status,
            stage_executions: result.trace.len(),
            duration_seconds: result.duration_ms as f64 / 1000.0,
            findings: summarize_findings(&result),
        };
        Self {
            metadata,
            result,
            letter: None,
            impact: None,
        }
    }

    /// Whether any counted finding is at or above `threshold`.
    pub fn has_findings_at_or_above(&self, threshold: Severity) -> bool {
        let findings = &self.metadata.findings;
        match threshold {
            Severity::Low => findings.total > 0,
            Severity::Medium => findings.medium + findings.high > 0,
            Severity::High => findings.high > 0,
        }
    }

    /// Highest severity among the investigative findings.
    pub fn worst_investigation_finding(&self) -> Option<(&str, Severity)> {
        let findings = self.result.state.investigation.as_ref()?;
        let pork = findings.pork_barrel_spending.iter().map(|f| (f.headline(), f.severity()));
        let trojans = findings.trojan_horses.iter().map(|f| (f.headline(), f.severity()));
        let sleepers = findings.sleeper_provisions.iter().map(|f| (f.headline(), f.severity()));
        pork.chain(trojans).chain(sleepers).max_by_key(|(_, severity)| *severity)
    }
}
