//! Markdown and JSON report generation.
//!
//! This module renders a finished bill analysis as a Markdown report or as
//! pretty-printed JSON.

use super::{Report, ReportMetadata};
use crate::config::ReportConfig;
use crate::models::{
    AlignmentFindings, BillCost, Finding, FindingSummary, HistoryEntry, ImpactScores,
    InvestigationFindings, MediaAnalysis, Severity, Sponsor, Summaries,
};
use crate::pipeline::graph::TraceEntry;
use crate::pipeline::state::{CorrectionTracking, PipelineState, StageWarning};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let state = &report.result.state;
    let mut output = String::new();

    // Title
    let title = if report.metadata.title.is_empty() {
        format!("# Bill {}\n\n", report.metadata.bill)
    } else {
        format!("# {}\n\n", report.metadata.title)
    };
    output.push_str(&title);

    output.push_str(&generate_metadata_section(&report.metadata, state));
    output.push_str(&generate_table_of_contents(report, options));

    if let Some(ref summaries) = state.summaries {
        output.push_str(&generate_summary_section(summaries));
    }
    output.push_str(&generate_sponsors_section(
        state.sponsors.as_deref().unwrap_or_default(),
        state.summaries.as_ref(),
    ));
    if let Some(ref history) = state.history {
        output.push_str(&generate_history_section(history));
    }
    if options.include_media {
        if let Some(ref media) = state.media {
            output.push_str(&generate_media_section(media));
        }
    }
    if let Some(ref findings) = state.investigation {
        output.push_str(&generate_investigation_section(findings));
    }
    if let Some(ref alignment) = state.alignment {
        output.push_str(&generate_alignment_section(alignment));
    }
    if let Some(ref impact) = report.impact {
        output.push_str(&generate_impact_section(impact));
    }
    if let Some(ref letter) = report.letter {
        output.push_str(&generate_letter_section(letter));
    }

    output.push_str(&generate_correction_section(state));
    output.push_str(&generate_warnings_section(&report.result.warnings));
    if options.include_trace {
        output.push_str(&generate_trace_section(&report.result.trace));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata, state: &PipelineState) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Bill:** {}\n", metadata.bill));
    if let Some(ref status) = state.status {
        section.push_str(&format!("- **Status:** {}\n", status));
    }
    if let Some(date) = state.metadata.as_ref().and_then(|m| m.introduced_date.as_deref()) {
        section.push_str(&format!("- **Introduced:** {}\n", date));
    }
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Run Status:** {}\n", metadata.status));
    section.push_str(&format!(
        "- **Stage Executions:** {}\n",
        metadata.stage_executions
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section.push_str(&generate_severity_table(&metadata.findings));

    section
}

fn generate_severity_table(summary: &FindingSummary) -> String {
    let mut table = String::new();
    table.push_str(&format!(
        "| {} High | {} Medium | {} Low | **Total** |\n",
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    table.push_str("|:---:|:---:|:---:|:---:|\n");
    table.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.high, summary.medium, summary.low, summary.total
    ));
    table
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report, options: &ReportConfig) -> String {
    let state = &report.result.state;
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    let sections = [
        (state.summaries.is_some(), "Summary", "summary"),
        (state.sponsors.as_ref().is_some_and(|s| !s.is_empty()), "Sponsors", "sponsors"),
        (state.history.is_some(), "Amendment History", "amendment-history"),
        (
            options.include_media && state.media.is_some(),
            "Media Coverage",
            "media-coverage",
        ),
        (
            state.investigation.is_some(),
            "Investigative Findings",
            "investigative-findings",
        ),
        (state.alignment.is_some(), "How This Affects You", "how-this-affects-you"),
        (report.impact.is_some(), "Impact Scores", "impact-scores"),
        (report.letter.is_some(), "Letter to Your Representative", "letter-to-your-representative"),
        (true, "Self-Correction", "self-correction"),
        (!report.result.warnings.is_empty(), "Degraded Analyses", "degraded-analyses"),
        (options.include_trace, "Stage Trace", "stage-trace"),
    ];
    for (present, name, anchor) in sections {
        if present {
            toc.push_str(&format!("- [{}](#{})\n", name, anchor));
        }
    }

    toc.push('\n');

    toc
}

fn generate_summary_section(summaries: &Summaries) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    if !summaries.one_line.trim().is_empty() {
        section.push_str(&format!("> {}\n\n", summaries.one_line.trim()));
    }
    if !summaries.detailed.trim().is_empty() {
        section.push_str(summaries.detailed.trim());
        section.push_str("\n\n");
    }
    if !summaries.section_outline.trim().is_empty() {
        section.push_str("### Section Outline\n\n");
        section.push_str(summaries.section_outline.trim());
        section.push_str("\n\n");
    }

    section
}

fn generate_sponsors_section(sponsors: &[Sponsor], summaries: Option<&Summaries>) -> String {
    if sponsors.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Sponsors\n\n");

    for sponsor in sponsors {
        let mut affiliation: Vec<&str> = Vec::new();
        if let Some(ref party) = sponsor.party {
            affiliation.push(party);
        }
        if let Some(ref state) = sponsor.state {
            affiliation.push(state);
        }
        if affiliation.is_empty() {
            section.push_str(&format!("### {}\n\n", sponsor.full_name));
        } else {
            section.push_str(&format!(
                "### {} ({})\n\n",
                sponsor.full_name,
                affiliation.join("-")
            ));
        }

        if let Some(profile) = summaries.and_then(|s| s.sponsor_profiles.get(&sponsor.full_name)) {
            section.push_str(profile.trim());
            section.push_str("\n\n");
        }
    }

    section
}

fn generate_history_section(history: &[HistoryEntry]) -> String {
    let mut section = String::new();

    section.push_str("## Amendment History\n\n");
    if history.is_empty() {
        section.push_str("No amendments have been filed.\n\n");
        return section;
    }

    for entry in history {
        let amendment = &entry.amendment;
        section.push_str(&format!("### Amendment {}\n\n", amendment.number));
        if let Some(ref description) = amendment.description {
            section.push_str(&format!("*{}*\n\n", description));
        }
        for change in &entry.changes {
            section.push_str(&format!(
                "- {} **{}**: {}",
                change.severity.emoji(),
                change.title,
                change.explanation
            ));
            if !change.concern.is_empty() {
                section.push_str(&format!(" *Concern:* {}", change.concern));
            }
            section.push('\n');
        }
        section.push('\n');
    }

    section
}

fn generate_media_section(media: &[MediaAnalysis]) -> String {
    let mut section = String::new();

    section.push_str("## Media Coverage\n\n");
    if media.is_empty() {
        section.push_str("No coverage was found.\n\n");
        return section;
    }

    for analysis in media {
        section.push_str(&format!("### {}\n\n", analysis.source));
        section.push_str(analysis.analysis.trim());
        section.push_str("\n\n");
        for article in &analysis.articles {
            section.push_str(&format!("- [{}]({})\n", article.title, article.url));
        }
        section.push('\n');
    }

    section
}

/// Severity badge used in finding headings.
fn severity_badge(severity: Severity) -> String {
    format!("{} **{}**", severity.emoji(), severity.to_string().to_uppercase())
}

/// One finding category: heading plus blocks sorted by severity.
fn generate_category<F: Finding>(
    title: &str,
    findings: &[F],
    render: impl Fn(&F) -> String,
) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {} ({})\n\n", title, findings.len()));
    if findings.is_empty() {
        section.push_str("None found.\n\n");
        return section;
    }

    let mut sorted: Vec<&F> = findings.iter().collect();
    sorted.sort_by_key(|f| std::cmp::Reverse(f.severity()));
    for finding in sorted {
        section.push_str(&format!(
            "#### {} {}\n\n",
            severity_badge(finding.severity()),
            finding.headline()
        ));
        section.push_str(&render(finding));
        section.push_str("---\n\n");
    }

    section
}

fn generate_investigation_section(findings: &InvestigationFindings) -> String {
    let mut section = String::new();

    section.push_str("## Investigative Findings\n\n");
    section.push_str(&generate_category(
        "Pork Barrel Spending",
        &findings.pork_barrel_spending,
        |f| {
            format!(
                "{}\n\n**Concern:** {}\n\n> **Why:** {}\n\n",
                f.explanation, f.concern, f.why
            )
        },
    ));
    section.push_str(&generate_category("Trojan Horses", &findings.trojan_horses, |f| {
        format!(
            "{}\n\n**Concern:** {}\n\n> **Why:** {}\n\n",
            f.explanation, f.concern, f.why
        )
    }));
    section.push_str(&generate_category(
        "Sleeper Provisions",
        &findings.sleeper_provisions,
        |f| {
            format!(
                "{}\n\n**Concern:** {}\n\n> **Why:** {}\n\n",
                f.explanation, f.concern, f.why
            )
        },
    ));
    section.push_str(&generate_category("Beneficiaries", &findings.beneficiaries, |f| {
        format!("{}\n\n", f.benefit)
    }));

    section
}

fn generate_cost_section(cost: &BillCost) -> String {
    let mut section = String::new();

    section.push_str("### Cost\n\n");
    section.push_str(cost.cost_explanation.trim());
    section.push_str("\n\n");
    if !cost.alternatives.is_empty() {
        section.push_str("**Alternatives:**\n\n");
        for (i, alternative) in cost.alternatives.iter().enumerate() {
            section.push_str(&format!(
                "{}. **{}**: {}\n",
                i + 1,
                alternative.alternative,
                alternative.explanation
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_alignment_section(alignment: &AlignmentFindings) -> String {
    let mut section = String::new();

    section.push_str("## How This Affects You\n\n");
    let render = |f: &crate::models::AlignmentRecord| {
        format!("*Affects: {}*\n\n{}\n\n", f.effect_type, f.explanation)
    };
    section.push_str(&generate_category("Benefits", &alignment.benefits, render));
    section.push_str(&generate_category("Drawbacks", &alignment.drawbacks, render));
    match alignment.cost_analysis {
        Some(ref cost) => section.push_str(&generate_cost_section(cost)),
        None => section.push_str("### Cost\n\nCost analysis unavailable.\n\n"),
    }

    section
}

fn generate_impact_section(impact: &ImpactScores) -> String {
    let mut section = String::new();

    section.push_str("## Impact Scores\n\n");
    section.push_str("| Personal | Family | Community | **Overall** |\n");
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        impact.personal, impact.family, impact.community, impact.overall
    ));
    if !impact.rationale.is_empty() {
        section.push_str(&format!("{}\n\n", impact.rationale.trim()));
    }

    section
}

fn generate_letter_section(letter: &str) -> String {
    format!("## Letter to Your Representative\n\n{}\n\n", letter.trim())
}

fn correction_line(name: &str, tracking: &CorrectionTracking) -> String {
    format!(
        "| {} | {} | {} |\n",
        name,
        tracking.attempts,
        if tracking.should_revise { "revision pending" } else { "accepted" }
    )
}

fn generate_correction_section(state: &PipelineState) -> String {
    let mut section = String::new();

    section.push_str("## Self-Correction\n\n");
    section.push_str("| Loop | Passes | Outcome |\n");
    section.push_str("|:---|:---:|:---|\n");
    section.push_str(&correction_line("Investigation", &state.investigation_correction));
    section.push_str(&correction_line("Alignment", &state.alignment_correction));
    section.push('\n');

    section
}

fn generate_warnings_section(warnings: &[StageWarning]) -> String {
    if warnings.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Degraded Analyses\n\n");
    section.push_str("The following analyses failed or were cut short; their results are missing from this report.\n\n");
    for warning in warnings {
        section.push_str(&format!("- ⚠️ {}\n", warning));
    }
    section.push('\n');

    section
}

fn generate_trace_section(trace: &[TraceEntry]) -> String {
    let mut section = String::new();

    section.push_str("## Stage Trace\n\n");
    section.push_str("| Step | Stage | Duration | Warnings | Next |\n");
    section.push_str("|:---:|:---|:---:|:---:|:---|\n");
    for entry in trace {
        section.push_str(&format!(
            "| {} | `{}` | {}ms | {} | `{}` |\n",
            entry.step, entry.stage, entry.duration_ms, entry.warnings, entry.next
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by billscope. Findings are model output; verify them against the bill text.*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alternative, AlignmentRecord, EffectScope, Impact, PorkRecord};
    use crate::pipeline::router::Target;
    use crate::pipeline::{PipelineResult, RunStatus, StageId};
    use crate::testing::sample_state;

    fn pork(title: &str, severity: Severity) -> PorkRecord {
        PorkRecord {
            title: title.to_string(),
            explanation: "Earmarks funds".to_string(),
            concern: "No competition".to_string(),
            severity,
            why: "Single named recipient".to_string(),
        }
    }

    fn create_test_report() -> Report {
        let mut state = sample_state();
        state.investigation = Some(InvestigationFindings {
            pork_barrel_spending: vec![pork("Museum grant", Severity::Low), pork("Bridge to nowhere", Severity::High)],
            ..InvestigationFindings::default()
        });
        state.alignment = Some(AlignmentFindings {
            benefits: Vec::new(),
            drawbacks: vec![AlignmentRecord {
                benefit_or_harm: Impact::Harm,
                effect_type: EffectScope::Family,
                summary: "Higher fees".to_string(),
                explanation: "Section 3 adds a surcharge".to_string(),
                severity: Severity::Medium,
            }],
            cost_analysis: Some(BillCost {
                cost_explanation: "$50 million".to_string(),
                alternatives: vec![Alternative {
                    alternative: "Tax credits".to_string(),
                    explanation: "Lower overhead".to_string(),
                }],
            }),
        });
        let warning = StageWarning::for_chunk(StageId::Investigate, 1, "pork barrel analysis failed: timeout");
        state.warnings.push(warning.clone());

        let result = PipelineResult {
            status: RunStatus::Partial,
            state,
            trace: vec![TraceEntry {
                step: 1,
                stage: StageId::Init,
                duration_ms: 12,
                warnings: 0,
                next: Target::Stage(StageId::Summarize),
            }],
            warnings: vec![warning],
            duration_ms: 2500,
        };
        Report::new(result, "test-model")
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, &ReportConfig::default());

        assert!(markdown.starts_with("# Rural Broadband Act"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("- **Run Status:** partial"));
        assert!(markdown.contains("## Investigative Findings"));
        assert!(markdown.contains("### Pork Barrel Spending (2)"));
        assert!(markdown.contains("### Trojan Horses (0)\n\nNone found."));
        assert!(markdown.contains("1. **Tax credits**: Lower overhead"));
        assert!(markdown.contains("[investigate] chunk 1: pork barrel analysis failed"));
        assert!(markdown.contains("| 1 | `init` | 12ms | 0 | `summarize` |"));
    }

    #[test]
    fn test_findings_sorted_by_severity() {
        let markdown = generate_markdown_report(&create_test_report(), &ReportConfig::default());
        let high = markdown.find("Bridge to nowhere").unwrap();
        let low = markdown.find("Museum grant").unwrap();
        assert!(high < low);
        assert!(markdown.contains("🔴 **HIGH** Bridge to nowhere"));
    }

    #[test]
    fn test_report_options_hide_sections() {
        let options = ReportConfig {
            include_media: false,
            include_trace: false,
        };
        let markdown = generate_markdown_report(&create_test_report(), &options);
        assert!(!markdown.contains("## Stage Trace"));
        assert!(!markdown.contains("#stage-trace"));
    }

    #[test]
    fn test_severity_summary_counts_every_finding() {
        let report = create_test_report();
        assert_eq!(report.metadata.findings.total, 3);
        assert!(report.has_findings_at_or_above(Severity::High));
        assert_eq!(
            report.worst_investigation_finding(),
            Some(("Bridge to nowhere", Severity::High))
        );
    }

    #[test]
    fn test_generate_json_report() {
        let mut report = create_test_report();
        report.letter = Some("Dear Representative".to_string());
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"pork_barrel_spending\""));
        assert!(json.contains("\"letter\": \"Dear Representative\""));
        assert!(!json.contains("\"impact\""));
    }
}
