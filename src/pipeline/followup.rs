//! Follow-up analyses over a finished run: a letter to the representative
//! and impact scores.

use super::PipelineResult;
use crate::analysis::{AnalysisOutput, AnalysisTask, ResponseSchema, TaskInput, TaskSpec};
use crate::errors::AnalysisError;
use crate::models::{Finding, ImpactScores};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::info;

async fn call(
    task: &dyn AnalysisTask,
    input: TaskInput,
    timeout: Duration,
) -> Result<AnalysisOutput, AnalysisError> {
    let spec = input.task;
    tokio::time::timeout(timeout, task.invoke(input))
        .await
        .map_err(|_| AnalysisError::Unavailable(format!("{} timed out after {:?}", spec, timeout)))?
}

fn request(preferences: &str, bill_context: &str) -> String {
    format!("User preferences: {}\n\nBill context: {}", preferences, bill_context)
}

/// Draft a letter to the user's representative about the bill.
pub async fn write_letter(
    task: &dyn AnalysisTask,
    preferences: &str,
    bill_context: &str,
    timeout: Duration,
) -> Result<String, AnalysisError> {
    info!("Drafting representative letter");
    let input = TaskInput::text(TaskSpec::WriteLetter, request(preferences, bill_context));
    let letter = call(task, input, timeout).await?.into_text()?;
    if letter.trim().is_empty() {
        return Err(AnalysisError::InvalidResponse("empty letter".to_string()));
    }
    Ok(letter)
}

/// Score the bill's personal, family, community and overall impact.
pub async fn score_impact(
    task: &dyn AnalysisTask,
    preferences: &str,
    bill_context: &str,
    timeout: Duration,
) -> Result<ImpactScores, AnalysisError> {
    info!("Scoring bill impact");
    let input = TaskInput::structured(
        TaskSpec::ScoreImpact,
        request(preferences, bill_context),
        ResponseSchema::ImpactScores,
    );
    call(task, input, timeout).await?.into_record()
}

fn headlines<F: Finding>(out: &mut String, label: &str, findings: &[F]) {
    if findings.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", label);
    for finding in findings {
        let _ = writeln!(out, "- {} ({})", finding.headline(), finding.severity());
    }
}

/// Condensed description of a run for the follow-up analyses.
pub fn bill_context(result: &PipelineResult) -> String {
    let state = &result.state;
    let mut out = String::new();

    let title = state.metadata.as_ref().map(|m| m.title.as_str()).unwrap_or("");
    let _ = writeln!(out, "Bill {}: {}", state.bill, title);
    if let Some(status) = &state.status {
        let _ = writeln!(out, "Status: {}", status);
    }
    if let Some(summaries) = &state.summaries {
        if !summaries.detailed.trim().is_empty() {
            let _ = writeln!(out, "\nSummary:\n{}", summaries.detailed.trim());
        } else if !summaries.one_line.trim().is_empty() {
            let _ = writeln!(out, "\nSummary: {}", summaries.one_line.trim());
        }
    }

    if let Some(findings) = &state.investigation {
        out.push('\n');
        headlines(&mut out, "Pork barrel spending", &findings.pork_barrel_spending);
        headlines(&mut out, "Trojan horses", &findings.trojan_horses);
        headlines(&mut out, "Sleeper provisions", &findings.sleeper_provisions);
        headlines(&mut out, "Beneficiaries", &findings.beneficiaries);
    }
    if let Some(alignment) = &state.alignment {
        out.push('\n');
        headlines(&mut out, "Benefits to the user", &alignment.benefits);
        headlines(&mut out, "Drawbacks for the user", &alignment.drawbacks);
        if let Some(cost) = &alignment.cost_analysis {
            let _ = writeln!(out, "Cost: {}", cost.cost_explanation);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::PipelineSettings;
    use crate::pipeline::{BillRequest, Pipeline};
    use crate::testing::{sample_bill, ScriptedAnalysis, StaticBills};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn finished_run() -> PipelineResult {
        Pipeline::new(
            Arc::new(ScriptedAnalysis::default()),
            Arc::new(StaticBills::found(sample_bill())),
            PipelineSettings::default(),
        )
        .run(
            BillRequest {
                user_profile: "Nurse in rural Maine".to_string(),
                congress: 119,
                bill_type: "hr".to_string(),
                bill_number: 1,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_bill_context_lists_findings() {
        let context = bill_context(&finished_run().await);
        assert!(context.starts_with("Bill 119/hr/1: Rural Broadband Act"));
        assert!(context.contains("Summary:\nsummarize_detailed output"));
        assert!(context.contains("Pork barrel spending:\n- "));
        assert!(context.contains("Cost: "));
    }

    #[tokio::test]
    async fn test_letter_uses_preferences_and_context() {
        let analysis = ScriptedAnalysis::default();
        let letter = write_letter(&analysis, "Supports broadband", "Bill 119/hr/1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(letter, "write_letter output");
        assert_eq!(
            analysis.calls()[0].input,
            "User preferences: Supports broadband\n\nBill context: Bill 119/hr/1"
        );
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_rejected() {
        let analysis = ScriptedAnalysis::new(|_| {
            Ok(AnalysisOutput::Structured(json!({
                "personal": 120,
                "family": 10,
                "community": 10,
                "overall": 10,
                "rationale": "Too high"
            })))
        });
        let err = score_impact(&analysis, "", "", Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));

        let scores = score_impact(&ScriptedAnalysis::default(), "", "", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(scores.overall <= 100);
    }

    #[tokio::test]
    async fn test_letter_timeout_is_unavailable() {
        let analysis = ScriptedAnalysis::default().with_delay(|_| Duration::from_secs(5));
        let err = write_letter(&analysis, "", "", Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Unavailable(_)));
    }
}
