use crate::analysis::{AnalysisOutput, ResponseSchema, TaskInput, TaskSpec};
use crate::chunker::leading_chars;
use crate::errors::PipelineError;
use crate::models::{ChangeRecord, HistoryEntry, Records};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StageWarning, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use tracing::info;

/// Analyzes what each amendment changes.
pub struct HistoryStage;

#[async_trait]
impl Stage for HistoryStage {
    fn id(&self) -> StageId {
        StageId::History
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Amendments, Field::BillText]
    }

    fn produces(&self) -> &'static [Field] {
        &[Field::History]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.id();
        let amendments = state.amendments(stage)?;
        let excerpt = leading_chars(state.bill_text(stage)?, ctx.settings.summary_prefix_chars);

        let inputs = amendments
            .iter()
            .map(|amendment| {
                TaskInput::structured(
                    TaskSpec::AmendmentChanges,
                    format!(
                        "Amendment details: {}\n\nBill text excerpt: {}",
                        serde_json::to_string(amendment).unwrap_or_default(),
                        excerpt
                    ),
                    ResponseSchema::ChangeRecords,
                )
            })
            .collect();

        let results = ctx
            .fan_out(stage, inputs, AnalysisOutput::into_record::<Records<ChangeRecord>>)
            .await?;
        if results.all_failed() {
            return Err(PipelineError::StageFailed {
                stage,
                reason: format!("all {} amendment analyses failed", amendments.len()),
            });
        }

        let warnings: Vec<StageWarning> = results
            .failures
            .iter()
            .map(|(index, e)| {
                StageWarning::new(
                    stage,
                    format!("amendment {} analysis failed: {}", amendments[*index].number, e),
                )
            })
            .collect();
        let history: Vec<HistoryEntry> = results
            .outputs
            .into_iter()
            .map(|(index, changes)| HistoryEntry {
                amendment: amendments[index].clone(),
                changes: changes.records,
            })
            .collect();

        info!("Analyzed {} of {} amendments", history.len(), amendments.len());

        Ok(StatePatch {
            history: Some(history),
            ..StatePatch::default()
        }
        .with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalysisError;
    use crate::models::Amendment;
    use crate::pipeline::stage::PipelineSettings;
    use crate::testing::{context_with, sample_state, ScriptedAnalysis};
    use std::sync::Arc;

    fn amendment(number: &str) -> Amendment {
        Amendment {
            number: number.to_string(),
            amendment_type: Some("HAMDT".to_string()),
            description: Some(format!("Amendment {}", number)),
            purpose: None,
            latest_action: None,
        }
    }

    #[tokio::test]
    async fn test_no_amendments_is_empty_history() {
        let analysis = Arc::new(ScriptedAnalysis::default());
        let ctx = context_with(analysis.clone(), PipelineSettings::default());
        let mut state = sample_state();
        state.amendments = Some(Vec::new());

        let patch = HistoryStage.run(&state, &ctx).await.unwrap();
        assert_eq!(patch.history, Some(Vec::new()));
        assert!(analysis.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_amendment_is_omitted_with_warning() {
        let analysis = ScriptedAnalysis::default().fail_when(|input| input.input.contains("\"number\":\"2\""));
        let ctx = context_with(Arc::new(analysis), PipelineSettings::default());
        let mut state = sample_state();
        state.amendments = Some(vec![amendment("1"), amendment("2"), amendment("3")]);

        let patch = HistoryStage.run(&state, &ctx).await.unwrap();
        let history = patch.history.unwrap();
        let numbers: Vec<&str> = history.iter().map(|h| h.amendment.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "3"]);
        assert_eq!(history[0].changes.len(), 1);
        assert_eq!(patch.warnings.len(), 1);
        assert!(patch.warnings[0].message.contains("amendment 2"));
    }

    #[tokio::test]
    async fn test_all_amendments_failing_fails_stage() {
        let analysis = ScriptedAnalysis::new(|_| Err(AnalysisError::InvalidResponse("bad".into())));
        let ctx = context_with(Arc::new(analysis), PipelineSettings::default());
        let mut state = sample_state();
        state.amendments = Some(vec![amendment("1")]);

        let err = HistoryStage.run(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageFailed { stage: StageId::History, .. }));
    }
}
