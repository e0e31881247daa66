use super::collect_records;
use crate::analysis::prompts::{feedback_context, INFERENCE_REMINDER};
use crate::analysis::{AnalysisOutput, ResponseSchema, TaskInput, TaskSpec};
use crate::chunker::{leading_chars, Chunk};
use crate::errors::PipelineError;
use crate::models::{AlignmentFindings, AlignmentRecord, BillCost, Records};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StageWarning, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Benefits, drawbacks and cost of the bill for the user described by the
/// profile.
pub struct AlignStage;

fn alignment_inputs(
    chunks: &[Chunk],
    task: TaskSpec,
    state: &PipelineState,
    feedback: &str,
) -> Vec<TaskInput> {
    chunks
        .iter()
        .map(|chunk| {
            let analysis = json!({
                "summaries": state.summaries,
                "investigation": state.investigation,
                "media": state.media,
                "bill_text": chunk.text,
            });
            TaskInput::structured(
                task,
                format!(
                    "User profile: {}\nBill analysis: {}{}\n{}",
                    state.user_profile, analysis, feedback, INFERENCE_REMINDER
                ),
                ResponseSchema::AlignmentRecords,
            )
        })
        .collect()
}

#[async_trait]
impl Stage for AlignStage {
    fn id(&self) -> StageId {
        StageId::Align
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::BillText, Field::Summaries, Field::Investigation, Field::UserProfile]
    }

    fn produces(&self) -> &'static [Field] {
        &[Field::Alignment, Field::AlignmentCorrection]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.id();
        let text = state.bill_text(stage)?;
        let summaries = state.summaries(stage)?;
        state.investigation(stage)?;
        let chunks = ctx.chunks(text);
        let tracking = &state.alignment_correction;
        let feedback = feedback_context(&tracking.feedback);

        let mut warnings = Vec::new();
        let mut calls = 0;
        let mut failures = 0;

        let benefits = ctx
            .fan_out(
                stage,
                alignment_inputs(&chunks, TaskSpec::AlignmentBenefits, state, &feedback),
                AnalysisOutput::into_record::<Records<AlignmentRecord>>,
            )
            .await?;
        let benefits = collect_records(benefits, stage, "benefits", &mut warnings, &mut calls, &mut failures);

        let drawbacks = ctx
            .fan_out(
                stage,
                alignment_inputs(&chunks, TaskSpec::AlignmentDrawbacks, state, &feedback),
                AnalysisOutput::into_record::<Records<AlignmentRecord>>,
            )
            .await?;
        let drawbacks = collect_records(drawbacks, stage, "drawbacks", &mut warnings, &mut calls, &mut failures);

        let cost_input = TaskInput::structured(
            TaskSpec::CostAnalysis,
            format!(
                "User profile: {}\nBill summary: {}\nBill text: {}{}\n{}",
                state.user_profile,
                summaries.detailed,
                leading_chars(text, ctx.settings.summary_prefix_chars),
                feedback,
                INFERENCE_REMINDER
            ),
            ResponseSchema::BillCost,
        );
        calls += 1;
        let cost_analysis = match ctx
            .invoke(stage, cost_input, AnalysisOutput::into_record::<BillCost>)
            .await?
        {
            Ok(cost) => Some(cost),
            Err(e) => {
                failures += 1;
                warnings.push(StageWarning::new(stage, format!("cost analysis failed: {}", e)));
                None
            }
        };

        if failures == calls {
            return Err(PipelineError::StageFailed {
                stage,
                reason: format!("all {} alignment calls failed", calls),
            });
        }

        info!(
            "[{}] {} benefits, {} drawbacks, cost analysis {}",
            stage,
            benefits.len(),
            drawbacks.len(),
            if cost_analysis.is_some() { "present" } else { "missing" }
        );

        Ok(StatePatch {
            alignment: Some(AlignmentFindings {
                benefits,
                drawbacks,
                cost_analysis,
            }),
            alignment_correction: Some(tracking.consumed()),
            ..StatePatch::default()
        }
        .with_warnings(warnings))
    }
}
