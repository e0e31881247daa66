use super::collect_records;
use crate::analysis::prompts::{feedback_context, EVIDENCE_REMINDER};
use crate::analysis::{AnalysisOutput, ResponseSchema, TaskInput, TaskSpec};
use crate::chunker::Chunk;
use crate::errors::PipelineError;
use crate::models::{
    BeneficiaryRecord, InvestigationFindings, PorkRecord, Records, TrojanHorseRecord,
};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use tracing::info;

/// Pork-barrel, trojan-horse, sleeper-provision and beneficiary findings.
pub struct InvestigateStage;

fn inputs(
    chunks: &[Chunk],
    task: TaskSpec,
    schema: ResponseSchema,
    preamble: &str,
    feedback: &str,
) -> Vec<TaskInput> {
    chunks
        .iter()
        .map(|chunk| {
            TaskInput::structured(
                task,
                format!("{}{}{}\n{}", preamble, chunk.text, feedback, EVIDENCE_REMINDER),
                schema,
            )
        })
        .collect()
}

#[async_trait]
impl Stage for InvestigateStage {
    fn id(&self) -> StageId {
        StageId::Investigate
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::BillText, Field::Summaries]
    }

    fn produces(&self) -> &'static [Field] {
        &[Field::Investigation, Field::InvestigationCorrection]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.id();
        let chunks = ctx.chunks(state.bill_text(stage)?);
        state.summaries(stage)?;
        let purpose = state.original_purpose();
        let tracking = &state.investigation_correction;
        let feedback = feedback_context(&tracking.feedback);
        if !feedback.is_empty() {
            info!("[{}] re-running with correction feedback", stage);
        }

        let trojan_preamble = format!("Original purpose: {}\nBill text: ", purpose);
        let mut warnings = Vec::new();
        let mut calls = 0;
        let mut failures = 0;

        let pork = ctx
            .fan_out(
                stage,
                inputs(&chunks, TaskSpec::PorkBarrel, ResponseSchema::PorkRecords, "", &feedback),
                AnalysisOutput::into_record::<Records<PorkRecord>>,
            )
            .await?;
        let pork_barrel_spending = collect_records(pork, stage, "pork barrel", &mut warnings, &mut calls, &mut failures);

        let trojans = ctx
            .fan_out(
                stage,
                inputs(
                    &chunks,
                    TaskSpec::TrojanHorse,
                    ResponseSchema::TrojanHorseRecords,
                    &trojan_preamble,
                    &feedback,
                ),
                AnalysisOutput::into_record::<Records<TrojanHorseRecord>>,
            )
            .await?;
        let trojan_horses = collect_records(trojans, stage, "trojan horse", &mut warnings, &mut calls, &mut failures);

        let sleepers = ctx
            .fan_out(
                stage,
                inputs(
                    &chunks,
                    TaskSpec::SleeperProvision,
                    ResponseSchema::TrojanHorseRecords,
                    "",
                    &feedback,
                ),
                AnalysisOutput::into_record::<Records<TrojanHorseRecord>>,
            )
            .await?;
        let sleeper_provisions =
            collect_records(sleepers, stage, "sleeper provision", &mut warnings, &mut calls, &mut failures);

        let beneficiaries = ctx
            .fan_out(
                stage,
                inputs(
                    &chunks,
                    TaskSpec::Beneficiaries,
                    ResponseSchema::BeneficiaryRecords,
                    "",
                    &feedback,
                ),
                AnalysisOutput::into_record::<Records<BeneficiaryRecord>>,
            )
            .await?;
        let beneficiaries =
            collect_records(beneficiaries, stage, "beneficiary", &mut warnings, &mut calls, &mut failures);

        if calls > 0 && failures == calls {
            return Err(PipelineError::StageFailed {
                stage,
                reason: format!("all {} investigation calls failed", calls),
            });
        }

        let findings = InvestigationFindings {
            pork_barrel_spending,
            trojan_horses,
            sleeper_provisions,
            beneficiaries,
        };
        info!(
            "[{}] {} findings across {} chunks ({} failed calls)",
            stage,
            findings.total(),
            chunks.len(),
            failures
        );

        Ok(StatePatch {
            investigation: Some(findings),
            investigation_correction: Some(tracking.consumed()),
            ..StatePatch::default()
        }
        .with_warnings(warnings))
    }
}
