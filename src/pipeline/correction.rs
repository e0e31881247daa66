//! Self-correction: validate a stage's findings against the bill text and
//! decide whether the stage should run again.
//!
//! For each finding kind the stage summarizes the claims, fact-checks them
//! against every chunk, and synthesizes a verdict from the chunks that
//! reported problems. A verdict that passes the [`SignificanceGate`] asks for
//! a revision.

use super::stage::{Stage, StageContext};
use super::state::{CorrectionTracking, Field, PipelineState, StageWarning, StatePatch};
use super::StageId;
use crate::analysis::prompts::VALIDATION_CHECKLIST;
use crate::analysis::{AnalysisOutput, TaskInput, TaskSpec};
use crate::chunker::Chunk;
use crate::errors::{ConfigError, PipelineError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Correction loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPolicy {
    /// Maximum re-runs of each loop's target stage.
    pub max_attempts: u32,
    pub investigation_enabled: bool,
    pub alignment_enabled: bool,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            investigation_enabled: false,
            alignment_enabled: false,
        }
    }
}

impl CorrectionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_correction_attempts", "must be at least 1"));
        }
        Ok(())
    }

    pub fn enabled(&self, kind: CorrectionLoop) -> bool {
        match kind {
            CorrectionLoop::Investigation => self.investigation_enabled,
            CorrectionLoop::Alignment => self.alignment_enabled,
        }
    }

    /// Extra stage executions a loop may add: each re-run executes the
    /// target and the correction stage once more.
    pub fn revisit_budget(&self, kind: CorrectionLoop) -> usize {
        if self.enabled(kind) {
            2 * self.max_attempts as usize
        } else {
            0
        }
    }
}

/// Decides whether a verdict describes problems worth a revision.
pub trait SignificanceGate: Send + Sync {
    fn is_significant(&self, verdict: &str) -> bool;
}

/// Case-insensitive keyword search over the verdict text.
#[derive(Debug, Clone)]
pub struct LexicalGate {
    markers: Vec<String>,
}

impl Default for LexicalGate {
    fn default() -> Self {
        Self::new(["clear", "significant", "critical"])
    }
}

impl LexicalGate {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers.into_iter().map(|m| m.as_ref().to_lowercase()).collect(),
        }
    }
}

impl SignificanceGate for LexicalGate {
    fn is_significant(&self, verdict: &str) -> bool {
        let verdict = verdict.to_lowercase();
        self.markers.iter().any(|marker| verdict.contains(marker.as_str()))
    }
}

/// The two correction loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionLoop {
    Investigation,
    Alignment,
}

impl CorrectionLoop {
    pub fn stage(&self) -> StageId {
        match self {
            CorrectionLoop::Investigation => StageId::CorrectInvestigation,
            CorrectionLoop::Alignment => StageId::CorrectAlignment,
        }
    }

    pub fn target(&self) -> StageId {
        match self {
            CorrectionLoop::Investigation => StageId::Investigate,
            CorrectionLoop::Alignment => StageId::Align,
        }
    }

    pub fn tracking<'a>(&self, state: &'a PipelineState) -> &'a CorrectionTracking {
        match self {
            CorrectionLoop::Investigation => &state.investigation_correction,
            CorrectionLoop::Alignment => &state.alignment_correction,
        }
    }
}

/// Serialized findings of one kind, ready for validation.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingKind {
    pub label: &'static str,
    pub claims: String,
}

impl FindingKind {
    /// A kind whose findings cannot be serialized is reported as a warning
    /// and left out of validation.
    fn new<T: Serialize + ?Sized>(
        stage: StageId,
        label: &'static str,
        findings: &T,
    ) -> Result<Self, StageWarning> {
        let claims = serde_json::to_string_pretty(findings).map_err(|e| {
            StageWarning::new(
                stage,
                format!("{} findings could not be serialized, kind not validated: {}", label, e),
            )
        })?;
        Ok(Self { label, claims })
    }

    fn with_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            self.claims = format!("Original purpose: {}\n\nFindings: {}", context, self.claims);
        }
        self
    }
}

/// Verdict for one finding kind.
#[derive(Debug, Clone, Default, PartialEq)]
struct KindVerdict {
    text: String,
    warnings: Vec<StageWarning>,
}

/// Validate one finding kind against the chunks.
async fn validate_kind(
    stage: StageId,
    kind: &FindingKind,
    chunks: &[Chunk],
    ctx: &StageContext,
) -> Result<KindVerdict, PipelineError> {
    let mut verdict = KindVerdict::default();

    let summary_input = TaskInput::text(
        TaskSpec::ClaimsSummary,
        format!("{} findings:\n{}", kind.label, kind.claims),
    );
    let claims_summary = match ctx.invoke(stage, summary_input, AnalysisOutput::into_text).await? {
        Ok(summary) => summary,
        Err(e) => {
            verdict.warnings.push(StageWarning::new(
                stage,
                format!("{} claims summary failed, kind not validated: {}", kind.label, e),
            ));
            return Ok(verdict);
        }
    };

    let inputs = chunks
        .iter()
        .map(|chunk| {
            TaskInput::text(
                TaskSpec::ValidateClaims,
                format!(
                    "Claims summary: {}\n\nDetailed claims: {}\n\nBill text section: {}\n\n{}",
                    claims_summary, kind.claims, chunk.text, VALIDATION_CHECKLIST
                ),
            )
        })
        .collect();
    let checks = ctx.fan_out(stage, inputs, AnalysisOutput::into_text).await?;
    verdict
        .warnings
        .extend(checks.warnings(stage, &format!("{} validation", kind.label)));

    let issues: Vec<String> = checks
        .values()
        .filter(|text| !text.trim().is_empty())
        .collect();
    if issues.is_empty() {
        debug!("[{}] {}: no issues reported", stage, kind.label);
        return Ok(verdict);
    }

    let synthesis_input = TaskInput::text(
        TaskSpec::SynthesizeVerdict,
        format!(
            "Findings from all bill sections:\n{}\n\nList only clear factual errors and significant misinformation that definitely require revision.",
            issues.join("\n")
        ),
    );
    match ctx.invoke(stage, synthesis_input, AnalysisOutput::into_text).await? {
        Ok(text) => verdict.text = text,
        Err(e) => verdict.warnings.push(StageWarning::new(
            stage,
            format!("{} verdict synthesis failed: {}", kind.label, e),
        )),
    }
    Ok(verdict)
}

/// Feedback handed to the target stage for its next run.
pub fn format_feedback(attempt: u32, max: u32, verdicts: &[(&str, &str)]) -> String {
    let mut feedback = format!("Issues requiring revision (attempt {} of {}):", attempt, max);
    for (label, verdict) in verdicts {
        if !verdict.trim().is_empty() {
            feedback.push_str(&format!("\n\n{} issues:\n{}", label, verdict.trim()));
        }
    }
    feedback
}

/// The correction stage of one loop.
pub struct CorrectionStage {
    kind: CorrectionLoop,
}

impl CorrectionStage {
    pub fn new(kind: CorrectionLoop) -> Self {
        Self { kind }
    }

    fn finding_kinds(
        &self,
        state: &PipelineState,
    ) -> Result<Vec<Result<FindingKind, StageWarning>>, PipelineError> {
        let stage = self.kind.stage();
        match self.kind {
            CorrectionLoop::Investigation => {
                let findings = state.investigation(stage)?;
                Ok(vec![
                    FindingKind::new(stage, "Pork barrel", &findings.pork_barrel_spending),
                    FindingKind::new(stage, "Trojan horse", &findings.trojan_horses)
                        .map(|kind| kind.with_context(&state.original_purpose())),
                    FindingKind::new(stage, "Sleeper provision", &findings.sleeper_provisions),
                    FindingKind::new(stage, "Beneficiary", &findings.beneficiaries),
                ])
            }
            CorrectionLoop::Alignment => {
                let findings = state.alignment(stage)?;
                Ok(vec![
                    FindingKind::new(stage, "Benefits", &findings.benefits),
                    FindingKind::new(stage, "Drawbacks", &findings.drawbacks),
                    FindingKind::new(stage, "Cost", &findings.cost_analysis),
                ])
            }
        }
    }

    fn patch(&self, tracking: CorrectionTracking, warnings: Vec<StageWarning>) -> StatePatch {
        let patch = match self.kind {
            CorrectionLoop::Investigation => StatePatch {
                investigation_correction: Some(tracking),
                ..StatePatch::default()
            },
            CorrectionLoop::Alignment => StatePatch {
                alignment_correction: Some(tracking),
                ..StatePatch::default()
            },
        };
        patch.with_warnings(warnings)
    }
}

#[async_trait]
impl Stage for CorrectionStage {
    fn id(&self) -> StageId {
        self.kind.stage()
    }

    fn requires(&self) -> &'static [Field] {
        match self.kind {
            CorrectionLoop::Investigation => &[Field::Investigation, Field::BillText],
            CorrectionLoop::Alignment => &[Field::Alignment, Field::BillText],
        }
    }

    fn produces(&self) -> &'static [Field] {
        match self.kind {
            CorrectionLoop::Investigation => &[Field::InvestigationCorrection],
            CorrectionLoop::Alignment => &[Field::AlignmentCorrection],
        }
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.kind.stage();
        let policy = ctx.policy();
        let attempt = self.kind.tracking(state).attempts + 1;
        let resting = CorrectionTracking {
            attempts: attempt,
            should_revise: false,
            feedback: String::new(),
        };

        if !policy.enabled(self.kind) {
            debug!("[{}] correction disabled, recording attempt {}", stage, attempt);
            return Ok(self.patch(resting, Vec::new()));
        }

        if attempt > policy.max_attempts {
            warn!(
                "[{}] maximum correction attempts ({}) reached, proceeding",
                stage, policy.max_attempts
            );
            let warning = StageWarning::new(
                stage,
                format!(
                    "maximum correction attempts ({}) reached; {} findings may contain unresolved issues",
                    policy.max_attempts,
                    self.kind.target()
                ),
            );
            return Ok(self.patch(resting, vec![warning]));
        }

        let mut warnings = Vec::new();
        let mut kinds = Vec::new();
        for kind in self.finding_kinds(state)? {
            match kind {
                Ok(kind) => kinds.push(kind),
                Err(warning) => {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        let chunks = ctx.chunks(state.bill_text(stage)?);
        info!(
            "[{}] validating {} finding kinds against {} chunks (attempt {} of {})",
            stage,
            kinds.len(),
            chunks.len(),
            attempt,
            policy.max_attempts
        );

        let mut verdicts = Vec::new();
        for kind in &kinds {
            let verdict = validate_kind(stage, kind, &chunks, ctx).await?;
            warnings.extend(verdict.warnings);
            verdicts.push((kind.label, verdict.text));
        }

        let should_revise = verdicts
            .iter()
            .any(|(_, text)| !text.trim().is_empty() && ctx.gate.is_significant(text));
        let feedback = if should_revise {
            let pairs: Vec<(&str, &str)> = verdicts.iter().map(|(l, t)| (*l, t.as_str())).collect();
            format_feedback(attempt, policy.max_attempts, &pairs)
        } else {
            String::new()
        };

        info!(
            "[{}] attempt {}: {}",
            stage,
            attempt,
            if should_revise { "revision requested" } else { "findings accepted" }
        );

        Ok(self.patch(
            CorrectionTracking {
                attempts: attempt,
                should_revise,
                feedback,
            },
            warnings,
        ))
    }
}
