//! The record threaded through the workflow graph.
//!
//! Stages never mutate state directly. Each receives a snapshot and returns a
//! [`StatePatch`]; the graph checks the patch against the stage's declared
//! outputs and applies it before the next stage starts.

use super::StageId;
use crate::errors::PipelineError;
use crate::models::{
    AlignmentFindings, Amendment, BillId, BillMetadata, HistoryEntry, InvestigationFindings,
    MediaAnalysis, Sponsor, Summaries,
};
use crate::sources::BillRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named piece of pipeline state, used in stage contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    UserProfile,
    Bill,
    BillText,
    Metadata,
    Sponsors,
    Amendments,
    Status,
    Summaries,
    History,
    Media,
    Investigation,
    Alignment,
    InvestigationCorrection,
    AlignmentCorrection,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::UserProfile,
        Field::Bill,
        Field::BillText,
        Field::Metadata,
        Field::Sponsors,
        Field::Amendments,
        Field::Status,
        Field::Summaries,
        Field::History,
        Field::Media,
        Field::Investigation,
        Field::Alignment,
        Field::InvestigationCorrection,
        Field::AlignmentCorrection,
    ];

    /// Fields present before any stage runs.
    pub const INITIAL: [Field; 4] = [
        Field::UserProfile,
        Field::Bill,
        Field::InvestigationCorrection,
        Field::AlignmentCorrection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::UserProfile => "user_profile",
            Field::Bill => "bill",
            Field::BillText => "bill_text",
            Field::Metadata => "metadata",
            Field::Sponsors => "sponsors",
            Field::Amendments => "amendments",
            Field::Status => "status",
            Field::Summaries => "summaries",
            Field::History => "history",
            Field::Media => "media",
            Field::Investigation => "investigation",
            Field::Alignment => "alignment",
            Field::InvestigationCorrection => "investigation_correction",
            Field::AlignmentCorrection => "alignment_correction",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one correction loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionTracking {
    /// Passes of the loop's correction stage so far. Never reset during a run.
    pub attempts: u32,
    pub should_revise: bool,
    /// Issues for the target stage to address; empty when not revising.
    pub feedback: String,
}

impl CorrectionTracking {
    /// The same record with its feedback consumed.
    pub fn consumed(&self) -> Self {
        Self {
            feedback: String::new(),
            ..self.clone()
        }
    }
}

/// A degraded analysis: something a stage could not produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: StageId,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
}

impl StageWarning {
    pub fn new(stage: StageId, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            chunk: None,
        }
    }

    pub fn for_chunk(stage: StageId, chunk: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            chunk: Some(chunk),
        }
    }
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chunk {
            Some(chunk) => write!(f, "[{}] chunk {}: {}", self.stage, chunk, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// The shared pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub user_profile: String,
    pub bill: BillId,

    pub bill_text: Option<String>,
    pub metadata: Option<BillMetadata>,
    pub sponsors: Option<Vec<Sponsor>>,
    pub amendments: Option<Vec<Amendment>>,
    pub status: Option<String>,

    pub summaries: Option<Summaries>,
    pub history: Option<Vec<HistoryEntry>>,
    pub media: Option<Vec<MediaAnalysis>>,
    pub investigation: Option<InvestigationFindings>,
    pub alignment: Option<AlignmentFindings>,

    pub investigation_correction: CorrectionTracking,
    pub alignment_correction: CorrectionTracking,

    pub warnings: Vec<StageWarning>,
}

fn present<'a, T>(value: Option<&'a T>, stage: StageId, field: Field) -> Result<&'a T, PipelineError> {
    value.ok_or(PipelineError::MissingField { stage, field })
}

impl PipelineState {
    pub fn new(user_profile: impl Into<String>, bill: BillId) -> Self {
        Self {
            user_profile: user_profile.into(),
            bill,
            bill_text: None,
            metadata: None,
            sponsors: None,
            amendments: None,
            status: None,
            summaries: None,
            history: None,
            media: None,
            investigation: None,
            alignment: None,
            investigation_correction: CorrectionTracking::default(),
            alignment_correction: CorrectionTracking::default(),
            warnings: Vec::new(),
        }
    }

    /// Whether `field` currently holds a value.
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::UserProfile
            | Field::Bill
            | Field::InvestigationCorrection
            | Field::AlignmentCorrection => true,
            Field::BillText => self.bill_text.is_some(),
            Field::Metadata => self.metadata.is_some(),
            Field::Sponsors => self.sponsors.is_some(),
            Field::Amendments => self.amendments.is_some(),
            Field::Status => self.status.is_some(),
            Field::Summaries => self.summaries.is_some(),
            Field::History => self.history.is_some(),
            Field::Media => self.media.is_some(),
            Field::Investigation => self.investigation.is_some(),
            Field::Alignment => self.alignment.is_some(),
        }
    }

    pub fn bill_text(&self, stage: StageId) -> Result<&str, PipelineError> {
        present(self.bill_text.as_ref(), stage, Field::BillText).map(String::as_str)
    }

    pub fn metadata(&self, stage: StageId) -> Result<&BillMetadata, PipelineError> {
        present(self.metadata.as_ref(), stage, Field::Metadata)
    }

    pub fn sponsors(&self, stage: StageId) -> Result<&[Sponsor], PipelineError> {
        present(self.sponsors.as_ref(), stage, Field::Sponsors).map(Vec::as_slice)
    }

    pub fn amendments(&self, stage: StageId) -> Result<&[Amendment], PipelineError> {
        present(self.amendments.as_ref(), stage, Field::Amendments).map(Vec::as_slice)
    }

    pub fn summaries(&self, stage: StageId) -> Result<&Summaries, PipelineError> {
        present(self.summaries.as_ref(), stage, Field::Summaries)
    }

    pub fn investigation(&self, stage: StageId) -> Result<&InvestigationFindings, PipelineError> {
        present(self.investigation.as_ref(), stage, Field::Investigation)
    }

    pub fn alignment(&self, stage: StageId) -> Result<&AlignmentFindings, PipelineError> {
        present(self.alignment.as_ref(), stage, Field::Alignment)
    }

    /// The bill's stated purpose: all summary levels, else the title.
    pub fn original_purpose(&self) -> String {
        let purpose = self
            .summaries
            .as_ref()
            .map(Summaries::purpose)
            .unwrap_or_default();
        if !purpose.is_empty() {
            return purpose;
        }
        self.metadata
            .as_ref()
            .map(|m| m.title.clone())
            .unwrap_or_default()
    }

    /// Apply a stage's patch. Contract checks happen before this.
    pub fn apply(&mut self, patch: StatePatch) {
        let StatePatch {
            bill,
            summaries,
            history,
            media,
            investigation,
            alignment,
            investigation_correction,
            alignment_correction,
            warnings,
        } = patch;

        if let Some(record) = bill {
            self.bill_text = Some(record.full_text);
            self.metadata = Some(record.metadata);
            self.sponsors = Some(record.sponsors);
            self.amendments = Some(record.amendments);
            self.status = Some(record.status);
        }
        if summaries.is_some() {
            self.summaries = summaries;
        }
        if history.is_some() {
            self.history = history;
        }
        if media.is_some() {
            self.media = media;
        }
        if investigation.is_some() {
            self.investigation = investigation;
        }
        if alignment.is_some() {
            self.alignment = alignment;
        }
        if let Some(tracking) = investigation_correction {
            self.investigation_correction = tracking;
        }
        if let Some(tracking) = alignment_correction {
            self.alignment_correction = tracking;
        }
        self.warnings.extend(warnings);
    }
}

/// Changes produced by one stage execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Fetched bill data; sets text, metadata, sponsors, amendments and status.
    pub bill: Option<BillRecord>,
    pub summaries: Option<Summaries>,
    pub history: Option<Vec<HistoryEntry>>,
    pub media: Option<Vec<MediaAnalysis>>,
    pub investigation: Option<InvestigationFindings>,
    pub alignment: Option<AlignmentFindings>,
    pub investigation_correction: Option<CorrectionTracking>,
    pub alignment_correction: Option<CorrectionTracking>,
    pub warnings: Vec<StageWarning>,
}

impl StatePatch {
    /// Every field this patch writes.
    pub fn written_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.bill.is_some() {
            fields.extend([
                Field::BillText,
                Field::Metadata,
                Field::Sponsors,
                Field::Amendments,
                Field::Status,
            ]);
        }
        let singles = [
            (self.summaries.is_some(), Field::Summaries),
            (self.history.is_some(), Field::History),
            (self.media.is_some(), Field::Media),
            (self.investigation.is_some(), Field::Investigation),
            (self.alignment.is_some(), Field::Alignment),
            (self.investigation_correction.is_some(), Field::InvestigationCorrection),
            (self.alignment_correction.is_some(), Field::AlignmentCorrection),
        ];
        fields.extend(singles.into_iter().filter(|(set, _)| *set).map(|(_, f)| f));
        fields
    }

    pub fn with_warnings(mut self, warnings: Vec<StageWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillMetadata;

    fn state() -> PipelineState {
        PipelineState::new("Teacher in Ohio", BillId::new(119, "hr", 1).unwrap())
    }

    fn record() -> BillRecord {
        BillRecord {
            metadata: BillMetadata {
                title: "Example Act".to_string(),
                ..BillMetadata::default()
            },
            full_text: "SEC. 1. Short title.".to_string(),
            sponsors: Vec::new(),
            amendments: Vec::new(),
            status: "Introduced".to_string(),
        }
    }

    #[test]
    fn test_field_display_is_snake_case() {
        assert_eq!(Field::Summaries.to_string(), "summaries");
        assert_eq!(Field::InvestigationCorrection.to_string(), "investigation_correction");
        for field in Field::ALL {
            let json = serde_json::to_value(field).unwrap();
            assert_eq!(json, field.as_str());
        }
    }

    #[test]
    fn test_missing_field_names_stage_and_field() {
        let err = state().summaries(StageId::Investigate).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingField {
                stage: StageId::Investigate,
                field: Field::Summaries
            }
        ));
    }

    #[test]
    fn test_initial_fields_are_present() {
        let state = state();
        for field in Field::ALL {
            assert_eq!(state.has(field), Field::INITIAL.contains(&field), "{}", field);
        }
    }

    #[test]
    fn test_bill_patch_writes_five_fields() {
        let patch = StatePatch {
            bill: Some(record()),
            ..StatePatch::default()
        };
        assert_eq!(patch.written_fields().len(), 5);

        let mut state = state();
        state.apply(patch);
        assert_eq!(state.bill_text(StageId::Summarize).unwrap(), "SEC. 1. Short title.");
        assert_eq!(state.status.as_deref(), Some("Introduced"));
        assert_eq!(state.original_purpose(), "Example Act");
    }

    #[test]
    fn test_apply_keeps_unwritten_fields_and_appends_warnings() {
        let mut state = state();
        state.apply(StatePatch {
            summaries: Some(Summaries::default()),
            warnings: vec![StageWarning::new(StageId::Summarize, "first")],
            ..StatePatch::default()
        });
        state.apply(StatePatch {
            warnings: vec![StageWarning::for_chunk(StageId::History, 2, "second")],
            ..StatePatch::default()
        });

        assert!(state.summaries.is_some());
        assert_eq!(state.warnings.len(), 2);
        assert_eq!(state.warnings[1].to_string(), "[history] chunk 2: second");
    }

    #[test]
    fn test_consumed_tracking_keeps_counters() {
        let tracking = CorrectionTracking {
            attempts: 2,
            should_revise: true,
            feedback: "Fix the dollar amount".to_string(),
        };
        let consumed = tracking.consumed();
        assert_eq!(consumed.attempts, 2);
        assert!(consumed.should_revise);
        assert!(consumed.feedback.is_empty());
    }
}
