//! The analysis capability used by every pipeline stage.
//!
//! An [`AnalysisTask`] runs one analysis request (a task, an input text and
//! an optional response schema) and returns free text or a structured record.
//! The orchestrator treats it as a slow external dependency.

pub mod ollama;
pub mod prompts;

pub use ollama::{OllamaAnalysis, OllamaConfig};

use crate::errors::AnalysisError;
use crate::models::Structured;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Which analysis to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSpec {
    SummarizeOneLine,
    SummarizeDetailed,
    SummarizeSections,
    SponsorProfile,
    AmendmentChanges,
    MediaNews,
    MediaSearch,
    MediaExpert,
    MediaWatchdog,
    PorkBarrel,
    TrojanHorse,
    SleeperProvision,
    Beneficiaries,
    AlignmentBenefits,
    AlignmentDrawbacks,
    CostAnalysis,
    ClaimsSummary,
    ValidateClaims,
    SynthesizeVerdict,
    WriteLetter,
    ScoreImpact,
}

impl TaskSpec {
    /// System prompt sent with every request for this task.
    pub fn system_prompt(&self) -> &'static str {
        use prompts::*;
        match self {
            TaskSpec::SummarizeOneLine => SUMMARY_ONE_LINE,
            TaskSpec::SummarizeDetailed => SUMMARY_DETAILED,
            TaskSpec::SummarizeSections => SUMMARY_SECTIONS,
            TaskSpec::SponsorProfile => SPONSOR_PROFILE,
            TaskSpec::AmendmentChanges => AMENDMENT_ANALYSIS,
            TaskSpec::MediaNews => MEDIA_NEWS,
            TaskSpec::MediaSearch => MEDIA_SEARCH,
            TaskSpec::MediaExpert => MEDIA_EXPERT,
            TaskSpec::MediaWatchdog => MEDIA_WATCHDOG,
            TaskSpec::PorkBarrel => PORK_BARREL,
            TaskSpec::TrojanHorse => TROJAN_HORSE,
            TaskSpec::SleeperProvision => SLEEPER_PROVISION,
            TaskSpec::Beneficiaries => BENEFICIARIES,
            TaskSpec::AlignmentBenefits => ALIGNMENT_BENEFITS,
            TaskSpec::AlignmentDrawbacks => ALIGNMENT_DRAWBACKS,
            TaskSpec::CostAnalysis => COST_ANALYSIS,
            TaskSpec::ClaimsSummary => CLAIMS_SUMMARY,
            TaskSpec::ValidateClaims => VALIDATE_CLAIMS,
            TaskSpec::SynthesizeVerdict => SYNTHESIZE_VERDICT,
            TaskSpec::WriteLetter => WRITE_LETTER,
            TaskSpec::ScoreImpact => SCORE_IMPACT,
        }
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Named response shapes a structured task must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSchema {
    ChangeRecords,
    PorkRecords,
    TrojanHorseRecords,
    BeneficiaryRecords,
    AlignmentRecords,
    BillCost,
    ImpactScores,
}

fn severity_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["low", "medium", "high"],
        "description": prompts::SEVERITY_GUIDELINES,
    })
}

fn records_of(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "records": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        },
        "required": ["records"],
    })
}

impl ResponseSchema {
    /// JSON schema passed to the backend.
    pub fn json_schema(&self) -> Value {
        let text = json!({ "type": "string" });
        match self {
            ResponseSchema::ChangeRecords => records_of(
                json!({
                    "title": text,
                    "explanation": text,
                    "concern": text,
                    "severity": severity_schema(),
                }),
                &["title", "explanation", "concern", "severity"],
            ),
            ResponseSchema::PorkRecords | ResponseSchema::TrojanHorseRecords => records_of(
                json!({
                    "title": text,
                    "explanation": text,
                    "concern": text,
                    "severity": severity_schema(),
                    "why": text,
                }),
                &["title", "explanation", "concern", "severity", "why"],
            ),
            ResponseSchema::BeneficiaryRecords => records_of(
                json!({
                    "name": text,
                    "benefit": text,
                    "severity": severity_schema(),
                }),
                &["name", "benefit", "severity"],
            ),
            ResponseSchema::AlignmentRecords => records_of(
                json!({
                    "benefit_or_harm": { "type": "string", "enum": ["benefit", "harm"] },
                    "effect_type": { "type": "string", "enum": ["me", "family", "community"] },
                    "summary": text,
                    "explanation": text,
                    "severity": severity_schema(),
                }),
                &["benefit_or_harm", "effect_type", "summary", "explanation", "severity"],
            ),
            ResponseSchema::BillCost => json!({
                "type": "object",
                "properties": {
                    "cost_explanation": text,
                    "alternatives": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": { "alternative": text, "explanation": text },
                            "required": ["alternative", "explanation"],
                        }
                    }
                },
                "required": ["cost_explanation", "alternatives"],
            }),
            ResponseSchema::ImpactScores => {
                let score = json!({ "type": "integer", "minimum": 0, "maximum": 100 });
                json!({
                    "type": "object",
                    "properties": {
                        "personal": score,
                        "family": score,
                        "community": score,
                        "overall": score,
                        "rationale": text,
                    },
                    "required": ["personal", "family", "community", "overall", "rationale"],
                })
            }
        }
    }
}

/// One analysis request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInput {
    pub task: TaskSpec,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResponseSchema>,
}

impl TaskInput {
    pub fn text(task: TaskSpec, input: impl Into<String>) -> Self {
        Self {
            task,
            input: input.into(),
            schema: None,
        }
    }

    pub fn structured(task: TaskSpec, input: impl Into<String>, schema: ResponseSchema) -> Self {
        Self {
            task,
            input: input.into(),
            schema: Some(schema),
        }
    }
}

/// Result of an analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    Text(String),
    Structured(Value),
}

impl AnalysisOutput {
    pub fn into_text(self) -> Result<String, AnalysisError> {
        match self {
            AnalysisOutput::Text(text) => Ok(text),
            AnalysisOutput::Structured(_) => Err(AnalysisError::InvalidResponse(
                "expected free text, got a structured record".to_string(),
            )),
        }
    }

    /// Decode and validate a structured response.
    pub fn into_record<T: Structured>(self) -> Result<T, AnalysisError> {
        let value = match self {
            AnalysisOutput::Structured(value) => value,
            AnalysisOutput::Text(text) => serde_json::from_str(&text).map_err(|e| {
                AnalysisError::InvalidResponse(format!("response is not JSON: {}", e))
            })?,
        };
        let record: T = serde_json::from_value(value).map_err(|e| {
            AnalysisError::InvalidResponse(format!("does not match {:?}: {}", T::SCHEMA, e))
        })?;
        record.validate().map_err(AnalysisError::InvalidResponse)?;
        Ok(record)
    }
}

/// The external analysis capability.
///
/// Implementations own any retry policy; callers apply their own timeout.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    async fn invoke(&self, input: TaskInput) -> Result<AnalysisOutput, AnalysisError>;

    /// Name of the backing model, for reports.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillCost, PorkRecord, Records};

    #[test]
    fn test_every_task_has_a_prompt() {
        let tasks = [
            TaskSpec::SummarizeOneLine,
            TaskSpec::SponsorProfile,
            TaskSpec::PorkBarrel,
            TaskSpec::ValidateClaims,
            TaskSpec::SynthesizeVerdict,
            TaskSpec::ScoreImpact,
        ];
        for task in tasks {
            assert!(!task.system_prompt().trim().is_empty(), "{}", task);
        }
    }

    #[test]
    fn test_task_display_is_snake_case() {
        assert_eq!(TaskSpec::CostAnalysis.to_string(), "cost_analysis");
        assert_eq!(TaskSpec::SummarizeOneLine.to_string(), "summarize_one_line");
    }

    #[test]
    fn test_schema_lists_severity_bands() {
        let schema = ResponseSchema::PorkRecords.json_schema();
        let severity = &schema["properties"]["records"]["items"]["properties"]["severity"];
        assert_eq!(severity["enum"], json!(["low", "medium", "high"]));
        assert_eq!(
            schema["properties"]["records"]["items"]["required"],
            json!(["title", "explanation", "concern", "severity", "why"])
        );
    }

    #[test]
    fn test_into_record_accepts_json_text() {
        let output = AnalysisOutput::Text(
            r#"{"cost_explanation": "$5M over 5 years", "alternatives": []}"#.to_string(),
        );
        let cost: BillCost = output.into_record().unwrap();
        assert_eq!(cost.cost_explanation, "$5M over 5 years");
    }

    #[test]
    fn test_into_record_rejects_invalid_records() {
        let output = AnalysisOutput::Structured(json!({
            "records": [{
                "title": "",
                "explanation": "x",
                "concern": "y",
                "severity": "low",
                "why": "z"
            }]
        }));
        let err = output.into_record::<Records<PorkRecord>>().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));

        let output = AnalysisOutput::Structured(json!({ "records": [{ "title": "only" }] }));
        assert!(output.into_record::<Records<PorkRecord>>().is_err());
    }

    #[test]
    fn test_into_text_rejects_structured() {
        assert!(AnalysisOutput::Structured(json!({})).into_text().is_err());
        assert_eq!(
            AnalysisOutput::Text("ok".into()).into_text().unwrap(),
            "ok"
        );
    }
}
