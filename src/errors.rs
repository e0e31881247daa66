//! Error types for the analysis pipeline.
//!
//! Data-source errors are fatal to a run, analysis errors are recovered at
//! chunk granularity, and configuration errors are fatal at startup.

use crate::pipeline::state::Field;
use crate::pipeline::StageId;
use thiserror::Error;

/// Failure fetching bill data from the legislative data service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single AnalysisTask invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid analysis response: {0}")]
    InvalidResponse(String),
    #[error("analysis backend rate limited: {0}")]
    RateLimited(String),
}

impl AnalysisError {
    /// Whether a backend may succeed if the same request is sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_))
    }
}

/// Invalid configuration or request, detected before a run starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("missing required field `{0}`")]
    Missing(&'static str),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Graph-level failure: the run is aborted and no partial state is returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed to fetch bill data: {source}")]
    DataSource {
        stage: StageId,
        #[source]
        source: DataSourceError,
    },
    #[error("stage {stage} failed: {reason}")]
    StageFailed { stage: StageId, reason: String },
    #[error("stage {stage} read `{field}` before it was produced")]
    MissingField { stage: StageId, field: Field },
    #[error("stage {stage} wrote undeclared field `{field}`")]
    ContractViolation { stage: StageId, field: Field },
    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),
    #[error("run exceeded the step limit of {0} stage executions")]
    StepLimit(usize),
    #[error("pipeline run cancelled")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
