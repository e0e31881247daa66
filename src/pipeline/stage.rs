//! The stage abstraction and the context stages run in.

use super::correction::{CorrectionPolicy, SignificanceGate};
use super::state::{Field, PipelineState, StatePatch};
use super::StageId;
use crate::analysis::AnalysisTask;
use crate::chunker::{self, Chunk, ChunkConfig};
use crate::errors::{ConfigError, PipelineError};
use crate::sources::{BillSource, SearchSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A named unit of work: state snapshot in, state patch out.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Fields that must be present before the stage runs.
    fn requires(&self) -> &'static [Field];

    /// Fields the stage's patch may write.
    fn produces(&self) -> &'static [Field];

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError>;
}

/// Tunables shared by every stage of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub chunking: ChunkConfig,
    pub policy: CorrectionPolicy,
    /// Maximum in-flight analysis calls within a stage.
    pub concurrency: usize,
    /// Timeout applied to every analysis call.
    pub call_timeout: Duration,
    /// Leading characters of the bill used for the short summaries.
    pub summary_prefix_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            policy: CorrectionPolicy::default(),
            concurrency: 4,
            call_timeout: Duration::from_secs(300),
            summary_prefix_chars: 10_000,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.validate()?;
        self.policy.validate()?;
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid("timeout_seconds", "must be at least 1"));
        }
        if self.summary_prefix_chars == 0 {
            return Err(ConfigError::invalid("summary_prefix_chars", "must be at least 1"));
        }
        Ok(())
    }
}

/// Collaborators and settings available to a running stage.
#[derive(Clone)]
pub struct StageContext {
    pub analysis: Arc<dyn AnalysisTask>,
    pub bills: Arc<dyn BillSource>,
    pub news: Arc<dyn SearchSource>,
    pub web: Arc<dyn SearchSource>,
    pub gate: Arc<dyn SignificanceGate>,
    pub settings: PipelineSettings,
    pub cancel: CancellationToken,
}

impl StageContext {
    pub fn chunks(&self, text: &str) -> Vec<Chunk> {
        chunker::chunk(text, &self.settings.chunking)
    }

    pub fn policy(&self) -> &CorrectionPolicy {
        &self.settings.policy
    }
}
