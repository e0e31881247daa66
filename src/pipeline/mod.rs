//! Bill analysis pipeline.
//!
//! This module wires the analysis stages into the standard workflow graph:
//!
//! ```text
//! init -> summarize -> history -> investigate -> correct_investigation
//!                                   ^                 |
//!                                   +---- revise -----+---> align -> correct_alignment
//!                                                            ^             |
//!                                                            +-- revise ---+---> END
//! ```
//!
//! `media` is registered but not wired.

pub mod correction;
pub mod fanout;
pub mod followup;
pub mod graph;
pub mod router;
pub mod stage;
pub mod stages;
pub mod state;

use crate::analysis::AnalysisTask;
use crate::errors::PipelineError;
use crate::models::BillId;
use crate::sources::{BillSource, NoSearch, SearchSource};
use correction::{CorrectionLoop, CorrectionPolicy, CorrectionStage, LexicalGate, SignificanceGate};
use graph::{CompiledGraph, GraphBuilder, NoopObserver, RunObserver, TraceEntry};
use router::{route_alignment, route_investigation, Target};
use serde::{Deserialize, Serialize};
use stage::{PipelineSettings, StageContext};
use stages::{AlignStage, HistoryStage, InitStage, InvestigateStage, MediaStage, SummarizeStage};
use state::{PipelineState, StageWarning};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Identity of a node in the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Init,
    Summarize,
    History,
    Media,
    Investigate,
    CorrectInvestigation,
    Align,
    CorrectAlignment,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Init => "init",
            StageId::Summarize => "summarize",
            StageId::History => "history",
            StageId::Media => "media",
            StageId::Investigate => "investigate",
            StageId::CorrectInvestigation => "correct_investigation",
            StageId::Align => "align",
            StageId::CorrectAlignment => "correct_alignment",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to analyze and for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRequest {
    pub user_profile: String,
    pub congress: u32,
    pub bill_type: String,
    pub bill_number: u32,
}

/// Whether every analysis of a run succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    /// The run finished but some analyses were degraded; see the warnings.
    Partial,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete"),
            RunStatus::Partial => write!(f, "partial"),
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub status: RunStatus,
    pub state: PipelineState,
    pub trace: Vec<TraceEntry>,
    pub warnings: Vec<StageWarning>,
    pub duration_ms: u64,
}

/// Build the standard bill analysis graph for a correction policy.
pub fn standard_graph(policy: &CorrectionPolicy) -> Result<CompiledGraph, PipelineError> {
    GraphBuilder::new()
        .add_stage(InitStage)
        .add_stage(SummarizeStage)
        .add_stage(HistoryStage)
        .add_stage(MediaStage)
        .add_stage(InvestigateStage)
        .add_stage(CorrectionStage::new(CorrectionLoop::Investigation))
        .add_stage(AlignStage)
        .add_stage(CorrectionStage::new(CorrectionLoop::Alignment))
        .entry(StageId::Init)
        .edge(StageId::Init, Target::Stage(StageId::Summarize))
        .edge(StageId::Summarize, Target::Stage(StageId::History))
        .edge(StageId::History, Target::Stage(StageId::Investigate))
        .edge(StageId::Investigate, Target::Stage(StageId::CorrectInvestigation))
        .conditional(
            StageId::CorrectInvestigation,
            route_investigation,
            &[Target::Stage(StageId::Investigate), Target::Stage(StageId::Align)],
            policy.revisit_budget(CorrectionLoop::Investigation),
        )
        .edge(StageId::Align, Target::Stage(StageId::CorrectAlignment))
        .conditional(
            StageId::CorrectAlignment,
            route_alignment,
            &[Target::Stage(StageId::Align), Target::End],
            policy.revisit_budget(CorrectionLoop::Alignment),
        )
        .compile()
}

/// The bill analysis pipeline and its collaborators.
pub struct Pipeline {
    analysis: Arc<dyn AnalysisTask>,
    bills: Arc<dyn BillSource>,
    news: Arc<dyn SearchSource>,
    web: Arc<dyn SearchSource>,
    gate: Arc<dyn SignificanceGate>,
    observer: Arc<dyn RunObserver>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(analysis: Arc<dyn AnalysisTask>, bills: Arc<dyn BillSource>, settings: PipelineSettings) -> Self {
        Self {
            analysis,
            bills,
            news: Arc::new(NoSearch),
            web: Arc::new(NoSearch),
            gate: Arc::new(LexicalGate::default()),
            observer: Arc::new(NoopObserver),
            settings,
        }
    }

    pub fn with_search(mut self, news: Arc<dyn SearchSource>, web: Arc<dyn SearchSource>) -> Self {
        self.news = news;
        self.web = web;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn SignificanceGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Analyze one bill.
    ///
    /// Returns a complete or partial result; any graph-level failure aborts
    /// the run and discards the intermediate state.
    pub async fn run(&self, request: BillRequest, cancel: CancellationToken) -> Result<PipelineResult, PipelineError> {
        self.settings.validate()?;
        let bill = BillId::new(request.congress, &request.bill_type, request.bill_number)?;
        let graph = standard_graph(&self.settings.policy)?;

        info!(
            "Analyzing bill {} with {} (step limit {})",
            bill,
            self.analysis.model_name(),
            graph.step_limit()
        );

        let ctx = StageContext {
            analysis: Arc::clone(&self.analysis),
            bills: Arc::clone(&self.bills),
            news: Arc::clone(&self.news),
            web: Arc::clone(&self.web),
            gate: Arc::clone(&self.gate),
            settings: self.settings.clone(),
            cancel,
        };

        let started = Instant::now();
        let run = graph
            .run(PipelineState::new(request.user_profile, bill), &ctx, self.observer.as_ref())
            .await?;

        let warnings = run.state.warnings.clone();
        let status = if warnings.is_empty() {
            RunStatus::Complete
        } else {
            warn!("Run finished with {} degraded analyses", warnings.len());
            RunStatus::Partial
        };
        info!("Run {} after {} stage executions", status, run.trace.len());

        Ok(PipelineResult {
            status,
            state: run.state,
            trace: run.trace,
            warnings,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
