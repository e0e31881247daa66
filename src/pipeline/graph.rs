//! Workflow graph: stage registration, topology validation and execution.
//!
//! A graph is assembled with [`GraphBuilder`] and validated by
//! [`GraphBuilder::compile`], which rejects unknown targets, dead ends and
//! any path on which a stage would read a field no earlier stage produced.
//! [`CompiledGraph::run`] then drives execution from the entry node to `END`.

use super::router::{Router, Target};
use super::stage::{Stage, StageContext};
use super::state::{Field, PipelineState};
use super::StageId;
use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Outgoing transition of a node.
#[derive(Clone)]
enum Transition {
    Fixed(Target),
    Conditional {
        router: Router,
        targets: Vec<Target>,
        /// Extra stage executions this loop may add over a straight run.
        revisit_budget: usize,
    },
}

impl Transition {
    fn targets(&self) -> Vec<Target> {
        match self {
            Transition::Fixed(target) => vec![*target],
            Transition::Conditional { targets, .. } => targets.clone(),
        }
    }
}

/// One stage execution in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub step: usize,
    pub stage: StageId,
    pub duration_ms: u64,
    pub warnings: usize,
    pub next: Target,
}

/// Receives progress notifications during a run.
pub trait RunObserver: Send + Sync {
    fn stage_started(&self, _stage: StageId, _step: usize) {}
    fn stage_finished(&self, _entry: &TraceEntry) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Mutable graph under construction.
#[derive(Default)]
pub struct GraphBuilder {
    stages: BTreeMap<StageId, Arc<dyn Stage>>,
    transitions: BTreeMap<StageId, Transition>,
    entry: Option<StageId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.insert(stage.id(), Arc::new(stage));
        self
    }

    pub fn entry(mut self, stage: StageId) -> Self {
        self.entry = Some(stage);
        self
    }

    pub fn edge(mut self, from: StageId, to: Target) -> Self {
        self.transitions.insert(from, Transition::Fixed(to));
        self
    }

    pub fn conditional(
        mut self,
        from: StageId,
        router: Router,
        targets: &[Target],
        revisit_budget: usize,
    ) -> Self {
        self.transitions.insert(
            from,
            Transition::Conditional {
                router,
                targets: targets.to_vec(),
                revisit_budget,
            },
        );
        self
    }

    /// Validate the topology and freeze the graph.
    pub fn compile(self) -> Result<CompiledGraph, PipelineError> {
        let entry = self
            .entry
            .ok_or_else(|| PipelineError::InvalidGraph("no entry stage set".to_string()))?;
        if !self.stages.contains_key(&entry) {
            return Err(PipelineError::InvalidGraph(format!(
                "entry stage {} is not registered",
                entry
            )));
        }

        for (from, transition) in &self.transitions {
            if !self.stages.contains_key(from) {
                return Err(PipelineError::InvalidGraph(format!(
                    "transition from unregistered stage {}",
                    from
                )));
            }
            for target in transition.targets() {
                if let Target::Stage(to) = target {
                    if !self.stages.contains_key(&to) {
                        return Err(PipelineError::InvalidGraph(format!(
                            "{} routes to unregistered stage {}",
                            from, to
                        )));
                    }
                }
            }
        }

        let reachable = self.reachable(entry);
        for stage in &reachable {
            if !self.transitions.contains_key(stage) {
                return Err(PipelineError::InvalidGraph(format!(
                    "stage {} has no outgoing transition",
                    stage
                )));
            }
        }
        for stage in self.stages.keys().filter(|s| !reachable.contains(s)) {
            debug!("Stage {} is registered but unreachable from {}", stage, entry);
        }

        self.check_dataflow(entry, &reachable)?;

        let revisits: usize = reachable
            .iter()
            .filter_map(|s| match self.transitions.get(s) {
                Some(Transition::Conditional { revisit_budget, .. }) => Some(*revisit_budget),
                _ => None,
            })
            .sum();
        let step_limit = reachable.len() + revisits;
        debug!(
            "Compiled graph: {} stages reachable, step limit {}",
            reachable.len(),
            step_limit
        );

        Ok(CompiledGraph {
            stages: self.stages,
            transitions: self.transitions,
            entry,
            step_limit,
        })
    }

    fn successors(&self, stage: StageId) -> Vec<StageId> {
        self.transitions
            .get(&stage)
            .map(|t| {
                t.targets()
                    .into_iter()
                    .filter_map(|target| match target {
                        Target::Stage(s) => Some(s),
                        Target::End => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn reachable(&self, entry: StageId) -> BTreeSet<StageId> {
        let mut seen = BTreeSet::from([entry]);
        let mut queue = VecDeque::from([entry]);
        while let Some(stage) = queue.pop_front() {
            for next in self.successors(stage) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Forward must-availability analysis: a field is available at a stage
    /// only if every path from the entry produces it first.
    fn check_dataflow(&self, entry: StageId, reachable: &BTreeSet<StageId>) -> Result<(), PipelineError> {
        let all: BTreeSet<Field> = Field::ALL.into_iter().collect();
        let initial: BTreeSet<Field> = Field::INITIAL.into_iter().collect();

        let mut available_in: BTreeMap<StageId, BTreeSet<Field>> = reachable
            .iter()
            .map(|s| (*s, if *s == entry { initial.clone() } else { all.clone() }))
            .collect();

        let mut predecessors: BTreeMap<StageId, Vec<StageId>> = BTreeMap::new();
        for stage in reachable {
            for next in self.successors(*stage) {
                predecessors.entry(next).or_default().push(*stage);
            }
        }

        let available_out = |stage: StageId, input: &BTreeSet<Field>| -> BTreeSet<Field> {
            let mut out = input.clone();
            out.extend(self.stages[&stage].produces().iter().copied());
            out
        };

        let mut changed = true;
        while changed {
            changed = false;
            for stage in reachable {
                let mut incoming = if *stage == entry { initial.clone() } else { all.clone() };
                for pred in predecessors.get(stage).into_iter().flatten() {
                    let out = available_out(*pred, &available_in[pred]);
                    incoming = incoming.intersection(&out).copied().collect();
                }
                if available_in[stage] != incoming {
                    available_in.insert(*stage, incoming);
                    changed = true;
                }
            }
        }

        for stage in reachable {
            for field in self.stages[stage].requires() {
                if !available_in[stage].contains(field) {
                    return Err(PipelineError::InvalidGraph(format!(
                        "stage {} requires `{}`, which is not produced on every path reaching it",
                        stage, field
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A validated, executable graph.
pub struct CompiledGraph {
    stages: BTreeMap<StageId, Arc<dyn Stage>>,
    transitions: BTreeMap<StageId, Transition>,
    entry: StageId,
    step_limit: usize,
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

/// Final state and trace of a completed run.
#[derive(Debug)]
pub struct GraphRun {
    pub state: PipelineState,
    pub trace: Vec<TraceEntry>,
}

impl CompiledGraph {
    pub fn step_limit(&self) -> usize {
        self.step_limit
    }

    pub fn entry(&self) -> StageId {
        self.entry
    }

    /// Execute from the entry stage until a transition reaches `END`.
    pub async fn run(
        &self,
        mut state: PipelineState,
        ctx: &StageContext,
        observer: &dyn RunObserver,
    ) -> Result<GraphRun, PipelineError> {
        let mut trace: Vec<TraceEntry> = Vec::new();
        let mut current = Target::Stage(self.entry);

        while let Target::Stage(id) = current {
            if ctx.cancel.is_cancelled() {
                info!("Run cancelled before stage {}", id);
                return Err(PipelineError::Cancelled);
            }
            if trace.len() >= self.step_limit {
                return Err(PipelineError::StepLimit(self.step_limit));
            }

            let stage = self.stages.get(&id).ok_or_else(|| {
                PipelineError::InvalidGraph(format!("traversal reached unknown stage {}", id))
            })?;
            for field in stage.requires() {
                if !state.has(*field) {
                    return Err(PipelineError::MissingField { stage: id, field: *field });
                }
            }

            let step = trace.len() + 1;
            observer.stage_started(id, step);
            info!("Step {}: running stage {}", step, id);
            let started = Instant::now();

            let patch = stage.run(&state, ctx).await?;
            if let Some(field) = patch
                .written_fields()
                .into_iter()
                .find(|f| !stage.produces().contains(f))
            {
                return Err(PipelineError::ContractViolation { stage: id, field });
            }

            let warnings = patch.warnings.len();
            state.apply(patch);

            let transition = self.transitions.get(&id).ok_or_else(|| {
                PipelineError::InvalidGraph(format!("stage {} has no outgoing transition", id))
            })?;
            let next = match transition {
                Transition::Fixed(target) => *target,
                Transition::Conditional { router, .. } => {
                    let target = router(&state, ctx.policy());
                    debug!("Router after {} chose {}", id, target);
                    target
                }
            };

            let entry = TraceEntry {
                step,
                stage: id,
                duration_ms: started.elapsed().as_millis() as u64,
                warnings,
                next,
            };
            info!(
                "Stage {} finished in {}ms ({} warnings)",
                id, entry.duration_ms, warnings
            );
            observer.stage_finished(&entry);
            trace.push(entry);
            current = next;
        }

        Ok(GraphRun { state, trace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::StatePatch;
    use crate::pipeline::stage::PipelineSettings;
    use crate::testing::{context_with, sample_request_state, ScriptedAnalysis};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A stage with a configurable contract that writes summaries when it
    /// declares them.
    struct FakeStage {
        id: StageId,
        requires: &'static [Field],
        produces: &'static [Field],
        writes_summaries: bool,
    }

    impl FakeStage {
        fn new(id: StageId, requires: &'static [Field], produces: &'static [Field]) -> Self {
            Self {
                id,
                requires,
                produces,
                writes_summaries: produces.contains(&Field::Summaries),
            }
        }
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn id(&self) -> StageId {
            self.id
        }
        fn requires(&self) -> &'static [Field] {
            self.requires
        }
        fn produces(&self) -> &'static [Field] {
            self.produces
        }
        async fn run(&self, _state: &PipelineState, _ctx: &StageContext) -> Result<StatePatch, PipelineError> {
            Ok(StatePatch {
                summaries: self.writes_summaries.then(Default::default),
                ..StatePatch::default()
            })
        }
    }

    fn ctx() -> StageContext {
        context_with(
            Arc::new(ScriptedAnalysis::new(|_| unreachable!())),
            PipelineSettings::default(),
        )
    }

    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<StageId>>,
    }

    impl RunObserver for Recorder {
        fn stage_started(&self, stage: StageId, _step: usize) {
            self.started.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn test_compile_requires_entry() {
        let err = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .compile()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidGraph(_)));
    }

    #[test]
    fn test_compile_rejects_unregistered_target() {
        let err = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::Stage(StageId::Summarize))
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("unregistered stage summarize"));
    }

    #[test]
    fn test_compile_rejects_dead_end() {
        let err = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(FakeStage::new(StageId::Summarize, &[], &[]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::Stage(StageId::Summarize))
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("summarize has no outgoing transition"));
    }

    #[test]
    fn test_compile_rejects_unproduced_requirement() {
        let err = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(FakeStage::new(StageId::Investigate, &[Field::Summaries], &[]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::Stage(StageId::Investigate))
            .edge(StageId::Investigate, Target::End)
            .compile()
            .unwrap_err();
        assert!(err.to_string().contains("requires `summaries`"));
    }

    #[test]
    fn test_dataflow_requires_every_path() {
        fn branch(_: &PipelineState, _: &crate::pipeline::correction::CorrectionPolicy) -> Target {
            Target::Stage(StageId::Investigate)
        }
        // Init may skip Summarize on its way to Investigate.
        let err = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(FakeStage::new(StageId::Summarize, &[], &[Field::Summaries]))
            .add_stage(FakeStage::new(StageId::Investigate, &[Field::Summaries], &[]))
            .entry(StageId::Init)
            .conditional(
                StageId::Init,
                branch,
                &[Target::Stage(StageId::Summarize), Target::Stage(StageId::Investigate)],
                0,
            )
            .edge(StageId::Summarize, Target::Stage(StageId::Investigate))
            .edge(StageId::Investigate, Target::End)
            .compile()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidGraph(_)));
    }

    #[test]
    fn test_unreachable_stage_is_allowed() {
        let graph = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(FakeStage::new(StageId::Media, &[Field::Metadata], &[Field::Media]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::End)
            .compile()
            .unwrap();
        assert_eq!(graph.step_limit(), 1);
    }

    #[tokio::test]
    async fn test_run_rejects_undeclared_write() {
        let mut liar = FakeStage::new(StageId::Summarize, &[], &[]);
        liar.writes_summaries = true;
        let graph = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(liar)
            .entry(StageId::Init)
            .edge(StageId::Init, Target::Stage(StageId::Summarize))
            .edge(StageId::Summarize, Target::End)
            .compile()
            .unwrap();

        let err = graph
            .run(sample_request_state(), &ctx(), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ContractViolation {
                stage: StageId::Summarize,
                field: Field::Summaries
            }
        ));
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_loops() {
        fn forever(_: &PipelineState, _: &crate::pipeline::correction::CorrectionPolicy) -> Target {
            Target::Stage(StageId::Align)
        }
        let graph = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Align, &[], &[]))
            .entry(StageId::Align)
            .conditional(StageId::Align, forever, &[Target::Stage(StageId::Align), Target::End], 3)
            .compile()
            .unwrap();
        assert_eq!(graph.step_limit(), 4);

        let err = graph
            .run(sample_request_state(), &ctx(), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StepLimit(4)));
    }

    #[tokio::test]
    async fn test_run_reports_progress_and_trace() {
        let graph = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .add_stage(FakeStage::new(StageId::Summarize, &[], &[Field::Summaries]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::Stage(StageId::Summarize))
            .edge(StageId::Summarize, Target::End)
            .compile()
            .unwrap();

        let recorder = Recorder::default();
        let run = graph.run(sample_request_state(), &ctx(), &recorder).await.unwrap();

        assert_eq!(*recorder.started.lock().unwrap(), vec![StageId::Init, StageId::Summarize]);
        assert_eq!(run.trace.len(), 2);
        assert_eq!(run.trace[1].next, Target::End);
        assert!(run.state.summaries.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_at_stage_boundary() {
        let graph = GraphBuilder::new()
            .add_stage(FakeStage::new(StageId::Init, &[], &[]))
            .entry(StageId::Init)
            .edge(StageId::Init, Target::End)
            .compile()
            .unwrap();
        let ctx = ctx();
        ctx.cancel.cancel();

        let err = graph
            .run(sample_request_state(), &ctx, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
