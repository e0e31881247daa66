//! Routing decisions after the correction stages.

use super::correction::{CorrectionLoop, CorrectionPolicy};
use super::state::PipelineState;
use super::StageId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where control goes after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Stage(StageId),
    End,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Stage(stage) => write!(f, "{}", stage),
            Target::End => write!(f, "END"),
        }
    }
}

/// A pure routing function over a state snapshot.
pub type Router = fn(&PipelineState, &CorrectionPolicy) -> Target;

/// Revise iff the loop is enabled, the last pass asked for a revision, and
/// the attempt budget is not exhausted.
///
/// `attempts` counts correction passes including the one just finished, so
/// `attempts <= max_attempts` allows exactly `max_attempts` re-runs.
fn should_loop(kind: CorrectionLoop, state: &PipelineState, policy: &CorrectionPolicy) -> bool {
    let tracking = kind.tracking(state);
    policy.enabled(kind) && tracking.should_revise && tracking.attempts <= policy.max_attempts
}

pub fn route_investigation(state: &PipelineState, policy: &CorrectionPolicy) -> Target {
    if should_loop(CorrectionLoop::Investigation, state, policy) {
        Target::Stage(StageId::Investigate)
    } else {
        Target::Stage(StageId::Align)
    }
}

pub fn route_alignment(state: &PipelineState, policy: &CorrectionPolicy) -> Target {
    if should_loop(CorrectionLoop::Alignment, state, policy) {
        Target::Stage(StageId::Align)
    } else {
        Target::End
    }
}
