//! The concrete stages of the bill analysis graph.

mod align;
mod history;
mod init;
mod investigate;
mod media;
mod summarize;

pub use align::AlignStage;
pub use history::HistoryStage;
pub use init::InitStage;
pub use investigate::InvestigateStage;
pub use media::MediaStage;
pub use summarize::SummarizeStage;

use super::fanout::ChunkResults;
use super::state::StageWarning;
use super::StageId;
use crate::models::Records;

/// Concatenate per-chunk records in chunk order, recording a warning per
/// failed chunk and tallying calls and failures.
fn collect_records<T>(
    results: ChunkResults<Records<T>>,
    stage: StageId,
    what: &str,
    warnings: &mut Vec<StageWarning>,
    calls: &mut usize,
    failures: &mut usize,
) -> Vec<T> {
    *calls += results.len();
    *failures += results.failures.len();
    warnings.extend(results.warnings(stage, what));
    results.values().flat_map(|r| r.records).collect()
}
