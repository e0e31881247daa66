use crate::errors::PipelineError;
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use tracing::{info, warn};

/// Fetches the bill's metadata, text, sponsors and amendments.
pub struct InitStage;

#[async_trait]
impl Stage for InitStage {
    fn id(&self) -> StageId {
        StageId::Init
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Bill]
    }

    fn produces(&self) -> &'static [Field] {
        &[
            Field::BillText,
            Field::Metadata,
            Field::Sponsors,
            Field::Amendments,
            Field::Status,
        ]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let record = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = ctx.bills.fetch(&state.bill) => result.map_err(|source| PipelineError::DataSource {
                stage: StageId::Init,
                source,
            })?,
        };

        if record.full_text.trim().is_empty() {
            warn!("Bill {} has no text; later stages will see an empty document", state.bill);
        }
        info!("Loaded \"{}\" ({})", record.metadata.title, record.status);

        Ok(StatePatch {
            bill: Some(record),
            ..StatePatch::default()
        })
    }
}
