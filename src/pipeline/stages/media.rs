use crate::analysis::{AnalysisOutput, TaskInput, TaskSpec};
use crate::errors::PipelineError;
use crate::models::{Article, MediaAnalysis};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use tracing::{debug, info};

/// Articles passed to each media analysis.
const MAX_ARTICLES: usize = 5;

/// Media coverage, expert opinion and watchdog analysis.
///
/// Registered in the standard graph but not wired to any edge.
pub struct MediaStage;

struct MediaSearch {
    source: String,
    task: TaskSpec,
    label: &'static str,
    articles: Vec<Article>,
}

#[async_trait]
impl Stage for MediaStage {
    fn id(&self) -> StageId {
        StageId::Media
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Metadata]
    }

    fn produces(&self) -> &'static [Field] {
        &[Field::Media]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.id();
        let title = &state.metadata(stage)?.title;
        let subject = if title.trim().is_empty() {
            state.bill.to_string()
        } else {
            title.clone()
        };

        let expert_query = format!("{} expert analysis think tank policy research", subject);
        let watchdog_query = format!("{} GAO CBO inspector general oversight report", subject);
        let (news, web, expert, watchdog) = tokio::join!(
            ctx.news.search(&subject),
            ctx.web.search(&subject),
            ctx.web.search(&expert_query),
            ctx.web.search(&watchdog_query),
        );

        let searches: Vec<MediaSearch> = [
            (ctx.news.name(), TaskSpec::MediaNews, "Articles", news),
            (ctx.web.name(), TaskSpec::MediaSearch, "Search results", web),
            (ctx.web.name(), TaskSpec::MediaExpert, "Expert analyses", expert),
            (ctx.web.name(), TaskSpec::MediaWatchdog, "Watchdog reports", watchdog),
        ]
        .into_iter()
        .filter_map(|(source, task, label, mut articles)| {
            if articles.is_empty() {
                debug!("[{}] no results for {}, skipping", stage, task);
                return None;
            }
            articles.truncate(MAX_ARTICLES);
            Some(MediaSearch {
                source: format!("{} ({})", source, task),
                task,
                label,
                articles,
            })
        })
        .collect();

        let inputs = searches
            .iter()
            .map(|s| {
                TaskInput::text(
                    s.task,
                    format!("{}: {}", s.label, serde_json::to_string(&s.articles).unwrap_or_default()),
                )
            })
            .collect();
        let results = ctx.fan_out(stage, inputs, AnalysisOutput::into_text).await?;
        if results.all_failed() {
            return Err(PipelineError::StageFailed {
                stage,
                reason: "every media analysis failed".to_string(),
            });
        }
        let warnings = results.warnings(stage, "media");

        let mut searches: Vec<Option<MediaSearch>> = searches.into_iter().map(Some).collect();
        let media: Vec<MediaAnalysis> = results
            .outputs
            .into_iter()
            .filter_map(|(index, analysis)| {
                searches[index].take().map(|s| MediaAnalysis {
                    source: s.source,
                    articles: s.articles,
                    analysis,
                })
            })
            .collect();

        info!("Produced {} media analyses", media.len());

        Ok(StatePatch {
            media: Some(media),
            ..StatePatch::default()
        }
        .with_warnings(warnings))
    }
}
