use crate::analysis::{AnalysisOutput, TaskInput, TaskSpec};
use crate::chunker::leading_chars;
use crate::errors::PipelineError;
use crate::models::{Sponsor, Summaries};
use crate::pipeline::stage::{Stage, StageContext};
use crate::pipeline::state::{Field, PipelineState, StageWarning, StatePatch};
use crate::pipeline::StageId;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeMap;
use tracing::info;

/// Multi-level summaries and sponsor profiles.
pub struct SummarizeStage;

fn sponsor_query(sponsor: &Sponsor) -> String {
    let mut query = sponsor.full_name.clone();
    if let Some(state) = &sponsor.state {
        query.push_str(&format!(" {}", state));
    }
    query.push_str(" member of Congress committees voting record sponsored bills");
    query
}

#[async_trait]
impl Stage for SummarizeStage {
    fn id(&self) -> StageId {
        StageId::Summarize
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::BillText, Field::Sponsors]
    }

    fn produces(&self) -> &'static [Field] {
        &[Field::Summaries]
    }

    async fn run(&self, state: &PipelineState, ctx: &StageContext) -> Result<StatePatch, PipelineError> {
        let stage = self.id();
        let text = state.bill_text(stage)?;
        let sponsors = state.sponsors(stage)?;
        let prefix = leading_chars(text, ctx.settings.summary_prefix_chars);
        let mut warnings = Vec::new();

        let short_inputs = [TaskSpec::SummarizeOneLine, TaskSpec::SummarizeDetailed]
            .into_iter()
            .map(|task| TaskInput::text(task, format!("Bill text: {}", prefix)))
            .collect();
        let short = ctx.fan_out(stage, short_inputs, AnalysisOutput::into_text).await?;
        warnings.extend(short.warnings(stage, "summary"));
        let mut levels = [String::new(), String::new()];
        let short_failed = short.all_failed();
        for (index, summary) in short.outputs {
            levels[index] = summary;
        }
        let [one_line, detailed] = levels;

        let chunks = ctx.chunks(text);
        let section_inputs = chunks
            .iter()
            .map(|chunk| TaskInput::text(TaskSpec::SummarizeSections, format!("Bill text section: {}", chunk.text)))
            .collect();
        let sections = ctx.fan_out(stage, section_inputs, AnalysisOutput::into_text).await?;
        warnings.extend(sections.warnings(stage, "section outline"));
        let sections_failed = sections.all_failed();
        let section_outline = sections.values().collect::<Vec<_>>().join("\n\n");

        let searches = join_all(sponsors.iter().map(|s| async move {
            let query = sponsor_query(s);
            ctx.web.search(&query).await
        }))
        .await;
        let profile_inputs = sponsors
            .iter()
            .zip(searches)
            .map(|(sponsor, results)| {
                TaskInput::text(
                    TaskSpec::SponsorProfile,
                    format!(
                        "Representative info: {}\n\nSearch results: {}",
                        serde_json::to_string(sponsor).unwrap_or_default(),
                        serde_json::to_string(&results).unwrap_or_default()
                    ),
                )
            })
            .collect();
        let profiles = ctx.fan_out(stage, profile_inputs, AnalysisOutput::into_text).await?;
        for (index, e) in &profiles.failures {
            warnings.push(StageWarning::new(
                stage,
                format!("profile of {} failed: {}", sponsors[*index].full_name, e),
            ));
        }
        let profiles_failed = profiles.all_failed();
        let sponsor_profiles: BTreeMap<String, String> = profiles
            .outputs
            .into_iter()
            .map(|(index, profile)| (sponsors[index].full_name.clone(), profile))
            .collect();

        if short_failed && sections_failed && (sponsors.is_empty() || profiles_failed) {
            return Err(PipelineError::StageFailed {
                stage,
                reason: "every summary call failed".to_string(),
            });
        }

        info!(
            "Summarized bill: {} section outlines, {} sponsor profiles",
            chunks.len(),
            sponsor_profiles.len()
        );

        Ok(StatePatch {
            summaries: Some(Summaries {
                one_line,
                detailed,
                section_outline,
                sponsor_profiles,
            }),
            ..StatePatch::default()
        }
        .with_warnings(warnings))
    }
}
