//! Scripted collaborators and sample data for tests.

use crate::analysis::{AnalysisOutput, AnalysisTask, ResponseSchema, TaskInput, TaskSpec};
use crate::errors::{AnalysisError, DataSourceError};
use crate::models::{Amendment, Article, BillId, BillMetadata, Sponsor, Summaries};
use crate::pipeline::correction::LexicalGate;
use crate::pipeline::stage::{PipelineSettings, StageContext};
use crate::pipeline::state::PipelineState;
use crate::sources::{BillRecord, BillSource, NoSearch, SearchSource};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Responder = Box<dyn Fn(&TaskInput) -> Result<AnalysisOutput, AnalysisError> + Send + Sync>;
type Delay = Box<dyn Fn(&TaskInput) -> Duration + Send + Sync>;
type Predicate = Box<dyn Fn(&TaskInput) -> bool + Send + Sync>;

fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

fn one_record(schema: ResponseSchema, input: &TaskInput) -> Value {
    let title = first_words(&input.input, 3);
    match schema {
        ResponseSchema::ChangeRecords => json!({ "records": [{
            "title": title,
            "explanation": "Changes the grant amount",
            "concern": "Less oversight",
            "severity": "low",
        }]}),
        ResponseSchema::PorkRecords | ResponseSchema::TrojanHorseRecords => json!({ "records": [{
            "title": title,
            "explanation": "Directs funds to one recipient",
            "concern": "No competitive process",
            "severity": "medium",
            "why": "Names a single provider",
        }]}),
        ResponseSchema::BeneficiaryRecords => json!({ "records": [{
            "name": "Rural providers",
            "benefit": "Grant eligibility",
            "severity": "low",
        }]}),
        ResponseSchema::AlignmentRecords => json!({ "records": [{
            "benefit_or_harm": if input.task == TaskSpec::AlignmentDrawbacks { "harm" } else { "benefit" },
            "effect_type": "community",
            "summary": "Faster internet in town",
            "explanation": "Section 2 grants",
            "severity": "medium",
        }]}),
        ResponseSchema::BillCost => json!({
            "cost_explanation": "$50 million in grants",
            "alternatives": [{ "alternative": "Tax credits", "explanation": "Cheaper to administer" }],
        }),
        ResponseSchema::ImpactScores => json!({
            "personal": 40,
            "family": 50,
            "community": 75,
            "overall": 60,
            "rationale": "Mostly community benefit",
        }),
    }
}

/// The response a well-behaved backend would give: "{task} output" for text
/// tasks, one valid record for structured tasks, and no issues from claim
/// validation.
pub fn default_response(input: &TaskInput) -> Result<AnalysisOutput, AnalysisError> {
    if let Some(schema) = input.schema {
        return Ok(AnalysisOutput::Structured(one_record(schema, input)));
    }
    match input.task {
        TaskSpec::ValidateClaims => Ok(AnalysisOutput::Text(String::new())),
        task => Ok(AnalysisOutput::Text(format!("{} output", task))),
    }
}

/// An [`AnalysisTask`] driven by a closure that records every input.
pub struct ScriptedAnalysis {
    respond: Responder,
    delay: Option<Delay>,
    fail: Option<Predicate>,
    calls: Mutex<Vec<TaskInput>>,
}

impl Default for ScriptedAnalysis {
    fn default() -> Self {
        Self::new(default_response)
    }
}

impl ScriptedAnalysis {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&TaskInput) -> Result<AnalysisOutput, AnalysisError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            delay: None,
            fail: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&TaskInput) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    /// Answer matching inputs with an invalid response.
    pub fn fail_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TaskInput) -> bool + Send + Sync + 'static,
    {
        self.fail = Some(Box::new(predicate));
        self
    }

    /// Every input received so far, in arrival order.
    pub fn calls(&self) -> Vec<TaskInput> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisTask for ScriptedAnalysis {
    async fn invoke(&self, input: TaskInput) -> Result<AnalysisOutput, AnalysisError> {
        self.calls.lock().unwrap().push(input.clone());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(&input)).await;
        }
        if self.fail.as_ref().is_some_and(|fail| fail(&input)) {
            return Err(AnalysisError::InvalidResponse(format!("scripted failure for {}", input.task)));
        }
        (self.respond)(&input)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// A [`BillSource`] with a fixed answer.
pub struct StaticBills {
    answer: Result<BillRecord, DataSourceError>,
}

impl StaticBills {
    pub fn found(record: BillRecord) -> Self {
        Self { answer: Ok(record) }
    }

    pub fn failing(error: DataSourceError) -> Self {
        Self { answer: Err(error) }
    }
}

#[async_trait]
impl BillSource for StaticBills {
    async fn fetch(&self, _bill: &BillId) -> Result<BillRecord, DataSourceError> {
        self.answer.clone()
    }
}

/// A [`SearchSource`] returning the same articles for every query.
pub struct StaticSearch {
    articles: Vec<Article>,
}

impl StaticSearch {
    pub fn with_articles(n: usize) -> Self {
        let articles = (1..=n)
            .map(|i| Article {
                title: format!("Story {}", i),
                url: format!("https://news.example/{}", i),
                source: Some("Example News".to_string()),
                content: "Coverage of the Rural Broadband Act".to_string(),
            })
            .collect();
        Self { articles }
    }
}

#[async_trait]
impl SearchSource for StaticSearch {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str) -> Vec<Article> {
        self.articles.clone()
    }
}

pub fn sample_bill() -> BillRecord {
    BillRecord {
        metadata: BillMetadata {
            title: "Rural Broadband Act".to_string(),
            congress: 119,
            number: "1".to_string(),
            bill_type: "HR".to_string(),
            origin_chamber: Some("House".to_string()),
            introduced_date: Some("2025-01-03".to_string()),
            latest_action: Some("Referred to committee".to_string()),
        },
        full_text: "SEC. 1. Short title.\nThis Act may be cited as the Rural Broadband Act.\n\n\
                    SEC. 2. Grants.\nThe Secretary shall award $50,000,000 in grants to rural providers.\n\n\
                    SEC. 3. Reporting.\nEach grantee shall report annually to Congress."
            .to_string(),
        sponsors: vec![Sponsor {
            full_name: "Rep. Jane Doe [D-OH-3]".to_string(),
            party: Some("D".to_string()),
            state: Some("OH".to_string()),
            district: Some(3),
            bioguide_id: Some("D000001".to_string()),
        }],
        amendments: vec![Amendment {
            number: "12".to_string(),
            amendment_type: Some("HAMDT".to_string()),
            description: Some("Raises the grant cap".to_string()),
            purpose: None,
            latest_action: None,
        }],
        status: "Referred to committee".to_string(),
    }
}

/// State as submitted, before any stage has run.
pub fn sample_request_state() -> PipelineState {
    PipelineState::new("Teacher in Ohio", BillId::new(119, "hr", 1).unwrap())
}

/// State after fetching and summarizing the sample bill.
pub fn sample_state() -> PipelineState {
    let record = sample_bill();
    let mut state = sample_request_state();
    state.bill_text = Some(record.full_text);
    state.metadata = Some(record.metadata);
    state.sponsors = Some(record.sponsors);
    state.amendments = Some(record.amendments);
    state.status = Some(record.status);
    state.summaries = Some(Summaries {
        one_line: "H.R. 1 funds rural broadband.".to_string(),
        detailed: "Awards $50 million in grants to rural internet providers.".to_string(),
        section_outline: "- Sec. 1 title\n- Sec. 2 grants\n- Sec. 3 reporting".to_string(),
        sponsor_profiles: BTreeMap::from([(
            "Rep. Jane Doe [D-OH-3]".to_string(),
            "Serves on the Energy and Commerce Committee".to_string(),
        )]),
    });
    state
}

pub fn context_with(analysis: Arc<dyn AnalysisTask>, settings: PipelineSettings) -> StageContext {
    context_with_sources(analysis, Arc::new(StaticBills::found(sample_bill())), settings)
}

pub fn context_with_sources(
    analysis: Arc<dyn AnalysisTask>,
    bills: Arc<dyn BillSource>,
    settings: PipelineSettings,
) -> StageContext {
    StageContext {
        analysis,
        bills,
        news: Arc::new(NoSearch),
        web: Arc::new(NoSearch),
        gate: Arc::new(LexicalGate::default()),
        settings,
        cancel: CancellationToken::new(),
    }
}

pub fn context_with_search(
    analysis: Arc<dyn AnalysisTask>,
    news: Arc<dyn SearchSource>,
    settings: PipelineSettings,
) -> StageContext {
    StageContext {
        news,
        ..context_with(analysis, settings)
    }
}
