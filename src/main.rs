//! billscope - LLM-powered legislative bill analyzer
//!
//! A CLI tool that fetches a bill from Congress.gov and runs it through a
//! graph of Ollama-backed analysis stages, with optional self-correction
//! loops, producing a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (no findings above threshold, or no --fail-on set)
//!   1 - Runtime error (connection, config, missing bill, etc.)
//!   2 - Findings at or above the --fail-on threshold

mod analysis;
mod chunker;
mod cli;
mod config;
mod errors;
mod models;
mod pipeline;
mod progress;
mod report;
mod sources;
#[cfg(test)]
mod testing;

use analysis::{AnalysisTask, OllamaAnalysis};
use anyhow::{Context, Result};
use cli::{Args, FailOnLevel, OutputFormat};
use config::{Config, CONFIG_FILE};
use models::Severity;
use pipeline::followup;
use pipeline::graph::RunObserver;
use pipeline::{BillRequest, Pipeline, RunStatus};
use progress::StageSpinner;
use report::Report;
use sources::{BillSource, CongressGovClient, NewsApiSearch, SearchSource, TavilySearch};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("billscope v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .billscope.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the model, chunking, correction loops, and API keys.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete bill analysis. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let request = BillRequest {
        user_profile: args.user_profile()?,
        congress: args.congress.unwrap_or_default(),
        bill_type: args.bill_type.clone().unwrap_or_default(),
        bill_number: args.bill_number.unwrap_or_default(),
    };
    let settings = config.pipeline_settings();
    let timeout = Duration::from_secs(config.model.timeout_seconds);
    let call_budget = settings.call_timeout;

    println!("🤖 Initializing analysis backend...");
    println!("   Model: {}", config.model.name);
    println!("   Ollama: {}", config.model.ollama_url);
    println!("   Timeout: {}s", config.model.timeout_seconds);
    println!(
        "   Self-correction: investigation {}, alignment {} (max {} attempts)",
        on_off(settings.policy.investigation_enabled),
        on_off(settings.policy.alignment_enabled),
        settings.policy.max_attempts
    );

    let analysis: Arc<dyn AnalysisTask> = Arc::new(OllamaAnalysis::new(config.ollama_config())?);
    let bills: Arc<dyn BillSource> = Arc::new(CongressGovClient::new(
        config.sources.congress_api_url.clone(),
        config.sources.congress_api_key.clone(),
        timeout,
    )?);
    if config.sources.congress_api_key.is_none() {
        warn!("No Congress.gov API key configured; requests may be rejected");
    }
    let news: Arc<dyn SearchSource> = Arc::new(NewsApiSearch::new(
        config.sources.news_api_key.clone(),
        config.sources.search_max_results,
        timeout,
    ));
    let web: Arc<dyn SearchSource> = Arc::new(TavilySearch::new(
        config.sources.tavily_api_key.clone(),
        config.sources.search_max_results,
        timeout,
    ));

    let spinner = Arc::new(StageSpinner::new(!args.quiet));
    let pipeline = Pipeline::new(Arc::clone(&analysis), bills, settings)
        .with_search(news, web)
        .with_observer(Arc::clone(&spinner) as Arc<dyn RunObserver>);

    // Ctrl-C cancels the run between stages
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the run");
            ctrl_c.cancel();
        }
    });

    println!(
        "\n🔬 Analyzing {} {} (Congress {})...\n",
        request.bill_type.to_uppercase(),
        request.bill_number,
        request.congress
    );
    let result = pipeline.run(request.clone(), cancel).await;
    spinner.finish();
    let result = result?;

    let mut report = Report::new(result, analysis.model_name());

    // Optional follow-up analyses
    if args.letter || args.score {
        let context = followup::bill_context(&report.result);
        if args.letter {
            println!("✉️  Drafting letter to your representative...");
            match followup::write_letter(analysis.as_ref(), &request.user_profile, &context, call_budget).await {
                Ok(letter) => report.letter = Some(letter),
                Err(e) => warn!("Letter drafting failed: {}", e),
            }
        }
        if args.score {
            println!("📏 Scoring impact...");
            match followup::score_impact(analysis.as_ref(), &request.user_profile, &context, call_budget).await {
                Ok(impact) => report.impact = Some(impact),
                Err(e) => warn!("Impact scoring failed: {}", e),
            }
        }
    }

    // Generate and save the report
    println!("\n📝 Generating report...");
    let output_path = PathBuf::from(&config.general.output);
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };

    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    print_summary(&report);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        if report.has_findings_at_or_above(fail_on_to_severity(fail_level)) {
            eprintln!(
                "\n⛔ Findings at or above {:?} severity. Failing (exit code 2).",
                fail_level
            );
            return Ok(2);
        }
    }

    Ok(0)
}

fn print_summary(report: &Report) {
    let metadata = &report.metadata;
    let findings = &metadata.findings;

    println!("\n📊 Analysis Summary:");
    println!("   Bill: {} {}", metadata.bill, metadata.title);
    println!("   Stage executions: {}", metadata.stage_executions);
    println!("   Total findings: {}", findings.total);
    println!(
        "   - 🔴 High: {} | 🟡 Medium: {} | 🟢 Low: {}",
        findings.high, findings.medium, findings.low
    );
    if let Some((headline, severity)) = report.worst_investigation_finding() {
        println!("   Top concern: {} {}", severity.emoji(), headline);
    }
    if report.metadata.status == RunStatus::Partial {
        println!(
            "   ⚠️  {} analyses were degraded; see the report for details",
            report.result.warnings.len()
        );
    }
    println!("   Duration: {:.1}s", metadata.duration_seconds);
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Convert FailOnLevel to Severity for comparison.
fn fail_on_to_severity(level: FailOnLevel) -> Severity {
    match level {
        FailOnLevel::Low => Severity::Low,
        FailOnLevel::Medium => Severity::Medium,
        FailOnLevel::High => Severity::High,
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
