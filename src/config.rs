//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.billscope.toml` files.

use crate::analysis::OllamaConfig;
use crate::chunker::ChunkConfig;
use crate::errors::ConfigError;
use crate::pipeline::correction::CorrectionPolicy;
use crate::pipeline::stage::PipelineSettings;
use crate::sources::DEFAULT_CONGRESS_API_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".billscope.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Data source settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum in-flight analysis calls within a stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "billscope_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Default model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on transient failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    300
}

fn default_retries() -> u32 {
    2
}

/// Chunking and self-correction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub chunking_enabled: bool,

    /// Maximum words per chunk, overlap included.
    #[serde(default = "default_chunk_max_words")]
    pub chunk_max_words: usize,

    #[serde(default = "default_chunk_overlap_words")]
    pub chunk_overlap_words: usize,

    /// Re-runs allowed per correction loop.
    #[serde(default = "default_max_correction_attempts")]
    pub max_correction_attempts: u32,

    #[serde(default)]
    pub investigation_correction_enabled: bool,

    #[serde(default)]
    pub alignment_correction_enabled: bool,

    /// Leading characters of the bill used for the short summaries.
    #[serde(default = "default_summary_prefix_chars")]
    pub summary_prefix_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking_enabled: true,
            chunk_max_words: default_chunk_max_words(),
            chunk_overlap_words: default_chunk_overlap_words(),
            max_correction_attempts: default_max_correction_attempts(),
            investigation_correction_enabled: false,
            alignment_correction_enabled: false,
            summary_prefix_chars: default_summary_prefix_chars(),
        }
    }
}

fn default_chunk_max_words() -> usize {
    50_000
}

fn default_chunk_overlap_words() -> usize {
    200
}

fn default_max_correction_attempts() -> u32 {
    3
}

fn default_summary_prefix_chars() -> usize {
    10_000
}

/// Legislative data and search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_congress_api_url")]
    pub congress_api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub congress_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tavily_api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_api_key: Option<String>,

    /// Results requested from each search.
    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            congress_api_url: default_congress_api_url(),
            congress_api_key: None,
            tavily_api_key: None,
            news_api_key: None,
            search_max_results: default_search_max_results(),
        }
    }
}

fn default_congress_api_url() -> String {
    DEFAULT_CONGRESS_API_URL.to_string()
}

fn default_search_max_results() -> usize {
    5
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include media coverage analyses when present.
    #[serde(default = "default_true")]
    pub include_media: bool,

    /// Include the stage execution trace.
    #[serde(default = "default_true")]
    pub include_trace: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_media: true,
            include_trace: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must start with 'http://' or 'https://'"))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// where the CLI provides an explicit value.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.model.retries = retries;
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if args.no_chunking {
            self.pipeline.chunking_enabled = false;
        }
        if let Some(words) = args.chunk_max_words {
            self.pipeline.chunk_max_words = words;
        }
        if let Some(words) = args.chunk_overlap_words {
            self.pipeline.chunk_overlap_words = words;
        }
        if let Some(max) = args.max_correction_attempts {
            self.pipeline.max_correction_attempts = max;
        }
        if args.correct_investigation {
            self.pipeline.investigation_correction_enabled = true;
        }
        if args.correct_alignment {
            self.pipeline.alignment_correction_enabled = true;
        }

        if let Some(ref key) = args.congress_api_key {
            self.sources.congress_api_key = Some(key.clone());
        }
        if let Some(ref key) = args.tavily_api_key {
            self.sources.tavily_api_key = Some(key.clone());
        }
        if let Some(ref key) = args.news_api_key {
            self.sources.news_api_key = Some(key.clone());
        }
    }

    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("ollama_url", &self.model.ollama_url)?;
        check_url("congress_api_url", &self.sources.congress_api_url)?;
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(ConfigError::invalid("temperature", "must be between 0.0 and 1.0"));
        }
        if self.sources.search_max_results == 0 {
            return Err(ConfigError::invalid("search_max_results", "must be at least 1"));
        }
        self.pipeline_settings().validate()
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            chunking: ChunkConfig {
                enabled: self.pipeline.chunking_enabled,
                max_words: self.pipeline.chunk_max_words,
                overlap_words: self.pipeline.chunk_overlap_words,
            },
            policy: CorrectionPolicy {
                max_attempts: self.pipeline.max_correction_attempts,
                investigation_enabled: self.pipeline.investigation_correction_enabled,
                alignment_enabled: self.pipeline.alignment_correction_enabled,
            },
            concurrency: self.general.concurrency,
            call_timeout: self.ollama_config().call_budget(),
            summary_prefix_chars: self.pipeline.summary_prefix_chars,
        }
    }

    pub fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig {
            ollama_url: self.model.ollama_url.clone(),
            model_name: self.model.name.clone(),
            temperature: self.model.temperature,
            timeout_seconds: self.model.timeout_seconds,
            retries: self.model.retries,
            ..OllamaConfig::default()
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.pipeline.chunk_max_words, 50_000);
        assert_eq!(config.pipeline.max_correction_attempts, 3);
        assert!(!config.pipeline.alignment_correction_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "hr3852.md"
concurrency = 8

[model]
name = "qwen2.5:14b"
temperature = 0.2

[pipeline]
chunk_max_words = 2000
chunk_overlap_words = 100
max_correction_attempts = 2
alignment_correction_enabled = true
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "hr3852.md");
        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.model.ollama_url, "http://localhost:11434");

        let settings = config.pipeline_settings();
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.chunking.max_words, 2000);
        assert_eq!(settings.policy.max_attempts, 2);
        assert!(settings.policy.alignment_enabled);
        assert!(!settings.policy.investigation_enabled);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.pipeline.max_correction_attempts = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::invalid("max_correction_attempts", "must be at least 1")
        );

        let mut config = Config::default();
        config.pipeline.chunk_overlap_words = config.pipeline.chunk_max_words;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.ollama_url = "localhost:11434".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "ollama_url", .. })
        ));

        let mut config = Config::default();
        config.general.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sources]\ncongress_api_key = \"abc\"\nsearch_max_results = 3").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sources.congress_api_key.as_deref(), Some("abc"));
        assert_eq!(config.sources.search_max_results, 3);
        assert_eq!(config.sources.congress_api_url, DEFAULT_CONGRESS_API_URL);
    }

    #[test]
    fn test_call_timeout_leaves_room_for_retries() {
        let mut config = Config::default();
        config.model.timeout_seconds = 30;
        config.model.retries = 2;
        let settings = config.pipeline_settings();
        assert!(settings.call_timeout > std::time::Duration::from_secs(90));
        assert_eq!(settings.call_timeout, config.ollama_config().call_budget());
    }

    #[tokio::test]
    async fn test_hanging_backend_is_retried_within_stage_timeout() {
        use crate::analysis::{AnalysisOutput, AnalysisTask, OllamaAnalysis, TaskInput, TaskSpec};
        use crate::pipeline::StageId;
        use crate::testing::context_with;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let mut config = Config::default();
        config.model.ollama_url = format!("http://{}", addr);
        config.model.timeout_seconds = 1;
        config.model.retries = 2;
        let analysis: Arc<dyn AnalysisTask> =
            Arc::new(OllamaAnalysis::new(config.ollama_config()).unwrap());
        let ctx = context_with(analysis, config.pipeline_settings());

        let results = ctx
            .fan_out(
                StageId::Summarize,
                vec![TaskInput::text(TaskSpec::SummarizeOneLine, "text")],
                AnalysisOutput::into_text,
            )
            .await
            .unwrap();

        assert!(results.all_failed());
        assert_eq!(connections.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[sources]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.pipeline.chunk_overlap_words, 200);
    }
}
