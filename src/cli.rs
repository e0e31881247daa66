//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// billscope - LLM-powered legislative bill analyzer
///
/// Fetch a bill from Congress.gov, summarize it, look for pork-barrel
/// spending and hidden provisions, and explain what it means for you.
/// Markdown/JSON reports. Built in Rust.
///
/// Examples:
///   billscope --congress 119 --bill-type hr --bill-number 3852 --profile "Teacher in Ohio"
///   billscope --congress 119 --bill-type s --bill-number 12 --profile-file me.txt --format json
///   billscope --congress 119 --bill-type hr --bill-number 1 --profile "..." --correct-alignment --letter
///   billscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Congress number (e.g., 119)
    #[arg(long, value_name = "NUM", required_unless_present = "init_config")]
    pub congress: Option<u32>,

    /// Bill type: hr, s, hjres, sjres, hconres, sconres, hres, sres
    #[arg(long, value_name = "TYPE", required_unless_present = "init_config")]
    pub bill_type: Option<String>,

    /// Bill number
    #[arg(long, value_name = "NUM", required_unless_present = "init_config")]
    pub bill_number: Option<u32>,

    /// Who you are: occupation, location, family, priorities
    ///
    /// Used to judge how the bill affects you.
    #[arg(short, long, value_name = "TEXT", conflicts_with = "profile_file")]
    pub profile: Option<String>,

    /// Read the user profile from a file
    #[arg(long, value_name = "FILE")]
    pub profile_file: Option<PathBuf>,

    /// Ollama model to use for analysis
    ///
    /// Can also be set via BILLSCOPE_MODEL env var or .billscope.toml config.
    #[arg(short, long, env = "BILLSCOPE_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Per-call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries on transient backend failures
    #[arg(long, value_name = "NUM")]
    pub retries: Option<u32>,

    /// Maximum concurrent analysis calls within a stage
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Send the whole bill in one call per analysis
    #[arg(long)]
    pub no_chunking: bool,

    /// Maximum words per chunk
    #[arg(long, value_name = "WORDS")]
    pub chunk_max_words: Option<usize>,

    /// Words shared between consecutive chunks
    #[arg(long, value_name = "WORDS")]
    pub chunk_overlap_words: Option<usize>,

    /// Fact-check investigative findings and re-run when they are wrong
    #[arg(long)]
    pub correct_investigation: bool,

    /// Fact-check alignment findings and re-run when they are wrong
    #[arg(long)]
    pub correct_alignment: bool,

    /// Re-runs allowed per correction loop
    #[arg(long, value_name = "NUM")]
    pub max_correction_attempts: Option<u32>,

    /// Congress.gov API key
    #[arg(long, env = "CONGRESS_API_KEY", hide_env_values = true)]
    pub congress_api_key: Option<String>,

    /// Tavily web search API key
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub tavily_api_key: Option<String>,

    /// NewsAPI key
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .billscope.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fail if findings at or above this severity are found
    ///
    /// Exit code 2 when threshold is exceeded. Values: high, medium, low
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Draft a letter to your representative about the bill
    #[arg(long)]
    pub letter: bool,

    /// Score the bill's impact on you, your family and your community
    #[arg(long)]
    pub score: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .billscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.congress.is_none() || self.bill_type.is_none() || self.bill_number.is_none() {
            return Err("--congress, --bill-type and --bill-number are required".to_string());
        }

        match (&self.profile, &self.profile_file) {
            (None, None) => return Err("Provide a user profile with --profile or --profile-file".to_string()),
            (Some(profile), _) if profile.trim().is_empty() => {
                return Err("User profile must not be empty".to_string())
            }
            (_, Some(path)) if !path.is_file() => {
                return Err(format!("Profile file does not exist: {}", path.display()))
            }
            _ => {}
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.max_correction_attempts == Some(0) {
            return Err("Max correction attempts must be at least 1".to_string());
        }

        if let (Some(max), Some(overlap)) = (self.chunk_max_words, self.chunk_overlap_words) {
            if overlap >= max {
                return Err("Chunk overlap must be smaller than the chunk size".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// The user profile text, read from --profile-file when given.
    pub fn user_profile(&self) -> Result<String> {
        if let Some(ref path) = self.profile_file {
            let profile = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
            return Ok(profile.trim().to_string());
        }
        Ok(self.profile.clone().unwrap_or_default())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_args() -> Args {
        Args::parse_from([
            "billscope",
            "--congress",
            "119",
            "--bill-type",
            "hr",
            "--bill-number",
            "3852",
            "--profile",
            "Teacher in Ohio",
        ])
    }

    #[test]
    fn test_minimal_args_are_valid() {
        let args = make_args();
        assert!(args.validate().is_ok());
        assert_eq!(args.format, OutputFormat::Markdown);
        assert_eq!(args.user_profile().unwrap(), "Teacher in Ohio");
    }

    #[test]
    fn test_init_config_needs_no_bill() {
        let args = Args::parse_from(["billscope", "--init-config"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_requires_profile() {
        let mut args = make_args();
        args.profile = None;
        assert!(args.validate().unwrap_err().contains("--profile"));
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_chunk_window() {
        let mut args = make_args();
        args.chunk_max_words = Some(100);
        args.chunk_overlap_words = Some(100);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_profile_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  Farmer in Iowa with two kids  ").unwrap();

        let mut args = make_args();
        args.profile = None;
        args.profile_file = Some(file.path().to_path_buf());
        assert!(args.validate().is_ok());
        assert_eq!(args.user_profile().unwrap(), "Farmer in Iowa with two kids");
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
