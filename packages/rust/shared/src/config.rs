//! Application configuration for litscreen.
//!
//! User config lives at `~/.litscreen/litscreen.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LitScreenError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "litscreen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".litscreen";

/// Screening prompt shipped with the default config.
pub const DEFAULT_SCREENING_PROMPT: &str = r#"You are a strict research assistant conducting a systematic review.
We are looking for papers on [YOUR TOPIC HERE].

INCLUSION CRITERIA (Must meet ALL):
1. Topic: Explicitly discusses [CRITERIA 1].
2. Mechanism: Discusses [CRITERIA 2].
3. Subject: Involves [CRITERIA 3].

TASK:
I will provide a list of papers.
Return a raw JSON list of objects. One object for each paper.
Format:
[
  {"ID": 123, "Included": true, "Reason": "..."},
  {"ID": 124, "Included": false, "Reason": "..."}
]"#;

/// Document analysis prompt shipped with the default config.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"Analyze this PDF research paper. The goal is to [YOUR GOAL HERE].
1. Identify the [METRIC 1]. Choose ONE from: [Category A, Category B, Category C, Other].
2. Provide a brief "Reason" (max 1 sentence).

Return the result as a valid JSON object with these keys:
- "methodology": "The chosen category",
- "reason": "The explanation""#;

// ---------------------------------------------------------------------------
// Config structs (matching litscreen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Classification service connection settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Relevance screening (batch mode).
    #[serde(default)]
    pub screening: ScreeningConfig,

    /// Document analysis (concurrent mode).
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Reject values that would make a stage silently do nothing.
    pub fn validate(&self) -> Result<()> {
        self.service.base_url()?;
        if self.screening.batch_size == 0 {
            return Err(LitScreenError::config("screening.batch_size must be at least 1"));
        }
        if self.screening.max_attempts == 0 {
            return Err(LitScreenError::config("screening.max_attempts must be at least 1"));
        }
        if self.analysis.workers == 0 {
            return Err(LitScreenError::config("analysis.workers must be at least 1"));
        }
        // Scores top out at 100 and must exceed the threshold.
        if self.analysis.match_threshold >= 100 {
            return Err(LitScreenError::config(format!(
                "analysis.match_threshold must be below 100, got {}",
                self.analysis.match_threshold
            )));
        }
        Ok(())
    }
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for both screening and analysis.
    #[serde(default = "default_model")]
    pub model: String,

    /// REST endpoint root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Delay between ingest-state polls for uploaded documents.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up on a document that is still processing after this long.
    #[serde(default = "default_ingest_timeout")]
    pub ingest_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            ingest_timeout_secs: default_ingest_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate `base_url`.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            LitScreenError::config(format!("invalid service.base_url '{}': {e}", self.base_url))
        })
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_ingest_timeout() -> u64 {
    600
}

/// `[screening]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// Items per classification call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Total attempts per batch when the service is rate limiting.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between rate-limited attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Pause between consecutive batches.
    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_ms: u64,

    /// Abstracts shorter than this are rejected without calling the service.
    #[serde(default = "default_min_abstract_length")]
    pub min_abstract_length: usize,

    /// Case-insensitive phrases that mark an abstract as a placeholder.
    #[serde(default = "default_placeholder_phrases")]
    pub placeholder_phrases: Vec<String>,

    /// Reject items with no DOI.
    #[serde(default)]
    pub require_doi: bool,

    /// Abstracts are truncated to this many characters before sending.
    #[serde(default = "default_max_abstract_chars")]
    pub max_abstract_chars: usize,

    /// Instructions sent ahead of every batch.
    #[serde(default = "default_screening_prompt")]
    pub prompt: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            inter_batch_delay_ms: default_inter_batch_delay(),
            min_abstract_length: default_min_abstract_length(),
            placeholder_phrases: default_placeholder_phrases(),
            require_doi: false,
            max_abstract_chars: default_max_abstract_chars(),
            prompt: default_screening_prompt(),
        }
    }
}

impl ScreeningConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

fn default_batch_size() -> usize {
    20
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    10
}
fn default_inter_batch_delay() -> u64 {
    1000
}
fn default_min_abstract_length() -> usize {
    50
}
fn default_placeholder_phrases() -> Vec<String> {
    vec![
        "no abstract".into(),
        "abstract available".into(),
        "see full text".into(),
    ]
}
fn default_max_abstract_chars() -> usize {
    2000
}
fn default_screening_prompt() -> String {
    DEFAULT_SCREENING_PROMPT.into()
}

/// `[analysis]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum concurrent document classifications.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Minimum fuzzy score (exclusive) for a citation to claim a file.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: u8,

    /// Column holding the text matched against artifact file names.
    #[serde(default = "default_citation_column")]
    pub citation_column: String,

    /// Column receiving the category label.
    #[serde(default = "default_result_column")]
    pub result_column: String,

    /// Column receiving the justification text.
    #[serde(default = "default_reason_column")]
    pub reason_column: String,

    /// Treat rows previously recorded as `Error` as pending.
    #[serde(default)]
    pub retry_errors: bool,

    /// Instructions sent alongside every document.
    #[serde(default = "default_analysis_prompt")]
    pub prompt: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            match_threshold: default_match_threshold(),
            citation_column: default_citation_column(),
            result_column: default_result_column(),
            reason_column: default_reason_column(),
            retry_errors: false,
            prompt: default_analysis_prompt(),
        }
    }
}

fn default_workers() -> usize {
    10
}
fn default_match_threshold() -> u8 {
    85
}
fn default_citation_column() -> String {
    "Full Citation".into()
}
fn default_result_column() -> String {
    "Method".into()
}
fn default_reason_column() -> String {
    "Method_Reason".into()
}
fn default_analysis_prompt() -> String {
    DEFAULT_ANALYSIS_PROMPT.into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.litscreen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LitScreenError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.litscreen/litscreen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LitScreenError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LitScreenError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LitScreenError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LitScreenError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LitScreenError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.service.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(LitScreenError::config(format!(
            "classification service API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("batch_size"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.screening.batch_size, 20);
        assert_eq!(parsed.screening.max_attempts, 3);
        assert_eq!(parsed.analysis.workers, 10);
        assert_eq!(parsed.analysis.match_threshold, 85);
        assert_eq!(parsed.service.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[screening]
batch_size = 5
require_doi = true

[analysis]
workers = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.screening.batch_size, 5);
        assert!(config.screening.require_doi);
        assert_eq!(config.screening.min_abstract_length, 50);
        assert_eq!(config.screening.placeholder_phrases.len(), 3);
        assert_eq!(config.analysis.workers, 3);
        assert_eq!(config.analysis.citation_column, "Full Citation");
        assert_eq!(config.service.model, "gemini-2.0-flash");
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_counts_are_rejected() {
        for (section, key) in [
            ("screening", "batch_size"),
            ("screening", "max_attempts"),
            ("analysis", "workers"),
        ] {
            let config: AppConfig =
                toml::from_str(&format!("[{section}]\n{key} = 0\n")).expect("parse");
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn unreachable_match_threshold_is_rejected() {
        let mut config = AppConfig::default();
        config.analysis.match_threshold = 99;
        assert!(config.validate().is_ok());
        config.analysis.match_threshold = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_from_validates_file_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("litscreen.toml");
        std::fs::write(&path, "[analysis]\nworkers = 0\n").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, LitScreenError::Config { .. }));

        std::fs::write(&path, "[analysis]\nworkers = 4\n").expect("write");
        assert_eq!(load_config_from(&path).expect("load").analysis.workers, 4);
    }

    #[test]
    fn screening_durations() {
        let cfg = ScreeningConfig::default();
        assert_eq!(cfg.retry_delay(), Duration::from_secs(10));
        assert_eq!(cfg.inter_batch_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn base_url_validation() {
        let mut service = ServiceConfig::default();
        assert!(service.base_url().is_ok());
        service.base_url = "not a url".into();
        assert!(service.base_url().is_err());
    }

    #[test]
    fn api_key_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.service.api_key_env = "LITSCREEN_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
