//! Application configuration for the J-Book toolkit.
//!
//! User config lives at `~/.jbook/jbook.toml`.
//! CLI flags override config file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{JbookError, Result};
use crate::types::Relevance;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jbook.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jbook";

/// Default tag cache database file name (inside the config dir).
const CACHE_FILE_NAME: &str = "cache.db";

// ---------------------------------------------------------------------------
// Config structs (matching jbook.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Relevance tagging settings.
    #[serde(default)]
    pub tagging: TaggingConfig,

    /// Tag cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default directory for pipeline output.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Parallel LLM requests during tagging.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on the narrative corpus sent per row.
    #[serde(default = "default_max_corpus_chars")]
    pub max_corpus_chars: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            max_corpus_chars: default_max_corpus_chars(),
        }
    }
}

fn default_output_dir() -> String {
    "var/out".into()
}
fn default_concurrency() -> usize {
    4
}
fn default_max_corpus_chars() -> usize {
    8000
}

/// Which backend assigns relevance labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "rule-based")]
    RuleBased,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::RuleBased => "rule-based",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = JbookError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "rule-based" | "rules" | "none" => Ok(Self::RuleBased),
            other => Err(JbookError::config(format!(
                "unknown provider '{other}': expected 'openai' or 'rule-based'"
            ))),
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Tagging backend.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model to use for tagging.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on 429/5xx/connection errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}

/// Dashboard weights applied to each relevance label when summing costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceWeights {
    #[serde(default = "default_high_weight")]
    pub high: f64,
    #[serde(default = "default_medium_weight")]
    pub medium: f64,
    #[serde(default = "default_low_weight")]
    pub low: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            high: default_high_weight(),
            medium: default_medium_weight(),
            low: default_low_weight(),
        }
    }
}

impl RelevanceWeights {
    pub fn get(&self, relevance: Relevance) -> f64 {
        match relevance {
            Relevance::High => self.high,
            Relevance::Medium => self.medium,
            Relevance::Low => self.low,
        }
    }

    pub fn get_mut(&mut self, relevance: Relevance) -> &mut f64 {
        match relevance {
            Relevance::High => &mut self.high,
            Relevance::Medium => &mut self.medium,
            Relevance::Low => &mut self.low,
        }
    }
}

fn default_high_weight() -> f64 {
    1.0
}
fn default_medium_weight() -> f64 {
    0.5
}
fn default_low_weight() -> f64 {
    0.0
}

/// `[tagging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    /// Technology keywords used when none are given on the command line.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    /// Weighted-total multipliers.
    #[serde(default)]
    pub weights: RelevanceWeights,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            weights: RelevanceWeights::default(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    vec!["C-UAS".into(), "hypersonics".into()]
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether LLM tag results are cached between runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database path; defaults to `~/.jbook/cache.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

impl CacheConfig {
    /// Resolve the cache database path, falling back to the config dir.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(config_dir()?.join(CACHE_FILE_NAME)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jbook/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| JbookError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jbook/jbook.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| JbookError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| JbookError::config(format!("failed to parse {}: {e}", path.display())))?;

    Url::parse(&config.llm.base_url).map_err(|e| {
        JbookError::config(format!("invalid llm.base_url '{}': {e}", config.llm.base_url))
    })?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JbookError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JbookError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JbookError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Return the API key from the configured env var, or a config error.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(JbookError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable \
             (or put it in a .env file)."
        ))),
    }
}

/// Load environment variables from a dotenv file.
///
/// With an explicit path the file must exist. Without one, a `.env` in the
/// working directory is loaded if present. Existing variables are never
/// overridden.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            dotenvy::from_path(p).map_err(|e| {
                JbookError::config(format!("failed to load env file {}: {e}", p.display()))
            })?;
            tracing::debug!(path = %p.display(), "loaded env file");
        }
        None => {
            if let Ok(found) = dotenvy::dotenv() {
                tracing::debug!(path = %found.display(), "loaded .env");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("gpt-4o-mini"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.concurrency, 4);
        assert_eq!(parsed.llm.provider, ProviderKind::OpenAi);
        assert_eq!(parsed.tagging.keywords, vec!["C-UAS", "hypersonics"]);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[llm]
provider = "rule-based"

[tagging]
keywords = ["directed energy"]

[tagging.weights]
medium = 0.25
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.llm.provider, ProviderKind::RuleBased);
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
        assert_eq!(config.tagging.keywords, vec!["directed energy"]);
        assert_eq!(config.tagging.weights.high, 1.0);
        assert_eq!(config.tagging.weights.medium, 0.25);
        assert!(config.cache.enabled);
    }

    #[test]
    fn load_config_rejects_bad_base_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jbook.toml");
        std::fs::write(&path, "[llm]\nbase_url = \"not a url\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn provider_kind_parses() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("rule-based".parse::<ProviderKind>().unwrap(), ProviderKind::RuleBased);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn weights_lookup() {
        let mut weights = RelevanceWeights::default();
        assert_eq!(weights.get(Relevance::Medium), 0.5);
        *weights.get_mut(Relevance::Low) = 0.1;
        assert_eq!(weights.low, 0.1);
    }

    #[test]
    fn cache_path_override() {
        let cache = CacheConfig {
            enabled: true,
            path: Some("/tmp/jbook-cache.db".into()),
        };
        assert_eq!(cache.resolved_path().unwrap(), PathBuf::from("/tmp/jbook-cache.db"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "JBOOK_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn explicit_env_file_must_exist() {
        let result = load_env_file(Some(Path::new("/nonexistent/jbook/.env")));
        assert!(result.is_err());
    }
}
