//! dentplan configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main dentplan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generation (narrative drafting) backend configuration
    pub llm: LlmConfig,

    /// Semantic code search backend configuration
    pub semantic: SemanticConfig,

    /// Pricing backend configuration
    pub pricing: PricingConfig,

    /// Catalog snapshot configuration
    pub catalog: CatalogConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    /// The generation backend is optional; the key check only applies when
    /// one is enabled.
    pub fn validate(&self) -> Result<()> {
        if self.llm.enabled && std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Generation backend enabled but API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .dentplan.yml
        let local_config = PathBuf::from(".dentplan.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/dentplan/dentplan.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dentplan").join("dentplan.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether a generation backend is wired at all; when false the drafter
    /// uses the deterministic template
    pub enabled: bool,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL (OpenAI-compatible chat completions)
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Draft request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 2048,
            timeout_ms: 25_000,
        }
    }
}

/// Semantic search backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    /// Search service base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Candidates requested per free-text query
    #[serde(rename = "top-k")]
    pub top_k: usize,

    /// Query timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            top_k: 7,
            timeout_ms: 6_000,
        }
    }
}

/// Pricing backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Pricing service base URL; empty means price in-process against the
    /// catalog snapshot
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Batch pricing timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 15_000,
        }
    }
}

/// Catalog snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the price items snapshot (JSONL, one entry per line)
    pub path: PathBuf,

    /// Path to the service alias table (YAML map phrase -> codes)
    #[serde(rename = "aliases-path")]
    pub aliases_path: PathBuf,

    /// Path to the clinical guidelines file (JSON)
    #[serde(rename = "guidelines-path")]
    pub guidelines_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("price_items.jsonl"),
            aliases_path: PathBuf::from("config/service_aliases.yml"),
            guidelines_path: PathBuf::from("knowledge/guidelines.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(!config.llm.enabled);
        assert_eq!(config.semantic.top_k, 7);
        assert_eq!(config.semantic.timeout_ms, 6_000);
        assert_eq!(config.llm.timeout_ms, 25_000);
        assert_eq!(config.pricing.timeout_ms, 15_000);
    }

    #[test]
    fn test_validate_passes_without_backend() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  enabled: true
  model: gpt-4o
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 4096
  timeout-ms: 30000

semantic:
  base-url: http://search.local:8000
  top-k: 5
  timeout-ms: 4000

pricing:
  base-url: http://pricing.local:8000
  timeout-ms: 10000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert!(config.llm.enabled);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.semantic.top_k, 5);
        assert_eq!(config.semantic.timeout_ms, 4000);
        assert_eq!(config.pricing.base_url, "http://pricing.local:8000");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
semantic:
  top-k: 3
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.semantic.top_k, 3);

        // Defaults for unspecified
        assert!(!config.llm.enabled);
        assert_eq!(config.semantic.timeout_ms, 6_000);
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
    }
}
