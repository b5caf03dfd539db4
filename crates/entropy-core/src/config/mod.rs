//! Configuration management.
//!
//! Env-var-with-default pattern
//! (`LLMServiceConfig::default()`): every knob has a sane default,
//! environment variables override it, and an optional YAML file on
//! disk overrides constants that don't belong hardcoded in source
//! (the cost table, RRF/pool tuning).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EntropyError, Result};

/// Per-model $/token pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCost {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

/// Model tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMServiceConfig {
    /// Base URL of the LLM provider.
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Cheap model used by the Generalist.
    #[serde(default = "default_cheap_model")]
    pub cheap_model: String,

    /// Mid-tier model used by the NewsSpecialist.
    #[serde(default = "default_mid_model")]
    pub mid_model: String,

    /// Expensive model used by the MarketSpecialist.
    #[serde(default = "default_expensive_model")]
    pub expensive_model: String,

    /// API key; required at startup.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Per-model cost table, keyed by model name.
    #[serde(default = "default_cost_table")]
    pub cost_table: HashMap<String, ModelCost>,

    /// Fraction of input-token cost charged for a cached prompt
    /// prefix hit.
    #[serde(default = "default_cache_discount")]
    pub prompt_cache_discount: f64,
}

fn default_llm_url() -> String {
    std::env::var("ENTROPY_LLM_URL").unwrap_or_else(|_| "https://api.anthropic.com".to_string())
}

fn default_cheap_model() -> String {
    std::env::var("ENTROPY_CHEAP_MODEL").unwrap_or_else(|_| "claude-haiku".to_string())
}

fn default_mid_model() -> String {
    std::env::var("ENTROPY_MID_MODEL").unwrap_or_else(|_| "claude-sonnet".to_string())
}

fn default_expensive_model() -> String {
    std::env::var("ENTROPY_EXPENSIVE_MODEL").unwrap_or_else(|_| "claude-opus".to_string())
}

fn default_timeout() -> u64 {
    30
}

fn default_cache_discount() -> f64 {
    0.1
}

fn default_cost_table() -> HashMap<String, ModelCost> {
    let mut table = HashMap::new();
    table.insert(
        default_cheap_model(),
        ModelCost {
            input_per_token: 0.25e-6,
            output_per_token: 1.25e-6,
        },
    );
    table.insert(
        default_mid_model(),
        ModelCost {
            input_per_token: 3.0e-6,
            output_per_token: 15.0e-6,
        },
    );
    table.insert(
        default_expensive_model(),
        ModelCost {
            input_per_token: 15.0e-6,
            output_per_token: 75.0e-6,
        },
    );
    table
}

impl Default for LLMServiceConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            cheap_model: default_cheap_model(),
            mid_model: default_mid_model(),
            expensive_model: default_expensive_model(),
            api_key: std::env::var("ENTROPY_LLM_API_KEY").ok(),
            timeout_secs: default_timeout(),
            cost_table: default_cost_table(),
            prompt_cache_discount: default_cache_discount(),
        }
    }
}

impl LLMServiceConfig {
    pub fn cost_for(&self, model: &str) -> ModelCost {
        self.cost_table.get(model).cloned().unwrap_or(ModelCost {
            input_per_token: 1.0e-6,
            output_per_token: 5.0e-6,
        })
    }
}

/// Tuning knobs for the `SpecialistPool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Bounded queue depth before saturation eviction kicks in.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_max_workers() -> usize {
    std::env::var("SPECIALIST_MAX_WORKERS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4)
}

fn default_ttl_seconds() -> u64 {
    std::env::var("SPECIALIST_TTL_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300)
}

fn default_timeout_seconds() -> u64 {
    std::env::var("SPECIALIST_TIMEOUT_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

fn default_queue_depth() -> usize {
    32
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            ttl_seconds: default_ttl_seconds(),
            timeout_seconds: default_timeout_seconds(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Hybrid retrieval tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
}

fn default_rrf_k() -> f64 {
    60.0
}
fn default_semantic_weight() -> f64 {
    2.0
}
fn default_lexical_weight() -> f64 {
    1.0
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
        }
    }
}

/// Top-level configuration, loaded once at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LLMServiceConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load from the default path, falling back to defaults (with env
    /// overrides already baked into each sub-config's `Default`) when
    /// no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }

    /// Fails with a misconfiguration error when
    /// the provider API key is missing.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .ok_or_else(|| EntropyError::Config("ENTROPY_LLM_API_KEY is not set".to_string()))
    }
}
