//! Application configuration
//!
//! Defaults, overridden by `INSIGHTSQL_*` environment variables (a `.env`
//! file in the working directory is loaded first), overridden in turn by
//! command-line flags in the binary.

use crate::agent::{DEFAULT_MAX_ITERATIONS, DEFAULT_PROMPT_ID};
use crate::db::DEFAULT_DATABASE_URI;

/// Output languages offered by `/lang`; any other name is accepted too
pub const SUPPORTED_LANGUAGES: &[&str] = &["English", "Indonesian"];

/// Configuration for one InsightSQL session
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Model to use for Ollama (e.g., "qwen3")
    pub model: String,
    /// Sampling temperature; kept low for stable SQL
    pub temperature: f32,
    /// SQLAlchemy-style SQLite URI
    pub database_uri: String,
    /// Initial output language
    pub language: String,
    /// Maximum ReAct iterations per turn
    pub max_iterations: usize,
    /// Prompt hub base URL (bundled template when None)
    pub prompt_hub_url: Option<String>,
    /// Template identifier pulled from the prompt source
    pub prompt_id: String,
    /// OTLP gRPC endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Credential for the model provider
    pub api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3".to_string(),
            temperature: 0.3,
            database_uri: DEFAULT_DATABASE_URI.to_string(),
            language: SUPPORTED_LANGUAGES[0].to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            prompt_hub_url: None,
            prompt_id: DEFAULT_PROMPT_ID.to_string(),
            otlp_endpoint: None,
            api_key: None,
        }
    }
}

impl AppConfig {
    /// Load `.env`, then read `INSIGHTSQL_*` variables over the defaults
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; blank values are ignored
    ///
    /// Unparseable numbers fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            base_url: get("INSIGHTSQL_BASE_URL").unwrap_or(defaults.base_url),
            model: get("INSIGHTSQL_MODEL").unwrap_or(defaults.model),
            temperature: get("INSIGHTSQL_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            database_uri: get("INSIGHTSQL_DATABASE_URI").unwrap_or(defaults.database_uri),
            language: get("INSIGHTSQL_LANGUAGE").unwrap_or(defaults.language),
            max_iterations: get("INSIGHTSQL_MAX_ITERATIONS")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_iterations),
            prompt_hub_url: get("INSIGHTSQL_PROMPT_HUB_URL"),
            prompt_id: get("INSIGHTSQL_PROMPT_ID").unwrap_or(defaults.prompt_id),
            otlp_endpoint: get("INSIGHTSQL_OTLP_ENDPOINT"),
            api_key: get("INSIGHTSQL_API_KEY"),
        }
    }
}
