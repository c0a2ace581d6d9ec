//! Configuration
//!
//! Environment-driven: the only required secret is the Anthropic API key.
//! An optional second key enables grounded web search where the provider
//! does not bundle it.

use anyhow::Result;

const DEFAULT_MODEL: &str = "claude-opus-4-6";

#[derive(Clone)]
pub struct Config {
    /// Anthropic API key. Absent keys are tolerated at construction so the
    /// server can start for read-only browsing; workflows fail with a
    /// transport error until a key is provided.
    pub api_key: Option<String>,

    /// Model identifier for all analysis calls.
    pub model: String,

    /// Optional dedicated key for the grounded search provider. When unset,
    /// grounded calls ride on the main API key's built-in web search tool.
    pub search_api_key: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("model", &self.model)
            .field(
                "search_api_key",
                &self.search_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY not set; analysis workflows will be unavailable");
        }

        Ok(Self {
            api_key,
            model: std::env::var("CASE_NEXUS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            search_api_key: std::env::var("CASE_NEXUS_SEARCH_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}
