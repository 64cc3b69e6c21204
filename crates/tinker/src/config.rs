use serde::Deserialize;

use crate::Error;

/// Top-level configuration loaded from `tinker.toml`.
///
/// Every field has a default, so an empty file (or no file at all) is a
/// valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TinkerConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Model endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Output token cap per model call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Override for the Anthropic API base URL (proxies, test servers).
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: None,
        }
    }
}

/// Turn loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    /// Maximum model calls per user turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_steps: default_max_steps(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_max_tokens() -> u32 {
    crate::agent::DEFAULT_MAX_TOKENS
}

fn default_max_steps() -> usize {
    crate::agent::DEFAULT_MAX_STEPS
}

impl TinkerConfig {
    /// Parse a TOML config string.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Check values that parse fine but cannot drive a turn.
    pub fn validate(&self) -> Result<(), Error> {
        if self.agent.max_steps == 0 {
            return Err(Error::Config("agent.max_steps must be at least 1".into()));
        }
        if self.provider.max_tokens == 0 {
            return Err(Error::Config(
                "provider.max_tokens must be at least 1".into(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(Error::Config("provider.model must not be empty".into()));
        }
        if matches!(&self.provider.base_url, Some(url) if url.trim().is_empty()) {
            return Err(Error::Config("provider.base_url must not be empty".into()));
        }
        Ok(())
    }
}
