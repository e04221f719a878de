use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemeConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub corpus: CorpusConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub classify_max_tokens: u32,
    pub reason_max_tokens: u32,
    pub classify_temperature: f32,
    pub reason_temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub vector_top_k: usize,
    pub max_context_items: usize,
    pub max_entities: usize,
    pub neighbor_depth: usize,
    pub neighbor_limit: usize,
    pub store_timeout_ms: u64,
    pub max_item_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub max_reasoning_steps: u32,
    pub history_window: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "openai/gpt-4o-mini".into(),
            api_key: String::new(),
            timeout_secs: 60,
            classify_max_tokens: 200,
            reason_max_tokens: 1000,
            classify_temperature: 0.1,
            reason_temperature: 0.7,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 5,
            max_context_items: 10,
            max_entities: 3,
            neighbor_depth: 1,
            neighbor_limit: 3,
            store_timeout_ms: 5000,
            max_item_chars: 2000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_reasoning_steps: 3,
            history_window: 20,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        let path = default_mneme_dir()
            .join("corpus.json")
            .to_string_lossy()
            .into_owned();
        Self { path }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetrievalConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Returns `~/.mneme/`
pub fn default_mneme_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mneme")
}

/// Returns the default config file path: `~/.mneme/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mneme_dir().join("config.toml")
}

impl MnemeConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemeConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MNEME_CORPUS, MNEME_LOG_LEVEL, MNEME_LLM_*).
    ///
    /// `OPENROUTER_API_KEY` is honoured when `MNEME_LLM_API_KEY` is unset.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEME_CORPUS") {
            self.corpus.path = val;
        }
        if let Ok(val) = std::env::var("MNEME_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEME_LLM_MODEL") {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("MNEME_LLM_BASE_URL") {
            self.llm.base_url = val;
        }
        if let Ok(val) = std::env::var("MNEME_LLM_API_KEY") {
            self.llm.api_key = val;
        } else if let Ok(val) = std::env::var("OPENROUTER_API_KEY") {
            self.llm.api_key = val;
        }
    }

    /// Resolve the corpus path, expanding `~` if needed.
    pub fn resolved_corpus_path(&self) -> PathBuf {
        expand_tilde(&self.corpus.path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MnemeConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.agent.max_reasoning_steps, 3);
        assert_eq!(config.agent.history_window, 20);
        assert_eq!(config.retrieval.vector_top_k, 5);
        assert_eq!(config.retrieval.max_context_items, 10);
        assert!(config.corpus.path.ends_with("corpus.json"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[llm]
model = "anthropic/some-model"
timeout_secs = 15

[agent]
max_reasoning_steps = 5

[retrieval]
vector_top_k = 8
"#;
        let config: MnemeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.llm.model, "anthropic/some-model");
        assert_eq!(config.llm.timeout(), Duration::from_secs(15));
        assert_eq!(config.agent.max_reasoning_steps, 5);
        assert_eq!(config.retrieval.vector_top_k, 8);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.max_context_items, 10);
        assert_eq!(config.agent.history_window, 20);
        assert_eq!(config.llm.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = MnemeConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.agent.max_reasoning_steps, 3);
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_reasoning_steps = ").unwrap();
        let err = MnemeConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config TOML"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = MnemeConfig::default();
        std::env::set_var("MNEME_CORPUS", "/tmp/override.json");
        std::env::set_var("MNEME_LOG_LEVEL", "trace");
        std::env::set_var("MNEME_LLM_API_KEY", "sk-test");

        config.apply_env_overrides();

        assert_eq!(config.corpus.path, "/tmp/override.json");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.llm.api_key, "sk-test");

        // Clean up
        std::env::remove_var("MNEME_CORPUS");
        std::env::remove_var("MNEME_LOG_LEVEL");
        std::env::remove_var("MNEME_LLM_API_KEY");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/corpus.json"), PathBuf::from("/var/corpus.json"));
    }
}
