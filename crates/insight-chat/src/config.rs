//! LLM configuration and provider selection.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::LLMProvider;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Stored LLM configuration (read from llm-config.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    #[serde(default = "default_preferred")]
    pub preferred_provider: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_groq_model")]
    pub groq_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_preferred() -> String {
    "auto".into()
}
fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.into()
}
fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.into()
}
fn default_groq_model() -> String {
    DEFAULT_GROQ_MODEL.into()
}
fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.into()
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            preferred_provider: default_preferred(),
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            gemini_api_key: None,
            openai_model: default_openai_model(),
            anthropic_model: default_anthropic_model(),
            groq_model: default_groq_model(),
            gemini_model: default_gemini_model(),
            config_path: PathBuf::new(),
        }
    }
}

/// The provider chosen for a request, with its model and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider: LLMProvider,
    pub model: String,
    pub api_key: String,
}

impl LLMConfig {
    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    /// Load config from file, filling missing API keys from `lookup`.
    pub fn load_with<F>(config_path: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: LLMConfig = match std::fs::read_to_string(config_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", config_path.display(), e);
                LLMConfig::default()
            }),
            Err(_) => {
                debug!("No LLM config at {}, using environment", config_path.display());
                LLMConfig::default()
            }
        };

        config.config_path = config_path.to_path_buf();

        let env_key = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if config.openai_api_key.is_none() {
            config.openai_api_key = env_key("OPENAI_API_KEY");
        }
        if config.anthropic_api_key.is_none() {
            config.anthropic_api_key = env_key("ANTHROPIC_API_KEY");
        }
        if config.groq_api_key.is_none() {
            config.groq_api_key = env_key("GROQ_API_KEY");
        }
        if config.gemini_api_key.is_none() {
            config.gemini_api_key = env_key("GEMINI_API_KEY");
        }

        config
    }

    /// Resolve which provider and model to use.
    pub fn resolve_provider(&self) -> Option<ResolvedProvider> {
        let pick = |provider: LLMProvider| {
            let (key, model) = match provider {
                LLMProvider::OpenAI => (&self.openai_api_key, &self.openai_model),
                LLMProvider::Anthropic => (&self.anthropic_api_key, &self.anthropic_model),
                LLMProvider::Groq => (&self.groq_api_key, &self.groq_model),
                LLMProvider::Gemini => (&self.gemini_api_key, &self.gemini_model),
            };
            key.as_ref().map(|k| ResolvedProvider {
                provider,
                model: model.clone(),
                api_key: k.clone(),
            })
        };

        match self.preferred_provider.as_str() {
            "auto" => [
                LLMProvider::Gemini,
                LLMProvider::Anthropic,
                LLMProvider::Groq,
                LLMProvider::OpenAI,
            ]
            .into_iter()
            .find_map(pick),
            "openai" => pick(LLMProvider::OpenAI),
            "anthropic" => pick(LLMProvider::Anthropic),
            "groq" => pick(LLMProvider::Groq),
            "gemini" => pick(LLMProvider::Gemini),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = LLMConfig::load_with(&dir.path().join("llm-config.json"), no_env);

        assert_eq!(config.preferred_provider, "auto");
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert!(config.resolve_provider().is_none());
    }

    #[test]
    fn test_env_fills_missing_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("llm-config.json");
        std::fs::write(&path, r#"{"openai_api_key": "from-file"}"#).unwrap();

        let config = LLMConfig::load_with(&path, |key| match key {
            "OPENAI_API_KEY" => Some("from-env".into()),
            "GROQ_API_KEY" => Some("groq-env".into()),
            "ANTHROPIC_API_KEY" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(config.openai_api_key.as_deref(), Some("from-file"));
        assert_eq!(config.groq_api_key.as_deref(), Some("groq-env"));
        assert!(config.anthropic_api_key.is_none());
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("llm-config.json");
        std::fs::write(&path, "{not json").unwrap();

        let config = LLMConfig::load_with(&path, no_env);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn test_auto_prefers_gemini_then_anthropic() {
        let mut config = LLMConfig {
            openai_api_key: Some("o".into()),
            anthropic_api_key: Some("a".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve_provider().unwrap().provider, LLMProvider::Anthropic);

        config.gemini_api_key = Some("g".into());
        let resolved = config.resolve_provider().unwrap();
        assert_eq!(resolved.provider, LLMProvider::Gemini);
        assert_eq!(resolved.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(resolved.api_key, "g");
    }

    #[test]
    fn test_explicit_preference_requires_key() {
        let mut config = LLMConfig {
            preferred_provider: "groq".into(),
            openai_api_key: Some("o".into()),
            ..Default::default()
        };
        assert!(config.resolve_provider().is_none());

        config.groq_api_key = Some("q".into());
        assert_eq!(config.resolve_provider().unwrap().provider, LLMProvider::Groq);

        config.preferred_provider = "mystery".into();
        assert!(config.resolve_provider().is_none());
    }
}
