//! Dispatcher settings

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the chat API key
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Runtime settings, read from `config.json` in the data directory.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bank named in responder prompts
    pub bank_name: String,

    /// Chat model identifier
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    pub api_base_url: String,

    /// Whole-request timeout for text generation calls
    pub request_timeout_secs: u64,

    pub cache_ttl_hours: u64,

    /// Exchanges kept per session
    pub max_history: usize,

    /// Exchanges rendered into the knowledge prompt
    pub context_turns: usize,

    /// Chunks retrieved per knowledge query
    pub result_count: usize,

    pub classifier_temperature: f64,
    pub classifier_max_tokens: u32,
    pub knowledge_temperature: f64,
    pub knowledge_max_tokens: u32,
    pub marketing_temperature: f64,
    pub marketing_max_tokens: u32,

    pub enable_cache: bool,
    pub enable_memory: bool,
    pub enable_monitoring: bool,
    pub enable_feedback: bool,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            bank_name: "Sample Bank".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_base_url: "https://api.groq.com/openai/v1".to_string(),
            request_timeout_secs: 60,
            cache_ttl_hours: 24,
            max_history: 10,
            context_turns: 3,
            result_count: 3,
            classifier_temperature: 0.1,
            classifier_max_tokens: 10,
            knowledge_temperature: 0.1,
            knowledge_max_tokens: 1024,
            marketing_temperature: 0.8,
            marketing_max_tokens: 800,
            enable_cache: true,
            enable_memory: true,
            enable_monitoring: true,
            enable_feedback: true,
        }
    }

    /// Load settings from a JSON file. A missing or malformed file yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot read settings, using defaults: {e}");
                return Self::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "malformed settings, using defaults: {e}");
                Self::new()
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.cache_ttl_hours, 24);
        assert_eq!(settings.max_history, 10);
        assert_eq!(settings.context_turns, 3);
        assert_eq!(settings.classifier_max_tokens, 10);
        assert_eq!(settings.request_timeout_secs, 60);
        assert!(settings.enable_cache && settings.enable_memory);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, r#"{"bank_name": "Harbor Bank", "cache_ttl_hours": 1}"#).unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.bank_name, "Harbor Bank");
        assert_eq!(settings.cache_ttl_hours, 1);
        assert_eq!(settings.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn test_missing_or_malformed_file() {
        let temp = tempfile::TempDir::new().unwrap();
        assert_eq!(Settings::load(&temp.path().join("absent.json")), Settings::new());

        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::new());
    }
}
