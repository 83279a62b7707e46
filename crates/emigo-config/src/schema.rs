// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_max_turns() -> u32 {
    10
}

fn default_max_history_tokens() -> usize {
    8000
}

fn default_min_history_messages() -> usize {
    3
}

fn default_fuzzy_threshold() -> f64 {
    0.85
}

/// Model connection settings.
///
/// Carried inside every `interaction_request` so the worker can build its
/// LLM client without any configuration files of its own.  The editor
/// frontend supplies these values; only `model` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name forwarded to the provider API.
    pub model: String,
    /// Base URL override for OpenAI-compatible endpoints.
    /// `None` uses the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// API key; may be absent for local servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Additional HTTP headers sent on every request (e.g. `HTTP-Referer`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<(String, String)>,
    /// Trace flag; the worker echoes extra diagnostics to stderr when set.
    #[serde(default)]
    pub verbose: bool,
}

/// Agent loop limits.  These are hardcoded defaults, not user-facing
/// configuration: the original frontend never exposed them either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum LLM turns per interaction.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Cumulative token budget when truncating history for a prompt.
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: usize,
    /// Floor on the number of trailing messages retained by truncation.
    #[serde(default = "default_min_history_messages")]
    pub min_history_messages: usize,
    /// Per-line similarity threshold for `replace_in_file` fuzzy matching.
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_similarity_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_history_tokens: default_max_history_tokens(),
            min_history_messages: default_min_history_messages(),
            fuzzy_similarity_threshold: default_fuzzy_threshold(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_defaults_match_documented_values() {
        let c = AgentConfig::default();
        assert_eq!(c.max_turns, 10);
        assert_eq!(c.max_history_tokens, 8000);
        assert_eq!(c.min_history_messages, 3);
        assert!((c.fuzzy_similarity_threshold - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn model_config_round_trips() {
        let c = ModelConfig {
            model: "gpt-4o-mini".into(),
            base_url: Some("http://localhost:8080/v1".into()),
            api_key: None,
            extra_headers: vec![("X-Test".into(), "1".into())],
            verbose: true,
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model, "gpt-4o-mini");
        assert_eq!(back.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(back.extra_headers.len(), 1);
        assert!(back.verbose);
    }

    #[test]
    fn model_config_optional_fields_omitted_from_json() {
        let c = ModelConfig {
            model: "m".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("base_url"));
        assert!(!json.contains("api_key"));
        assert!(!json.contains("extra_headers"));
    }

    #[test]
    fn agent_config_deserialises_partial_object() {
        let c: AgentConfig = serde_json::from_str(r#"{"max_turns": 3}"#).unwrap();
        assert_eq!(c.max_turns, 3);
        assert_eq!(c.max_history_tokens, 8000);
    }
}
