// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{ModelProvider, ResponseStream};
pub use types::{
    CompletionRequest, FunctionCall, Message, ResponseEvent, ToolCallRecord, ToolSchema,
};

use emigo_config::ModelConfig;

/// Build a provider from the model configuration carried in an
/// `interaction_request`.
///
/// Model names starting with `mock` select the deterministic echo provider
/// (no network), which keeps end-to-end plumbing testable without an API
/// key.  Everything else goes through the OpenAI-compatible driver.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    if cfg.model.starts_with("mock") {
        return Ok(Box::new(MockProvider));
    }
    Ok(Box::new(OpenAiCompatProvider::new(
        cfg.model.clone(),
        cfg.api_key.clone(),
        cfg.base_url.as_deref().unwrap_or("https://api.openai.com/v1"),
        cfg.extra_headers.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_model_name_selects_mock_provider() {
        let cfg = ModelConfig {
            model: "mock".into(),
            ..Default::default()
        };
        let p = from_config(&cfg).unwrap();
        assert_eq!(p.name(), "mock");
    }

    #[test]
    fn other_model_names_select_openai_compat() {
        let cfg = ModelConfig {
            model: "gpt-4o-mini".into(),
            base_url: Some("http://localhost:9999/v1".into()),
            ..Default::default()
        };
        let p = from_config(&cfg).unwrap();
        assert_eq!(p.name(), "openai-compat");
        assert_eq!(p.model_name(), "gpt-4o-mini");
    }
}
