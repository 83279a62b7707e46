// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ResponseStream, CompletionRequest, Message, ResponseEvent};

/// Deterministic mock provider.  Echoes the last user message back as the
/// assistant response.  Selected with `model = "mock"` so the full pipeline
/// can run without network access.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::User { .. }))
            .and_then(|m| m.text())
            .unwrap_or("[no input]")
            .to_string();

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// A pre-scripted provider for tests.  Each `complete` call pops the next
/// script from the queue; an item may be an `Err` string to simulate a
/// mid-stream failure.
pub struct ScriptedMockProvider {
    scripts: Mutex<Vec<Vec<Result<ResponseEvent, String>>>>,
    /// The last request seen, for assertions on what was sent.
    pub last_request: Arc<Mutex<Option<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(scripts: Vec<Vec<ResponseEvent>>) -> Self {
        Self::with_results(
            scripts
                .into_iter()
                .map(|s| s.into_iter().map(Ok).collect())
                .collect(),
        )
    }

    pub fn with_results(scripts: Vec<Vec<Result<ResponseEvent, String>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: a provider that streams one text reply in two deltas.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![
            ResponseEvent::TextDelta(reply.into()),
            ResponseEvent::Done,
        ]])
    }

    /// Convenience: a tool call on the first round, text on the second.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                ResponseEvent::ToolCall {
                    index: 0,
                    id: tool_id.into(),
                    name: tool_name.into(),
                    arguments: args_json.into(),
                },
                ResponseEvent::Done,
            ],
            vec![ResponseEvent::TextDelta(final_text.into()), ResponseEvent::Done],
        ])
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let events = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![
                    Ok(ResponseEvent::TextDelta("[no more scripts]".into())),
                    Ok(ResponseEvent::Done),
                ]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<ResponseEvent>> = events
            .into_iter()
            .map(|r| r.map_err(|e| anyhow::anyhow!(e)))
            .collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
