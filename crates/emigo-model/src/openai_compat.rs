// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Streaming driver for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Everything the worker talks to (hosted APIs, LiteLLM proxies, local
//! llama.cpp servers) speaks this wire format, so a single driver covers
//! all of them; only the base URL and key differ.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{provider::ResponseStream, CompletionRequest, Message, ResponseEvent};

pub struct OpenAiCompatProvider {
    model: String,
    api_key: Option<String>,
    chat_url: String,
    client: reqwest::Client,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiCompatProvider {
    /// `base_url` ends before `/chat/completions`, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: &str,
        extra_headers: Vec<(String, String)>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            model,
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
            extra_headers,
        }
    }
}

#[async_trait]
impl crate::ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let messages = build_wire_messages(&req.messages);

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": req.stream,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        debug!(
            model = %self.model,
            message_count = req.messages.len(),
            tool_count = req.tools.len(),
            "sending completion request"
        );

        let mut http_req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }
        for (name, val) in &self.extra_headers {
            http_req = http_req.header(name.as_str(), val.as_str());
        }

        let resp = http_req.send().await.context("completion request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("provider error {status}: {text}");
        }

        // SSE events can be split across TCP packets.  A line buffer carried
        // across chunks guarantees that only complete `data:` lines are
        // parsed; the trailing partial line waits for the next chunk.
        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let events: Vec<anyhow::Result<ResponseEvent>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Serialize history into the chat wire format.  [`Message`] is already
/// tagged by `role` in that shape, so each entry serializes directly.
fn build_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| serde_json::to_value(m).expect("message serialization is infallible"))
        .collect()
}

/// Drain all complete `\n`-terminated SSE lines from `buf`, leaving any
/// trailing partial line in place.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<ResponseEvent>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

/// Parse one complete SSE `data:` line.  Returns `None` for empty lines,
/// comments, and unparseable payloads.
fn parse_sse_data_line(line: &str) -> Option<anyhow::Result<ResponseEvent>> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(ResponseEvent::Done));
    }
    let v: Value = serde_json::from_str(data).ok()?;
    parse_sse_chunk(&v)
}

fn parse_sse_chunk(v: &Value) -> Option<anyhow::Result<ResponseEvent>> {
    // Usage-only chunks carry no delta.
    if v.get("usage").map(|u| !u.is_null()).unwrap_or(false) && v["choices"][0].is_null() {
        return None;
    }

    let delta = &v["choices"][0]["delta"];

    // Each SSE chunk carries at most one tool-call delta in practice; the
    // index routes accumulation in the worker.
    if let Some(tc) = delta.get("tool_calls").and_then(|t| t.get(0)) {
        let index = tc["index"].as_u64().unwrap_or(0) as u32;
        let id = tc["id"].as_str().unwrap_or("").to_string();
        let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
        let arguments = tc["function"]["arguments"].as_str().unwrap_or("").to_string();
        return Some(Ok(ResponseEvent::ToolCall { index, id, name, arguments }));
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            return Some(Ok(ResponseEvent::TextDelta(text.to_string())));
        }
    }

    None
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ToolCallRecord};

    fn make_provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("test-model".into(), None, "http://localhost:9999/v1", vec![])
    }

    #[test]
    fn chat_url_appends_path() {
        assert_eq!(make_provider().chat_url, "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let p = OpenAiCompatProvider::new("m".into(), None, "http://localhost:1234/v1/", vec![]);
        assert_eq!(p.chat_url, "http://localhost:1234/v1/chat/completions");
    }

    // ── Wire message building ─────────────────────────────────────────────────

    #[test]
    fn history_serialises_in_chat_wire_shape() {
        let msgs = vec![
            Message::system("sys"),
            Message::user("hello"),
            Message::assistant_with_tools(
                None,
                vec![ToolCallRecord::new("c1", "read_file", r#"{"path":"x"}"#)],
            ),
            Message::tool_result("c1", "read_file", "done"),
        ];
        let wire = build_wire_messages(&msgs);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["content"], "hello");
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "read_file");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "c1");
    }

    // ── SSE chunk parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_sse_text_delta() {
        let v = json!({ "choices": [{ "delta": { "content": "hello" } }] });
        let ev = parse_sse_chunk(&v).unwrap().unwrap();
        assert!(matches!(ev, ResponseEvent::TextDelta(t) if t == "hello"));
    }

    #[test]
    fn parse_sse_empty_content_yields_nothing() {
        let v = json!({ "choices": [{ "delta": { "content": "" } }] });
        assert!(parse_sse_chunk(&v).is_none());
    }

    #[test]
    fn parse_sse_tool_call_start() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_abc",
                        "function": { "name": "execute_command", "arguments": "" }
                    }]
                }
            }]
        });
        let ev = parse_sse_chunk(&v).unwrap().unwrap();
        assert!(matches!(&ev, ResponseEvent::ToolCall { index: 0, id, name, arguments }
            if id == "call_abc" && name == "execute_command" && arguments.is_empty()));
    }

    #[test]
    fn parse_sse_tool_call_argument_fragment() {
        let v = json!({
            "choices": [{
                "delta": {
                    "tool_calls": [{
                        "index": 1,
                        "function": { "arguments": "{\"path\": " }
                    }]
                }
            }]
        });
        let ev = parse_sse_chunk(&v).unwrap().unwrap();
        assert!(matches!(&ev, ResponseEvent::ToolCall { index: 1, arguments, .. }
            if arguments == "{\"path\": "));
    }

    #[test]
    fn parse_sse_usage_only_chunk_is_skipped() {
        let v = json!({ "usage": { "prompt_tokens": 10, "completion_tokens": 2 }, "choices": [] });
        assert!(parse_sse_chunk(&v).is_none());
    }

    // ── SSE line buffering ────────────────────────────────────────────────────

    #[test]
    fn done_sentinel_is_parsed() {
        let mut buf = "data: [DONE]\n".to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(ResponseEvent::Done)));
    }

    #[test]
    fn incomplete_line_is_retained() {
        let partial = "data: {\"choices\":[{\"delta\":{\"content\":\"hel";
        let mut buf = partial.to_string();
        assert!(drain_complete_sse_lines(&mut buf).is_empty());
        assert_eq!(buf, partial);
    }

    #[test]
    fn event_split_across_chunks_is_reassembled() {
        let full = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"read_file","arguments":""}}]}}]}"#;
        let (a, b) = full.split_at(full.len() / 2);

        let mut buf = String::new();
        buf.push_str(a);
        assert!(drain_complete_sse_lines(&mut buf).is_empty());

        buf.push_str(b);
        buf.push('\n');
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Ok(ResponseEvent::ToolCall { index, id, name, .. }) => {
                assert_eq!(*index, 0);
                assert_eq!(id, "c1");
                assert_eq!(name, "read_file");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn multiple_events_in_one_chunk_all_parsed() {
        let mut buf = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"4\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\".\"}}]}\n",
            "data: [DONE]\n",
        )
        .to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let mut buf = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\r\n".to_string();
        let events = drain_complete_sse_lines(&mut buf);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(ResponseEvent::TextDelta(t)) if t == "hi"));
    }
}
