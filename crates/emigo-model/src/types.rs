// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A single message in the conversation history.
///
/// Tagged by `role`: the serialized form is simultaneously the worker wire
/// format and the OpenAI chat wire format, and history travels between
/// processes without a translation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        /// Text content; `null` on the wire when the model produced only
        /// tool calls.
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCallRecord>>,
    },
    Tool {
        tool_call_id: String,
        name: String,
        content: String,
    },
    System {
        content: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: None,
        }
    }

    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self::Assistant {
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System { content: text.into() }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
            Self::System { .. } => "system",
        }
    }

    /// The plain text carried by this message, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::User { content } | Self::System { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_deref(),
        }
    }

    /// Mutable access to the text content, used when environment details are
    /// appended to the trailing user or tool message of a prompt.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::User { content } | Self::System { content } | Self::Tool { content, .. } => {
                Some(content)
            }
            Self::Assistant { content, .. } => content.as_mut(),
        }
    }

    /// Approximate token count: one token per four bytes of text plus the
    /// serialized size of any tool calls, minimum one.
    pub fn approx_tokens(&self) -> usize {
        let mut chars = self.text().map(str::len).unwrap_or(0);
        if let Self::Assistant {
            tool_calls: Some(calls),
            ..
        } = self
        {
            for c in calls {
                chars += c.function.name.len() + c.function.arguments.len();
            }
        }
        (chars / 4).max(1)
    }
}

/// One tool call recorded on an assistant message, in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

impl ToolCallRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub stream: bool,
}

/// A single streamed event from the model.
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    /// A text delta streamed from the model.
    TextDelta(String),
    /// A tool-call delta.  `index` discriminates parallel tool calls; `id`
    /// and `name` are non-empty only on the first delta for an index, while
    /// `arguments` fragments may arrive on any delta.
    ToolCall {
        index: u32,
        id: String,
        name: String,
        arguments: String,
    },
    /// The stream finished normally.
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
