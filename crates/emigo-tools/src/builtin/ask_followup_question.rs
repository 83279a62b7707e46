// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::result::{format_err, format_ok, TOOL_DENIED};
use crate::tool::{require_str, Tool, ToolContext};

pub struct AskFollowupQuestionTool;

#[async_trait]
impl Tool for AskFollowupQuestionTool {
    fn name(&self) -> &str {
        "ask_followup_question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question. Optionally supply a JSON array \
         of suggested answers in 'options'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to present"
                },
                "options": {
                    "type": "string",
                    "description": "Optional JSON array of canned answers"
                }
            },
            "required": ["question"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let question = match require_str(params, "question", self.name()) {
            Ok(q) => q.to_string(),
            Err(e) => return format_err(e),
        };

        // Options may arrive as a JSON array or as a string-encoded array;
        // anything else is ignored with a log.
        let options: Vec<String> = match params.get("options") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::String(s)) => match serde_json::from_str::<Vec<String>>(s) {
                Ok(list) => list,
                Err(_) => {
                    warn!(options = %s, "invalid options payload, ignoring");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        match ctx
            .frontend
            .ask_user(&ctx.session_id(), &question, &options)
            .await
        {
            Some(answer) if !answer.is_empty() => {
                format_ok(format!("<answer>\n{answer}\n</answer>"))
            }
            // Cancelled or empty: treat like a denial so the loop stops.
            _ => TOOL_DENIED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testutil::context_with_files;
    use serde_json::json;

    #[tokio::test]
    async fn answer_is_wrapped_in_tags() {
        let (_dir, mut ctx, _) = context_with_files(&[]);
        ctx.frontend = std::sync::Arc::new(
            emigo_frontend::ScriptedFrontend::new().with_ask_answer("the second one"),
        );
        let result = AskFollowupQuestionTool
            .execute(&ctx, &json!({"question": "Which file?"}))
            .await;
        assert!(result.contains("<answer>\nthe second one\n</answer>"));
    }

    #[tokio::test]
    async fn cancelled_question_returns_denial_sentinel() {
        let (_dir, ctx, _fe) = context_with_files(&[]);
        let result = AskFollowupQuestionTool
            .execute(&ctx, &json!({"question": "Which file?"}))
            .await;
        assert_eq!(result, TOOL_DENIED);
    }

    #[tokio::test]
    async fn string_encoded_options_are_parsed() {
        let (_dir, mut ctx, _) = context_with_files(&[]);
        let fe = std::sync::Arc::new(
            emigo_frontend::ScriptedFrontend::new().with_ask_answer("a"),
        );
        ctx.frontend = fe.clone();
        AskFollowupQuestionTool
            .execute(
                &ctx,
                &json!({"question": "pick", "options": "[\"a\", \"b\"]"}),
            )
            .await;
        assert!(!fe.calls().is_empty());
    }
}
