// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic turn loop.

use std::collections::BTreeMap;

use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, warn};
use uuid::Uuid;

use emigo_config::AgentConfig;
use emigo_model::{
    CompletionRequest, Message, ModelProvider, ResponseEvent, ToolCallRecord, ToolSchema,
};
use emigo_protocol::{FinishStatus, InteractionInput, StreamRole, WorkerEvent};
use emigo_tools::{COMPLETION_SIGNALLED, TOOL_DENIED, TOOL_ERROR_PREFIX};

use crate::io::WorkerIo;
use crate::prompt::{build_system_prompt, prepare_messages};

/// One tool call under assembly, keyed by the provider's stream index.
#[derive(Default)]
struct Fragment {
    id: String,
    name: String,
    arguments: String,
    /// Whether the `tool_json` start marker has been emitted.
    announced: bool,
}

enum TurnOutcome {
    /// Stream completed; text and assembled fragments.
    Completed(String, BTreeMap<u32, Fragment>),
    /// Stream failed mid-way; the formatted error marker text.
    LlmError(String),
}

/// Run one interaction to completion, emitting events on `io`.
///
/// Only transport failures (broken stdio) return `Err`; everything else is
/// reported through `finished` with the appropriate status.
pub async fn run_interaction<R, W>(
    provider: &dyn ModelProvider,
    cfg: &AgentConfig,
    input: InteractionInput,
    io: &mut WorkerIo<R, W>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = input.session_path.clone();
    match drive(provider, cfg, input, io).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Report the failure; if even that fails the pipe is dead and
            // the orchestrator will see our exit instead.
            io.stream(
                &session,
                StreamRole::Error,
                format!("[Agent Critical Error: {e:#}]"),
                None,
                None,
            )
            .await?;
            io.send(&WorkerEvent::Finished {
                session,
                status: FinishStatus::CriticalError,
                message: format!("Critical error in agent interaction loop: {e:#}"),
                final_history: None,
            })
            .await
        }
    }
}

async fn drive<R, W>(
    provider: &dyn ModelProvider,
    cfg: &AgentConfig,
    input: InteractionInput,
    io: &mut WorkerIo<R, W>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = input.session_path.clone();
    let tool_schemas = model_tool_schemas();
    let system_prompt = build_system_prompt(&session, &tool_schemas);

    let mut history: Vec<Message> = input.history.clone();
    let mut env_details = input.environment_details.clone();

    let mut status = FinishStatus::MaxTurnsReached;
    let mut turns_taken = cfg.max_turns;

    'turns: for turn in 0..cfg.max_turns {
        debug!(turn = turn + 1, max = cfg.max_turns, "agent turn");

        // PROMPT_BUILD
        let messages = prepare_messages(&system_prompt, &history, &env_details, cfg);
        let request = CompletionRequest {
            messages,
            tools: tool_schemas.clone(),
            stream: true,
        };

        // LLM_STREAM
        let outcome = stream_one_turn(provider, request, &session, io).await?;
        let (full_text, fragments) = match outcome {
            TurnOutcome::Completed(text, fragments) => (text, fragments),
            TurnOutcome::LlmError(marker) => {
                history.push(Message::assistant(marker));
                status = FinishStatus::LlmError;
                turns_taken = turn + 1;
                break 'turns;
            }
        };

        // TOOL_EXTRACT
        let had_fragments = !fragments.is_empty();
        let tool_calls = extract_tool_calls(fragments);
        let content = (!full_text.is_empty()).then_some(full_text);
        if content.is_none() && tool_calls.is_empty() && !had_fragments {
            history.push(Message::assistant(""));
        } else {
            history.push(Message::assistant_with_tools(
                content,
                tool_calls.iter().map(|(record, _)| record.clone()).collect(),
            ));
        }

        if tool_calls.is_empty() {
            status = FinishStatus::Success;
            turns_taken = turn + 1;
            break 'turns;
        }

        // TOOL_EXECUTE
        let mut end_interaction = false;
        for (i, (record, params)) in tool_calls.iter().enumerate() {
            let request_id = format!("tool_{}", Uuid::new_v4().simple());
            io.send(&WorkerEvent::ToolRequest {
                session: session.clone(),
                request_id: request_id.clone(),
                tool_name: record.function.name.clone(),
                parameters: params.clone(),
            })
            .await?;
            let result = io.wait_for_tool_result(&session, &request_id).await?;

            let terminal = result == COMPLETION_SIGNALLED
                || result == TOOL_DENIED
                || result.starts_with(TOOL_ERROR_PREFIX);
            history.push(Message::tool_result(
                record.id.clone(),
                record.function.name.clone(),
                result,
            ));
            if terminal {
                debug!(tool = %record.function.name, "terminal tool result, ending interaction");
                // Every recorded tool call must have a matching result
                // message, or the history is rejected by providers on a
                // later resubmit.  Calls after the terminal one were never
                // dispatched; say so.
                for (skipped, _) in &tool_calls[i + 1..] {
                    history.push(Message::tool_result(
                        skipped.id.clone(),
                        skipped.function.name.clone(),
                        "Tool call was not executed because the interaction ended.",
                    ));
                }
                end_interaction = true;
                break;
            }
        }
        if end_interaction {
            status = FinishStatus::Success;
            turns_taken = turn + 1;
            break 'turns;
        }

        // ENV_REFRESH
        let request_id = format!("env_{}", Uuid::new_v4().simple());
        io.send(&WorkerEvent::GetEnvironmentDetailsRequest {
            session: session.clone(),
            request_id: request_id.clone(),
        })
        .await?;
        env_details = io.wait_for_env_details(&session, &request_id).await?;
    }

    let final_history = status.accepts_history().then_some(history);
    io.send(&WorkerEvent::Finished {
        session,
        status,
        message: format!("Interaction ended after {turns_taken} turns."),
        final_history,
    })
    .await
}

/// Schemas for every tool the orchestrator can execute, in the model crate's
/// shape.
fn model_tool_schemas() -> Vec<ToolSchema> {
    emigo_tools::default_registry()
        .schemas()
        .into_iter()
        .map(|s| ToolSchema {
            name: s.name,
            description: s.description,
            parameters: s.parameters,
        })
        .collect()
}

/// Consume one LLM stream: forward text deltas, assemble tool-call
/// fragments, and emit the `tool_json` / `tool_json_args` / `tool_json_end`
/// marker protocol.
async fn stream_one_turn<R, W>(
    provider: &dyn ModelProvider,
    request: CompletionRequest,
    session: &str,
    io: &mut WorkerIo<R, W>,
) -> anyhow::Result<TurnOutcome>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stream = match provider.complete(request).await {
        Ok(s) => s,
        Err(e) => {
            let marker = format!("[Error during LLM communication: {e:#}]");
            io.stream(session, StreamRole::Error, marker.clone(), None, None).await?;
            return Ok(TurnOutcome::LlmError(marker));
        }
    };

    let mut full_text = String::new();
    let mut fragments: BTreeMap<u32, Fragment> = BTreeMap::new();

    while let Some(event) = stream.next().await {
        match event {
            Ok(ResponseEvent::TextDelta(delta)) => {
                if delta.is_empty() {
                    continue;
                }
                full_text.push_str(&delta);
                io.stream(session, StreamRole::Llm, delta, None, None).await?;
            }
            Ok(ResponseEvent::ToolCall { index, id, name, arguments }) => {
                let f = fragments.entry(index).or_default();
                if !id.is_empty() {
                    f.id = id;
                }
                if !name.is_empty() {
                    f.name = name;
                }
                if !f.announced && !f.id.is_empty() && !f.name.is_empty() {
                    f.announced = true;
                    let (tool_id, tool_name) = (f.id.clone(), f.name.clone());
                    io.stream(session, StreamRole::ToolJson, "", Some(tool_id), Some(tool_name))
                        .await?;
                }
                if !arguments.is_empty() {
                    f.arguments.push_str(&arguments);
                    let tool_id = f.id.clone();
                    io.stream(session, StreamRole::ToolJsonArgs, arguments, Some(tool_id), None)
                        .await?;
                }
            }
            Ok(ResponseEvent::Done) => break,
            Err(e) => {
                let marker = format!("[Error during LLM communication: {e:#}]");
                io.stream(session, StreamRole::Error, marker.clone(), None, None).await?;
                return Ok(TurnOutcome::LlmError(marker));
            }
        }
    }

    // Close every announced tool call, in index order.
    let announced: Vec<(String, String)> = fragments
        .values()
        .filter(|f| f.announced)
        .map(|f| (f.id.clone(), f.name.clone()))
        .collect();
    for (tool_id, tool_name) in announced {
        io.stream(session, StreamRole::ToolJsonEnd, "", Some(tool_id), Some(tool_name))
            .await?;
    }

    Ok(TurnOutcome::Completed(full_text, fragments))
}

/// Turn completed fragments into structured tool calls.
///
/// Empty argument text is an empty parameter object; malformed JSON or a
/// non-object payload skips that call (the rest are still attempted).
fn extract_tool_calls(fragments: BTreeMap<u32, Fragment>) -> Vec<(ToolCallRecord, Value)> {
    let mut calls = Vec::new();
    for (index, f) in fragments {
        if f.name.is_empty() {
            warn!(index, "dropping tool call with empty name");
            continue;
        }
        let args_text = if f.arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            f.arguments
        };
        let params: Value = match serde_json::from_str(&args_text) {
            Ok(v @ Value::Object(_)) => v,
            Ok(other) => {
                warn!(index, tool = %f.name, ?other, "tool arguments are not a JSON object; skipping");
                continue;
            }
            Err(e) => {
                warn!(index, tool = %f.name, error = %e, "invalid JSON tool arguments; skipping");
                continue;
            }
        };
        let id = if f.id.is_empty() {
            format!("tc_synthetic_{index}")
        } else {
            f.id
        };
        calls.push((ToolCallRecord::new(id, f.name, args_text), params));
    }
    calls
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
