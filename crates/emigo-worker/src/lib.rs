// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The LLM worker: one agentic turn loop per `interaction_request`.
//!
//! Runs as a child process of the orchestrator, which is the only party it
//! ever talks to, via line-delimited JSON on stdin/stdout.  Heavy LLM client
//! machinery stays in this process so the orchestrator can cancel an
//! interaction by killing it.

mod interaction;
mod io;
mod prompt;

pub use interaction::run_interaction;
pub use io::WorkerIo;
pub use prompt::{build_system_prompt, prepare_messages, truncate_history};

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::warn;

use emigo_config::AgentConfig;
use emigo_protocol::{decode_line, WorkerEvent, WorkerRequest};

/// Main worker loop: read requests from `reader` until EOF.
///
/// Invalid JSON lines are reported and skipped; the loop only ends when the
/// orchestrator closes our stdin.
pub async fn run<R, W>(reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut io = WorkerIo::new(reader, writer);
    let agent_cfg = AgentConfig::default();

    loop {
        let Some(line) = io.read_line().await? else {
            // Stdin closed: the orchestrator is shutting us down.
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_line::<WorkerRequest>(&line) {
            Ok(WorkerRequest::InteractionRequest { data }) => {
                let session = data.session_path.clone();
                let provider = match emigo_model::from_config(&data.config) {
                    Ok(p) => p,
                    Err(e) => {
                        io.send(&WorkerEvent::Error {
                            session,
                            message: format!("Failed to build LLM client: {e:#}"),
                        })
                        .await?;
                        continue;
                    }
                };
                if let Err(e) = run_interaction(provider.as_ref(), &agent_cfg, data, &mut io).await
                {
                    // A transport failure here means the orchestrator side is
                    // gone; nothing useful remains to do.
                    return Err(e).context("interaction transport failure");
                }
            }
            Ok(WorkerRequest::Ping) => {
                io.send(&WorkerEvent::Pong).await?;
            }
            Ok(other) => {
                // A stale tool_result or env response outside an interaction.
                warn!(?other, "dropping correlated response with no waiter");
            }
            Err(e) => {
                io.send(&WorkerEvent::Error {
                    session: "unknown".into(),
                    message: format!("Worker received invalid JSON: {} ({e})", line.trim()),
                })
                .await?;
            }
        }
    }
}
