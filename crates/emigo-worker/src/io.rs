// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::bail;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tracing::warn;

use emigo_protocol::{decode_line, write_message, StreamRole, WorkerEvent, WorkerRequest};

/// The worker's half of the stdio protocol.
///
/// Reading is strictly sequential: between turns the worker blocks here
/// waiting for exactly one correlated response, which is what makes the
/// whole process single-threaded cooperative.
pub struct WorkerIo<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> WorkerIo<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read one line; `None` on EOF.
    pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        Ok(if n == 0 { None } else { Some(line) })
    }

    pub async fn send(&mut self, event: &WorkerEvent) -> anyhow::Result<()> {
        write_message(&mut self.writer, event).await
    }

    /// Emit a `stream` event.
    pub async fn stream(
        &mut self,
        session: &str,
        role: StreamRole,
        content: impl Into<String>,
        tool_id: Option<String>,
        tool_name: Option<String>,
    ) -> anyhow::Result<()> {
        self.send(&WorkerEvent::Stream {
            session: session.to_string(),
            role,
            content: content.into(),
            tool_id,
            tool_name,
        })
        .await
    }

    /// Block until the `tool_result` matching `request_id` arrives.
    ///
    /// Unparseable lines are reported and skipped; responses with a foreign
    /// request id are stale (a cancelled predecessor's) and dropped.  EOF is
    /// fatal; the orchestrator is gone.
    pub async fn wait_for_tool_result(
        &mut self,
        session: &str,
        request_id: &str,
    ) -> anyhow::Result<String> {
        loop {
            let Some(line) = self.read_line().await? else {
                bail!("stdin closed while waiting for tool result");
            };
            match decode_line::<WorkerRequest>(&line) {
                Ok(WorkerRequest::ToolResult { request_id: rid, result }) if rid == request_id => {
                    return Ok(result);
                }
                Ok(other) => {
                    warn!(?other, "ignoring unrelated message while waiting for tool result");
                }
                Err(e) => {
                    self.send(&WorkerEvent::Error {
                        session: session.to_string(),
                        message: format!(
                            "Worker received invalid JSON from stdin: {} ({e})",
                            line.trim()
                        ),
                    })
                    .await?;
                }
            }
        }
    }

    /// Block until the environment-details response matching `request_id`
    /// arrives.
    pub async fn wait_for_env_details(
        &mut self,
        session: &str,
        request_id: &str,
    ) -> anyhow::Result<String> {
        loop {
            let Some(line) = self.read_line().await? else {
                bail!("stdin closed while waiting for environment details");
            };
            match decode_line::<WorkerRequest>(&line) {
                Ok(WorkerRequest::GetEnvironmentDetailsResponse {
                    request_id: rid,
                    details,
                    ..
                }) if rid == request_id => {
                    return Ok(details);
                }
                Ok(other) => {
                    warn!(?other, "ignoring unrelated message while waiting for env details");
                }
                Err(e) => {
                    self.send(&WorkerEvent::Error {
                        session: session.to_string(),
                        message: format!(
                            "Worker received invalid JSON from stdin: {} ({e})",
                            line.trim()
                        ),
                    })
                    .await?;
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
