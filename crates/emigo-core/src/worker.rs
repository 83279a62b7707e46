// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Worker subprocess handle.
//!
//! The worker is a child process rather than a task: LLM clients can hang
//! indefinitely, and killing the process is the only cancellation that
//! always works.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWrite;
use tokio::process::{Child, Command};

use emigo_protocol::{write_message, WorkerRequest};

pub(crate) struct WorkerHandle {
    /// Generation stamp; events from earlier generations are stale.
    pub generation: u64,
    child: Option<Child>,
    stdin: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl WorkerHandle {
    /// Spawn the worker binary with piped stdio.  The caller wires up the
    /// stdout/stderr reader tasks from the returned pipes.
    pub fn spawn(
        program: &PathBuf,
        generation: u64,
    ) -> anyhow::Result<(Self, tokio::process::ChildStdout, tokio::process::ChildStderr)> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning worker {}", program.display()))?;

        let stdin = child.stdin.take().context("worker stdin unavailable")?;
        let stdout = child.stdout.take().context("worker stdout unavailable")?;
        let stderr = child.stderr.take().context("worker stderr unavailable")?;

        Ok((
            Self {
                generation,
                child: Some(child),
                stdin: Some(Box::new(stdin)),
            },
            stdout,
            stderr,
        ))
    }

    /// Test-only handle that writes into an arbitrary sink and owns no
    /// process.
    #[cfg(test)]
    pub fn detached(generation: u64, sink: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            generation,
            child: None,
            stdin: Some(sink),
        }
    }

    pub async fn send(&mut self, req: &WorkerRequest) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().context("worker stdin closed")?;
        write_message(stdin, req).await
    }

    /// Immediate termination, for cancellation.
    pub async fn kill(mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    /// Graceful shutdown: close stdin so the worker exits its read loop,
    /// wait briefly, then kill.
    pub async fn shutdown(mut self, grace: Duration) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            if tokio::time::timeout(grace, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
