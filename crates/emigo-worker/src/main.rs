// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tokio::io::BufReader;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// The worker owns no threads of its own: one interaction at a time,
/// blocking on stdin between tool calls.  A current-thread runtime makes
/// that explicit.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Stdout carries the protocol; all diagnostics go to stderr where the
    // orchestrator logs them verbatim.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    emigo_worker::run(stdin, stdout).await
}
