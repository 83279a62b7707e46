// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;
mod rpc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use emigo_config::ModelConfig;
use emigo_core::{Orchestrator, OrchestratorConfig};
use rpc::StdioFrontend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Stdout belongs to the editor protocol; logging must stay on stderr.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = OrchestratorConfig {
        model: ModelConfig {
            model: cli.model,
            base_url: cli.base_url,
            api_key: cli.api_key,
            extra_headers: cli.headers,
            verbose: cli.verbose,
        },
        verbose: cli.verbose,
        worker_program: cli.worker,
    };

    let frontend = StdioFrontend::new(Box::new(tokio::io::stdout()));
    let orch = Orchestrator::new(config, frontend.clone(), None);

    let result = rpc::serve(orch.clone(), frontend).await;

    // Editor went away; take the worker down with us.
    orch.shutdown().await;
    result
}
