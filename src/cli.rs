// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// The emigo backend: an AI coding agent serving an editor frontend over
/// stdio.  The editor spawns this process and speaks line-delimited JSON on
/// both pipes; diagnostics go to stderr.
#[derive(Debug, Parser)]
#[command(name = "emigo", version, about)]
pub struct Cli {
    /// Model name forwarded to the provider (use "mock" for a no-network
    /// echo model).
    #[arg(long, env = "EMIGO_MODEL")]
    pub model: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "EMIGO_BASE_URL")]
    pub base_url: Option<String>,

    /// API key; prefer the environment variable over the flag.
    #[arg(long, env = "EMIGO_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Extra HTTP header sent on every model request, as "Name: value".
    /// May be repeated.
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Path to the worker binary (default: emigo-worker next to this
    /// executable, or $EMIGO_WORKER_PATH).
    #[arg(long)]
    pub worker: Option<PathBuf>,

    /// Verbose diagnostics on stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
        None => Err(format!("invalid header '{s}', expected 'Name: value'")),
    }
}
