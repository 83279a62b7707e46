// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write one message as a single JSON line and flush.
///
/// Flushing after every message matters: the peer blocks on complete lines,
/// and a buffered half-line would deadlock both processes.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(msg).context("serializing protocol message")?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("writing protocol message")?;
    writer.flush().await.context("flushing protocol message")?;
    Ok(())
}

/// Parse one received line.  Callers skip lines that fail to parse (logging
/// them) rather than aborting the stream.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
