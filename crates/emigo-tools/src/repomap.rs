// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

/// The external repository-map indexer, consumed by `list_repomap`.
///
/// The real implementation (tag extraction, ranking, token-aware pruning)
/// lives outside this codebase; the session only caches the text it
/// produces.
#[async_trait]
pub trait RepoMapProvider: Send + Sync {
    /// Generate a map for the session, biased toward `chat_files`.
    async fn generate(&self, chat_files: &[String]) -> anyhow::Result<String>;
}
