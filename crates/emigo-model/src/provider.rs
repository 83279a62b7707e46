// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, ResponseEvent};

pub type ResponseStream = Pin<Box<dyn Stream<Item = anyhow::Result<ResponseEvent>> + Send>>;

/// Provider-agnostic completion capability.
///
/// An `Err` item inside the returned stream is a hard stream failure: the
/// caller must stop consuming and treat the turn as failed.  Recoverable
/// conditions never surface as `Err`; drivers skip or log them instead.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Driver name for diagnostics.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Send a completion request and return a streaming response.
    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream>;
}
