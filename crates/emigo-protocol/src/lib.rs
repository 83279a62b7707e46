// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod framing;
mod messages;

pub use framing::{decode_line, write_message};
pub use messages::{
    FinishStatus, InteractionInput, StreamRole, WorkerEvent, WorkerRequest,
};
