// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use emigo_session::to_posix;

use crate::result::{format_err, format_ok};
use crate::tool::{Tool, ToolContext};

/// Generates the repository map via the external indexer and caches it in
/// the session; the map text then appears in every environment details
/// block until invalidated.
pub struct ListRepomapTool;

#[async_trait]
impl Tool for ListRepomapTool {
    fn name(&self) -> &str {
        "list_repomap"
    }

    fn description(&self) -> &str {
        "Generate a ranked summary map of the repository (definitions and \
         references). The map is cached and shown in the environment details \
         of following turns."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, _params: &Value) -> String {
        let Some(repomap) = &ctx.repomap else {
            return format_err("Repository map provider not available.");
        };

        let chat_files = ctx.session.lock().await.chat_files().to_vec();
        debug!(session = %ctx.session_id(), chat_files = chat_files.len(), "generating repomap");

        match repomap.generate(&chat_files).await {
            Ok(map) => {
                let map = if map.is_empty() {
                    "(No map content generated)".to_string()
                } else {
                    map
                };
                let mut session = ctx.session.lock().await;
                session.set_repomap(Some(map));
                format_ok(format!(
                    "Repository map generated for {}.",
                    to_posix(session.root())
                ))
            }
            Err(e) => {
                ctx.session.lock().await.set_repomap(None);
                format_err(format!("Error generating repository map: {e}"))
            }
        }
    }
}
