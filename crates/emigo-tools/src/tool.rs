// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use emigo_frontend::Frontend;
use emigo_session::{to_posix, Session};

use crate::policy::ApprovalPolicy;
use crate::repomap::RepoMapProvider;

/// Everything a tool invocation may touch: the owning session, the editor
/// frontend, and the optional repository-map indexer.
#[derive(Clone)]
pub struct ToolContext {
    pub session: Arc<Mutex<Session>>,
    pub frontend: Arc<dyn Frontend>,
    pub repomap: Option<Arc<dyn RepoMapProvider>>,
    /// Normalized session directory; doubles as the session id on the wire.
    pub session_path: PathBuf,
}

impl ToolContext {
    pub fn session_id(&self) -> String {
        to_posix(&self.session_path)
    }
}

/// Trait implemented by every builtin tool.
///
/// `execute` returns the formatted result string that travels back to the
/// worker verbatim: success text, an error with the standard prefix, or
/// one of the sentinels.  Tools never panic on bad parameters; they return
/// an error string the model can act on.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    /// Whether this tool needs user approval before running.
    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }
    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String;
}

/// Fetch a required string parameter, or the standard error message.
pub(crate) fn require_str<'a>(params: &'a Value, key: &str, tool: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter '{key}' for {tool}"))
}

/// Fetch an optional boolean parameter; string forms "true"/"false" are
/// accepted because some models stringify all argument values.
pub(crate) fn optional_bool(params: &Value, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
