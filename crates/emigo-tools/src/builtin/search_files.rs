// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use emigo_config::{is_binary_extension, is_ignored_dir};
use emigo_session::to_posix;

use crate::result::{format_err, format_ok};
use crate::tool::{optional_bool, require_str, Tool, ToolContext};

const DEFAULT_MAX_MATCHES: usize = 50;
const MAX_MATCHES_CAP: usize = 200;

pub struct SearchFilesTool;

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression. Returns file, line \
         number and the matching line for every hit, up to max_matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Session-relative directory to search (default: session root)"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Match case exactly (default: false)"
                },
                "max_matches": {
                    "type": "integer",
                    "description": "Result limit (default 50, capped at 200)"
                }
            },
            "required": ["pattern"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let pattern = match require_str(params, "pattern", self.name()) {
            Ok(p) => p.to_string(),
            Err(e) => return format_err(e),
        };
        let rel_path = params
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let case_sensitive = optional_bool(params, "case_sensitive");
        let max_matches = params
            .get("max_matches")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_MATCHES)
            .min(MAX_MATCHES_CAP);

        let regex = match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(r) => r,
            Err(e) => return format_err(format!("Invalid pattern: {e}")),
        };

        let session = ctx.session.lock().await;
        let rel = match session.resolve_rel(&rel_path) {
            Ok(r) => r,
            Err(e) => return format_err(e.to_string()),
        };
        let abs = session.root().join(&rel);
        if !abs.exists() {
            return format_err(format!("Path not found: {rel_path}"));
        }

        let mut matches: Vec<String> = Vec::new();
        'outer: for entry in WalkDir::new(&abs)
            .into_iter()
            // Depth 0 is the search root itself; never filter it.
            .filter_entry(|e| {
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                if e.file_type().is_dir() {
                    !is_ignored_dir(&name)
                } else {
                    !is_binary_extension(&name)
                }
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let text = String::from_utf8_lossy(&bytes);
            let rel_file = entry
                .path()
                .strip_prefix(session.root())
                .map(to_posix)
                .unwrap_or_else(|_| entry.path().display().to_string());
            for (lineno, line) in text.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(format!("{rel_file}:{}\n  {}", lineno + 1, line.trim()));
                    if matches.len() >= max_matches {
                        break 'outer;
                    }
                }
            }
        }

        if matches.is_empty() {
            return format_ok(format!(
                "No matches found for pattern: {pattern} in '{rel_path}'"
            ));
        }

        let mut result = format!(
            "Found {} matches for pattern '{pattern}' in '{rel_path}':\n\n{}",
            matches.len(),
            matches.join("\n")
        );
        if matches.len() == max_matches {
            result.push_str(&format!(
                "\n\n[Note: Results truncated to first {max_matches} matches]"
            ));
        }
        format_ok(result)
    }
}
