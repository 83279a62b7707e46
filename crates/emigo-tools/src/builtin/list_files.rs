// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use emigo_config::{is_binary_extension, is_ignored_dir};
use emigo_session::to_posix;

use crate::result::{format_err, format_ok};
use crate::tool::{optional_bool, Tool, ToolContext};

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory. Set recursive=true to descend into \
         subdirectories (ignored directories such as .git and node_modules \
         are skipped)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Session-relative directory (default: session root)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Whether to list recursively (default: false)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, ctx: &ToolContext, params: &Value) -> String {
        let rel_path = params
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        let recursive = optional_bool(params, "recursive");

        let session = ctx.session.lock().await;
        let rel = match session.resolve_rel(&rel_path) {
            Ok(r) => r,
            Err(e) => return format_err(e.to_string()),
        };
        let abs = session.root().join(&rel);
        if !abs.is_dir() {
            return format_err(format!("Path is not a directory: {rel_path}"));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files: Vec<String> = WalkDir::new(&abs)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            // Depth 0 is the listed directory itself; never filter it.
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
            .filter_map(|e| e.path().strip_prefix(session.root()).ok().map(to_posix))
            .collect();
        files.sort();

        let listing = files
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        format_ok(format!(
            "Files in '{rel_path}' ({}):\n{listing}",
            if recursive { "recursive" } else { "non-recursive" }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testutil::context_with_files;
    use serde_json::json;

    #[tokio::test]
    async fn non_recursive_lists_only_top_level() {
        let (_dir, ctx, _fe) = context_with_files(&[("a.txt", "x"), ("sub/b.txt", "y")]);
        let result = ListFilesTool.execute(&ctx, &json!({})).await;
        assert!(result.contains("- a.txt"));
        assert!(!result.contains("b.txt"));
    }

    #[tokio::test]
    async fn recursive_descends_and_sorts() {
        let (_dir, ctx, _fe) = context_with_files(&[("z.txt", "x"), ("sub/a.txt", "y")]);
        let result = ListFilesTool
            .execute(&ctx, &json!({"recursive": true}))
            .await;
        assert!(result.contains("- sub/a.txt"));
        assert!(result.contains("- z.txt"));
        assert!(result.find("sub/a.txt").unwrap() < result.find("z.txt").unwrap());
    }

    #[tokio::test]
    async fn non_directory_path_is_an_error() {
        let (_dir, ctx, _fe) = context_with_files(&[("a.txt", "x")]);
        let result = ListFilesTool.execute(&ctx, &json!({"path": "a.txt"})).await;
        assert!(result.starts_with(crate::TOOL_ERROR_PREFIX));
        assert!(result.contains("not a directory"));
    }
}
