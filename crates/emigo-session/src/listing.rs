// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Fallback recursive listing used when no repository map has been cached.

use std::collections::HashSet;
use std::path::Path;

use walkdir::WalkDir;

use emigo_config::{is_binary_extension, is_ignored_dir};

/// Collect project-relative POSIX paths of all listable files under `root`,
/// sorted, applying the same ignore rules as the repository-map indexer.
pub fn find_src_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        // The root itself is exempt: filtering it would prune the whole
        // walk (and project directories may legitimately be hidden).
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
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| crate::to_posix(p))
        })
        .collect();
    files.sort();
    files
}

/// Build an indented tree rendering from sorted relative paths.  Each
/// directory appears once, before its contents.
pub fn render_tree(rel_files: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut seen_dirs: HashSet<String> = HashSet::new();
    for rel in rel_files {
        let parts: Vec<&str> = rel.split('/').collect();
        let mut prefix = String::new();
        for (depth, part) in parts[..parts.len() - 1].iter().enumerate() {
            prefix.push_str(part);
            prefix.push('/');
            if seen_dirs.insert(prefix.clone()) {
                lines.push(format!("{}- {}/", "  ".repeat(depth), part));
            }
        }
        let depth = parts.len() - 1;
        lines.push(format!("{}- {}", "  ".repeat(depth), parts[depth]));
    }
    lines
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
