// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared ignore rules for directory listings.
//!
//! The fallback environment listing and the repository-map indexer must
//! agree on what counts as project content, so the rules live here rather
//! than in either consumer.

/// Directory names that are never descended into.
const IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    ".env",
    "env",
    "build",
    "dist",
    "vendor",
    "target",
];

/// File extensions (lowercase, with dot) treated as binary / non-source.
const BINARY_EXTS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".ico", ".svg",
    ".mp3", ".mp4", ".mov", ".avi", ".mkv", ".wav",
    ".zip", ".tar", ".gz", ".bz2", ".7z", ".rar",
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".o", ".a", ".so", ".dll", ".dylib", ".exe", ".bin",
    ".pyc", ".pyo", ".class", ".jar", ".lock",
];

/// True when a directory with this name should be skipped entirely.
/// Hidden directories are skipped regardless of the explicit list.
pub fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('.') || IGNORED_DIRS.contains(&name)
}

/// True when a file name carries a binary extension or is hidden.
pub fn is_binary_extension(name: &str) -> bool {
    if name.starts_with('.') {
        return true;
    }
    match name.rfind('.') {
        Some(pos) => {
            let ext = name[pos..].to_ascii_lowercase();
            BINARY_EXTS.contains(&ext.as_str())
        }
        None => false,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
