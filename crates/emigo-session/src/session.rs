// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use emigo_model::Message;

use crate::listing::{find_src_files, render_tree};
use crate::{normalize, to_posix};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatFileError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Not a regular file: {0}")]
    NotAFile(String),
    #[error("File is outside session directory: {0}")]
    OutsideSession(String),
    #[error("File '{0}' already in context.")]
    AlreadyPresent(String),
    #[error("File '{0}' not found in context.")]
    NotInContext(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    mtime: SystemTime,
    content: String,
}

/// State for one chat session rooted at a project directory.
///
/// The orchestrator owns all sessions exclusively; mutation is serialized by
/// the per-session mutex in [`crate::SessionStore`].
#[derive(Debug)]
pub struct Session {
    root: PathBuf,
    pub verbose: bool,
    history: Vec<(DateTime<Utc>, Message)>,
    chat_files: Vec<String>,
    file_cache: HashMap<String, CacheEntry>,
    last_repomap: Option<String>,
}

impl Session {
    pub fn new(root: PathBuf, verbose: bool) -> Self {
        debug!(root = %root.display(), "initialized session");
        Self {
            root,
            verbose,
            history: Vec::new(),
            chat_files: Vec::new(),
            file_cache: HashMap::new(),
            last_repomap: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── History ───────────────────────────────────────────────────────────────

    pub fn history(&self) -> &[(DateTime<Utc>, Message)] {
        &self.history
    }

    /// Messages only, cloned; the snapshot shipped to the worker.
    pub fn history_snapshot(&self) -> Vec<Message> {
        self.history.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn append_message(&mut self, msg: Message) {
        self.history.push((Utc::now(), msg));
    }

    /// Replace the history wholesale, stamping every entry with the current
    /// time.  Used after a finished interaction and for edit-and-resubmit.
    pub fn replace_history(&mut self, msgs: Vec<Message>) {
        let now = Utc::now();
        self.history = msgs.into_iter().map(|m| (now, m)).collect();
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Drop the trailing user message, if any.  Called on cancellation so a
    /// killed interaction leaves no dangling prompt behind.
    pub fn pop_trailing_user_message(&mut self) -> Option<Message> {
        if matches!(self.history.last(), Some((_, Message::User { .. }))) {
            self.history.pop().map(|(_, m)| m)
        } else {
            None
        }
    }

    // ── Chat files ────────────────────────────────────────────────────────────

    pub fn chat_files(&self) -> &[String] {
        &self.chat_files
    }

    /// Resolve `file` (absolute or session-relative) to a relative POSIX
    /// path inside the session, or the appropriate error.
    pub fn resolve_rel(&self, file: &str) -> Result<String, ChatFileError> {
        let p = Path::new(file);
        let abs = if p.is_absolute() {
            normalize(p)
        } else {
            normalize(&self.root.join(p))
        };
        match abs.strip_prefix(&self.root) {
            Ok(rel) => Ok(to_posix(rel)),
            Err(_) => Err(ChatFileError::OutsideSession(file.to_string())),
        }
    }

    pub fn add_chat_file(&mut self, file: &str) -> Result<String, ChatFileError> {
        let rel = self.resolve_rel(file)?;
        let abs = self.root.join(&rel);
        if !abs.exists() {
            return Err(ChatFileError::NotFound(rel));
        }
        if !abs.is_file() {
            return Err(ChatFileError::NotAFile(rel));
        }
        if self.chat_files.contains(&rel) {
            return Err(ChatFileError::AlreadyPresent(rel));
        }
        self.chat_files.push(rel.clone());
        self.update_cache(&rel, None);
        Ok(rel)
    }

    /// Remove a file from context and evict its cache entry.
    pub fn remove_chat_file(&mut self, file: &str) -> Result<String, ChatFileError> {
        let rel = self.resolve_rel(file)?;
        match self.chat_files.iter().position(|f| f == &rel) {
            Some(pos) => {
                self.chat_files.remove(pos);
                self.file_cache.remove(&rel);
                Ok(rel)
            }
            None => Err(ChatFileError::NotInContext(rel)),
        }
    }

    // ── File cache ────────────────────────────────────────────────────────────

    /// Refresh and return the cached content for `rel`, or `None` when the
    /// file cannot be read.
    pub fn cached_content(&mut self, rel: &str) -> Option<String> {
        if self.update_cache(rel, None) {
            self.file_cache.get(rel).map(|e| e.content.clone())
        } else {
            None
        }
    }

    /// Update the cache entry for `rel`.
    ///
    /// With supplied `content` (e.g. after a write or replace), the content
    /// is stored unconditionally under the current mtime.  Without it, the
    /// file is re-read only when the mtime changed or no entry exists.
    /// Returns `false`, evicting any stale entry, when the file is gone
    /// or unreadable.
    pub fn update_cache(&mut self, rel: &str, content: Option<String>) -> bool {
        let abs = self.root.join(rel);
        let mtime = match fs::metadata(&abs).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => {
                self.file_cache.remove(rel);
                return false;
            }
        };

        let content = match content {
            Some(c) => c,
            None => {
                if let Some(entry) = self.file_cache.get(rel) {
                    if entry.mtime == mtime {
                        return true;
                    }
                }
                if self.verbose {
                    debug!(file = rel, "cache miss or stale, reading file");
                }
                match fs::read(&abs) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(e) => {
                        warn!(file = rel, error = %e, "failed to read file into cache");
                        self.file_cache.remove(rel);
                        return false;
                    }
                }
            }
        };

        self.file_cache.insert(rel.to_string(), CacheEntry { mtime, content });
        true
    }

    /// Invalidate one file cache entry, or with `None` every entry
    /// plus the cached repository map.
    pub fn invalidate_cache(&mut self, rel: Option<&str>) {
        match rel {
            Some(rel) => {
                self.file_cache.remove(rel);
            }
            None => {
                self.file_cache.clear();
                self.last_repomap = None;
            }
        }
    }

    // ── Repository map ────────────────────────────────────────────────────────

    pub fn set_repomap(&mut self, map: Option<String>) {
        self.last_repomap = map;
    }

    pub fn last_repomap(&self) -> Option<&str> {
        self.last_repomap.as_deref()
    }

    // ── Environment details ───────────────────────────────────────────────────

    /// The context block injected into LLM prompts by the worker.  Never
    /// persisted in history.
    pub fn render_environment_details(&mut self) -> String {
        let mut details = String::from("<environment_details>\n");
        details.push_str("# Session Directory\n");
        details.push_str(&to_posix(&self.root));
        details.push_str("\n\n");

        if let Some(map) = &self.last_repomap {
            details.push_str("# Repository Map (Cached)\n");
            details.push_str(&format!("```\n{map}\n```\n\n"));
        } else {
            details.push_str("# File/Directory Structure (use list_repomap tool for code summary)\n");
            let tree = render_tree(&find_src_files(&self.root));
            if tree.is_empty() {
                details.push_str("(No relevant files or directories found)\n\n");
            } else {
                details.push_str(&format!("```\n{}\n```\n\n", tree.join("\n")));
            }
        }

        details.push_str("# Files Currently in Chat Context\n");
        // Evict cache entries for files that left the context.
        let in_context: Vec<String> = self.chat_files.clone();
        self.file_cache.retain(|k, _| in_context.contains(k));

        if self.chat_files.is_empty() {
            details.push_str("(No files in chat context)\n\n");
        } else {
            let mut sorted = self.chat_files.clone();
            sorted.sort();
            for rel in sorted {
                match self.cached_content(&rel) {
                    Some(content) => {
                        details.push_str(&format!("## File: {rel}\n```\n{content}\n```\n\n"));
                    }
                    None => {
                        details.push_str(&format!(
                            "## File: {rel}\n# Error: Could not read or cache {rel}\n\n"
                        ));
                    }
                }
            }
        }

        details.push_str("</environment_details>");
        details
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
