// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{normalize, Session};

/// Owns every session, keyed by normalized absolute directory path.
///
/// Sessions are created lazily on first reference and never destroyed for
/// the life of the process.  Each session sits behind its own async mutex so
/// per-session mutation is serialized while distinct sessions stay
/// independent.
pub struct SessionStore {
    verbose: bool,
    sessions: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, path: &Path) -> Arc<tokio::sync::Mutex<Session>> {
        let key = normalize(path);
        let mut map = self.sessions.lock().expect("session map poisoned");
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::new(key, self.verbose))))
            .clone()
    }

    /// The session for `path`, if one already exists.
    pub fn get(&self, path: &Path) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        let key = normalize(path);
        self.sessions.lock().expect("session map poisoned").get(&key).cloned()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
