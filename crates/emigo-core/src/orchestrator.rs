// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Process-wide orchestrator: owns every session, supervises the worker
//! subprocess, routes its events, and serves the editor frontend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use emigo_config::ModelConfig;
use emigo_frontend::Frontend;
use emigo_model::Message;
use emigo_protocol::{decode_line, InteractionInput, StreamRole, WorkerEvent, WorkerRequest};
use emigo_session::{normalize, to_posix, ChatFileError, SessionStore};
use emigo_tools::{
    default_registry, format_err, ApprovalPolicy, RepoMapProvider, ToolContext, ToolRegistry,
    COMPLETION_SIGNALLED, TOOL_DENIED,
};

use crate::filter::{extract_mentions, filter_history, strip_environment_details};
use crate::worker::WorkerHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct OrchestratorConfig {
    pub model: ModelConfig,
    pub verbose: bool,
    /// Worker binary override.  Defaults to `$EMIGO_WORKER_PATH`, then the
    /// `emigo-worker` binary next to the running executable.
    pub worker_program: Option<PathBuf>,
}

#[derive(Debug)]
struct PendingToolRequest {
    session: String,
    tool_name: String,
}

#[derive(Default)]
struct InteractionState {
    /// The session currently owning the worker, if any.
    active_session: Option<PathBuf>,
    /// Tool requests awaiting a reply, keyed by the worker's request id.
    pending_tool_requests: HashMap<String, PendingToolRequest>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: SessionStore,
    frontend: Arc<dyn Frontend>,
    tools: Arc<ToolRegistry>,
    repomap: Option<Arc<dyn RepoMapProvider>>,
    state: Mutex<InteractionState>,
    worker: Mutex<Option<WorkerHandle>>,
    /// Bumped on every worker spawn AND every kill.  An event whose
    /// generation no longer matches is stale and is discarded: the tokio
    /// rendition of draining a dead worker's output queue.
    live_generation: AtomicU64,
    /// Self-reference handed to the worker router task.
    this: Weak<Orchestrator>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        frontend: Arc<dyn Frontend>,
        repomap: Option<Arc<dyn RepoMapProvider>>,
    ) -> Arc<Self> {
        let verbose = config.verbose;
        Arc::new_cyclic(|this| Self {
            config,
            store: SessionStore::new(verbose),
            frontend,
            tools: Arc::new(default_registry()),
            repomap,
            state: Mutex::new(InteractionState::default()),
            worker: Mutex::new(None),
            live_generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    // ── Frontend operations ───────────────────────────────────────────────────

    /// Submit a user prompt for a session.  Refused while this session has
    /// an interaction in flight; a conflict with a *different* session asks
    /// the user whether to cancel it first.
    pub async fn submit_prompt(&self, session_dir: &Path, prompt: &str) {
        let session_key = normalize(session_dir);
        if !self.claim_interaction(&session_key).await {
            return;
        }

        let sid = to_posix(&session_key);
        let session_handle = self.store.get_or_create(&session_key);
        let mut echo_messages: Vec<String> = Vec::new();
        let input = {
            let mut session = session_handle.lock().await;
            session.append_message(Message::user(prompt));
            for mention in extract_mentions(prompt) {
                match session.add_chat_file(&mention) {
                    Ok(rel) => echo_messages.push(format!("[Emigo] Added '{rel}' to context.")),
                    Err(ChatFileError::AlreadyPresent(_)) => {}
                    Err(e) => debug!(mention = %mention, error = %e, "ignoring @-mention"),
                }
            }
            self.build_snapshot(&sid, prompt, &mut session)
        };
        for msg in echo_messages {
            self.frontend.message(&msg).await;
        }

        // Echo the prompt into the editor's chat view before any model
        // output streams in.
        self.frontend
            .stream_chunk(&sid, &format!("{prompt}\n\n"), StreamRole::User, None, None)
            .await;

        self.dispatch_interaction(&session_key, input).await;
    }

    /// Replace the session history and submit, the last user message acting
    /// as the nominal prompt.  Used for edit-and-resubmit from the editor.
    pub async fn submit_revised_history(
        &self,
        session_dir: &Path,
        messages: Vec<Message>,
    ) {
        let prompt = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User { content } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_default();
        if prompt.is_empty() {
            self.frontend
                .message("[Emigo] Revised history contains no user message; ignoring.")
                .await;
            return;
        }

        let session_key = normalize(session_dir);
        if !self.claim_interaction(&session_key).await {
            return;
        }

        let sid = to_posix(&session_key);
        let session_handle = self.store.get_or_create(&session_key);
        let input = {
            let mut session = session_handle.lock().await;
            session.replace_history(messages);
            self.build_snapshot(&sid, &prompt, &mut session)
        };
        // The editor rebuilds its chat view from the revised history.
        self.frontend.clear_local_buffer(&sid).await;

        self.dispatch_interaction(&session_key, input).await;
    }

    /// Cancel the interaction running in `session_dir`.
    pub async fn cancel(&self, session_dir: &Path) {
        let session_key = normalize(session_dir);
        {
            let st = self.state.lock().await;
            if st.active_session.as_ref() != Some(&session_key) {
                drop(st);
                self.frontend
                    .message("[Emigo] No active interaction for this session.")
                    .await;
                return;
            }
        }
        self.cancel_and_restart(&session_key).await;
    }

    pub async fn add_file(&self, session_dir: &Path, file: &str) -> String {
        let handle = self.store.get_or_create(&normalize(session_dir));
        let msg = match handle.lock().await.add_chat_file(file) {
            Ok(rel) => format!("[Emigo] Added '{rel}' to context."),
            Err(e) => format!("[Emigo] {e}"),
        };
        self.frontend.message(&msg).await;
        msg
    }

    pub async fn remove_file(&self, session_dir: &Path, file: &str) -> String {
        let handle = self.store.get_or_create(&normalize(session_dir));
        let msg = match handle.lock().await.remove_chat_file(file) {
            Ok(rel) => format!("[Emigo] Removed '{rel}' from context."),
            Err(e) => format!("[Emigo] {e}"),
        };
        self.frontend.message(&msg).await;
        msg
    }

    pub async fn list_files(&self, session_dir: &Path) -> Vec<String> {
        let handle = self.store.get_or_create(&normalize(session_dir));
        let session = handle.lock().await;
        session.chat_files().to_vec()
    }

    pub async fn history(&self, session_dir: &Path) -> Vec<Message> {
        let handle = self.store.get_or_create(&normalize(session_dir));
        let session = handle.lock().await;
        session.history_snapshot()
    }

    pub async fn clear_history(&self, session_dir: &Path) {
        let session_key = normalize(session_dir);
        let handle = self.store.get_or_create(&session_key);
        handle.lock().await.clear_history();
        self.frontend.clear_local_buffer(&to_posix(&session_key)).await;
        self.frontend.message("[Emigo] Chat history cleared.").await;
    }

    /// Graceful shutdown of the worker subprocess.
    pub async fn shutdown(&self) {
        let mut guard = self.worker.lock().await;
        self.live_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = guard.take() {
            handle.shutdown(SHUTDOWN_GRACE).await;
        }
    }

    // ── Interaction lifecycle ─────────────────────────────────────────────────

    /// Gate a new interaction: refuse when this session is busy, offer a
    /// cancel when a different session is.  Returns true once the claim is
    /// registered.
    async fn claim_interaction(&self, session_key: &PathBuf) -> bool {
        enum Gate {
            BusySame,
            BusyOther(PathBuf),
            Free,
        }
        let gate = {
            let st = self.state.lock().await;
            match &st.active_session {
                Some(active) if active == session_key => Gate::BusySame,
                Some(active) => Gate::BusyOther(active.clone()),
                None => Gate::Free,
            }
        };

        if matches!(gate, Gate::BusySame) {
            self.frontend
                .message(
                    "[Emigo] An interaction is already running for this session; \
                     wait for it or cancel it first.",
                )
                .await;
            return false;
        }

        if let Gate::BusyOther(other) = gate {
            let question = format!(
                "An interaction is running in {}. Cancel it and start the new prompt?",
                to_posix(&other)
            );
            if !self.frontend.yes_or_no(&question).await {
                self.frontend
                    .message("[Emigo] Prompt dropped; another interaction is active.")
                    .await;
                return false;
            }
            self.cancel_and_restart(&other).await;
        }

        let mut st = self.state.lock().await;
        if st.active_session.is_some() {
            drop(st);
            self.frontend
                .message("[Emigo] Another interaction started concurrently; prompt dropped.")
                .await;
            return false;
        }
        st.active_session = Some(session_key.clone());
        true
    }

    fn build_snapshot(
        &self,
        sid: &str,
        prompt: &str,
        session: &mut emigo_session::Session,
    ) -> InteractionInput {
        InteractionInput {
            session_path: sid.to_string(),
            prompt: prompt.to_string(),
            history: session.history_snapshot(),
            chat_files: session.chat_files().to_vec(),
            environment_details: session.render_environment_details(),
            config: ModelConfig {
                verbose: self.config.verbose,
                ..self.config.model.clone()
            },
        }
    }

    /// Start the worker if needed and hand it the interaction snapshot.
    async fn dispatch_interaction(&self, session_key: &Path, input: InteractionInput) {
        let result = async {
            self.ensure_worker().await?;
            self.send_to_worker(&WorkerRequest::InteractionRequest { data: input })
                .await
        }
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to dispatch interaction");
            let mut st = self.state.lock().await;
            st.active_session = None;
            drop(st);
            self.frontend
                .message(&format!("[Emigo] Failed to start interaction: {e:#}"))
                .await;
            self.frontend.interaction_finished(&to_posix(session_key)).await;
        }
    }

    /// Kill the worker, discard its in-flight output, revert the cancelled
    /// prompt, and bring up a fresh worker.
    async fn cancel_and_restart(&self, session_key: &PathBuf) {
        {
            // The bump happens under the worker lock so it cannot interleave
            // with a spawn in progress; anything the dying worker already
            // wrote is stale afterwards.
            let mut guard = self.worker.lock().await;
            self.live_generation.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = guard.take() {
                handle.kill().await;
            }
        }
        {
            let mut st = self.state.lock().await;
            for (request_id, pending) in st.pending_tool_requests.drain() {
                debug!(
                    request_id = %request_id,
                    session = %pending.session,
                    tool = %pending.tool_name,
                    "dropping pending tool request on cancel"
                );
            }
            st.active_session = None;
        }

        let session_handle = self.store.get_or_create(session_key);
        {
            let mut session = session_handle.lock().await;
            session.pop_trailing_user_message();
            // Tools may already have written to disk mid-turn; nothing in
            // the cache can be trusted.
            session.invalidate_cache(None);
        }

        let sid = to_posix(session_key);
        info!(session = %sid, "interaction cancelled");
        self.frontend.message("[Emigo] Interaction cancelled.").await;
        self.frontend.interaction_finished(&sid).await;

        if let Err(e) = self.ensure_worker().await {
            warn!(error = %e, "failed to restart worker after cancel");
        }
    }

    // ── Worker supervision ────────────────────────────────────────────────────

    fn worker_program(&self) -> PathBuf {
        if let Some(p) = &self.config.worker_program {
            return p.clone();
        }
        if let Ok(p) = std::env::var("EMIGO_WORKER_PATH") {
            return PathBuf::from(p);
        }
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.join("emigo-worker")))
            .unwrap_or_else(|| PathBuf::from("emigo-worker"))
    }

    async fn ensure_worker(&self) -> anyhow::Result<()> {
        let mut guard = self.worker.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let generation = self.live_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let program = self.worker_program();
        info!(program = %program.display(), generation, "spawning worker");
        let (handle, stdout, stderr) = WorkerHandle::spawn(&program, generation)?;

        // Worker stderr is diagnostics only; log it verbatim.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "emigo::worker", "worker: {line}");
            }
        });

        // Stdout carries the protocol.  This task is the router: events are
        // handled inline, so a blocking approval prompt holds up later
        // worker messages; that is fine, the worker is blocked on that
        // very reply.
        let orch = self.this.upgrade().expect("orchestrator dropped while spawning worker");
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line::<WorkerEvent>(&line) {
                    Ok(event) => orch.handle_worker_event(generation, event).await,
                    Err(e) => {
                        warn!(error = %e, line = %line.trim(), "skipping invalid worker message")
                    }
                }
            }
            orch.on_worker_exit(generation).await;
        });

        *guard = Some(handle);
        Ok(())
    }

    async fn send_to_worker(&self, req: &WorkerRequest) -> anyhow::Result<()> {
        let mut guard = self.worker.lock().await;
        match guard.as_mut() {
            Some(handle) => handle.send(req).await,
            None => anyhow::bail!("no worker running"),
        }
    }

    /// Called by the router task when the worker's stdout closes.
    async fn on_worker_exit(&self, generation: u64) {
        {
            let mut guard = self.worker.lock().await;
            if generation != self.live_generation.load(Ordering::SeqCst) {
                // Superseded by a cancel or restart; nothing to do.
                return;
            }
            self.live_generation.fetch_add(1, Ordering::SeqCst);
            *guard = None;
        }

        let active = {
            let mut st = self.state.lock().await;
            st.pending_tool_requests.clear();
            st.active_session.take()
        };
        if let Some(session) = active {
            let sid = to_posix(&session);
            warn!(session = %sid, "worker exited unexpectedly during interaction");
            self.frontend
                .message("[Emigo] Worker process exited unexpectedly; interaction failed.")
                .await;
            self.frontend.interaction_finished(&sid).await;
        } else {
            debug!("worker exited while idle");
        }
    }

    // ── Worker event routing ──────────────────────────────────────────────────

    pub(crate) async fn handle_worker_event(&self, generation: u64, event: WorkerEvent) {
        if generation != self.live_generation.load(Ordering::SeqCst) {
            debug!(generation, "discarding event from superseded worker");
            return;
        }

        match event {
            WorkerEvent::Stream { session, role, content, tool_id, tool_name } => {
                // The model may echo its own context; never forward it.
                // Raw tool-argument fragments pass through verbatim; they
                // are partial JSON and must not be rewritten.
                let content = if role == StreamRole::ToolJsonArgs {
                    content
                } else {
                    strip_environment_details(&content)
                };
                self.frontend
                    .stream_chunk(
                        &session,
                        &content,
                        role,
                        tool_id.as_deref(),
                        tool_name.as_deref(),
                    )
                    .await;
            }

            WorkerEvent::ToolRequest { session, request_id, tool_name, parameters } => {
                self.handle_tool_request(session, request_id, tool_name, parameters)
                    .await;
            }

            WorkerEvent::GetEnvironmentDetailsRequest { session, request_id } => {
                let handle = self.store.get_or_create(&normalize(Path::new(&session)));
                let details = handle.lock().await.render_environment_details();
                if let Err(e) = self
                    .send_to_worker(&WorkerRequest::GetEnvironmentDetailsResponse {
                        request_id,
                        session,
                        details,
                    })
                    .await
                {
                    warn!(error = %e, "failed to deliver environment details");
                }
            }

            WorkerEvent::Finished { session, status, message, final_history } => {
                debug!(session = %session, ?status, message = %message, "worker finished");
                let session_key = normalize(Path::new(&session));
                {
                    let mut st = self.state.lock().await;
                    match &st.active_session {
                        Some(active) if *active == session_key => {
                            st.active_session = None;
                        }
                        _ => {
                            // Early-cleared by attempt_completion, or the
                            // session was rebound since.  The history update
                            // below still applies; the ownership flag must
                            // not be touched.
                            debug!(session = %session, "finished for a session that is no longer active");
                        }
                    }
                    st.pending_tool_requests.clear();
                }

                if status.accepts_history() {
                    if let Some(history) = final_history {
                        let handle = self.store.get_or_create(&session_key);
                        handle.lock().await.replace_history(filter_history(history));
                    }
                } else {
                    self.frontend
                        .message(&format!("[Emigo] Interaction failed: {message}"))
                        .await;
                }
                self.frontend.interaction_finished(&session).await;
            }

            WorkerEvent::Error { session, message } => {
                warn!(session = %session, message = %message, "worker error");
                self.frontend
                    .stream_chunk(&session, &message, StreamRole::Error, None, None)
                    .await;
                let session_key = normalize(Path::new(&session));
                let mut st = self.state.lock().await;
                if st.active_session.as_ref() == Some(&session_key) {
                    st.active_session = None;
                }
            }

            WorkerEvent::Pong => debug!("worker pong"),
        }
    }

    async fn handle_tool_request(
        &self,
        session: String,
        request_id: String,
        tool_name: String,
        parameters: Value,
    ) {
        {
            let mut st = self.state.lock().await;
            st.pending_tool_requests.insert(
                request_id.clone(),
                PendingToolRequest {
                    session: session.clone(),
                    tool_name: tool_name.clone(),
                },
            );
        }

        let session_key = normalize(Path::new(&session));
        let ctx = ToolContext {
            session: self.store.get_or_create(&session_key),
            frontend: self.frontend.clone(),
            repomap: self.repomap.clone(),
            session_path: session_key.clone(),
        };

        let result = match self.tools.get(&tool_name) {
            Some(tool) => {
                if tool.default_policy() == ApprovalPolicy::Ask
                    && !self
                        .frontend
                        .request_tool_approval(&session, &tool_name, &parameters)
                        .await
                {
                    info!(tool = %tool_name, "tool invocation denied by user");
                    TOOL_DENIED.to_string()
                } else {
                    tool.execute(&ctx, &parameters).await
                }
            }
            None => format_err(format!("Unknown tool: {tool_name}")),
        };

        // Optimistic early-clear: once completion is signalled the next
        // prompt must not be refused while the trailing `finished` is still
        // in flight.
        if tool_name == "attempt_completion" && result == COMPLETION_SIGNALLED {
            let mut st = self.state.lock().await;
            if st.active_session.as_ref() == Some(&session_key) {
                st.active_session = None;
            }
        }

        if let Err(e) = self
            .send_to_worker(&WorkerRequest::ToolResult {
                request_id: request_id.clone(),
                result,
            })
            .await
        {
            warn!(error = %e, request_id = %request_id, "failed to deliver tool result; worker likely gone");
        }
        self.state.lock().await.pending_tool_requests.remove(&request_id);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
