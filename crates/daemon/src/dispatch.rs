// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stateful orchestrator: calls the todo state machine, turns
//! `ToolCall` directives into spawned sessions, and executes each
//! command's fixed POST_COMPLETION recipe before looping back.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use teleclaude_bridge::{
    AgentKind as BridgeAgentKind, OutputPoller, SessionEvent, SessionRegistry, SessionRole,
    SessionSpec, TerminalBridge,
};
use teleclaude_relay::{ParticipantRole, RelayHub, RelayParticipant};
use teleclaude_todo::{
    next_prepare, next_work, parse_verdict, promote_to_in_progress, verify_artifacts,
    AgentAvailability, AgentKind as TodoAgentKind, BuildGateRunner, Directive, Phase, PhaseStatus,
    ReviewStatus, StateYaml, ToolCall, Verdict, VerifyPhase,
};

use crate::error::DaemonError;

const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 4);

/// Outcome of driving a single work item to its next milestone.
#[derive(Debug)]
pub enum DriveOutcome {
    Completed { slug: String, archive_path: String },
    Blocked { slug: String, code: String, message: String },
    AwaitingMore,
}

pub struct Orchestrator {
    bridge: Arc<TerminalBridge>,
    registry: Arc<SessionRegistry>,
    relay_hub: Arc<RelayHub>,
    availability: Arc<dyn AgentAvailability + Send + Sync>,
    gate_runner: Arc<dyn BuildGateRunner>,
    project_root: PathBuf,
    max_review_rounds: u32,
}

impl Orchestrator {
    pub fn new(
        bridge: Arc<TerminalBridge>,
        registry: Arc<SessionRegistry>,
        relay_hub: Arc<RelayHub>,
        availability: Arc<dyn AgentAvailability + Send + Sync>,
        gate_runner: Arc<dyn BuildGateRunner>,
        project_root: PathBuf,
        max_review_rounds: u32,
    ) -> Self {
        Self {
            bridge,
            registry,
            relay_hub,
            availability,
            gate_runner,
            project_root,
            max_review_rounds,
        }
    }

    /// Drives a single work item through the state machine until it
    /// produces `CompleteOk`, a terminal `Error`, or needs a dispatched
    /// session to run its course (in which case this returns once, having
    /// fully executed one ToolCall and its POST_COMPLETION recipe).
    pub async fn step(&self, slug: Option<&str>) -> Result<DriveOutcome, DaemonError> {
        let prepared = next_prepare(&self.project_root, slug, self.availability.as_ref());
        if let Directive::ToolCall(call) = &prepared {
            return self.dispatch_prepare(call).await;
        }

        let directive = next_work(
            &self.project_root,
            slug,
            self.availability.as_ref(),
            self.gate_runner.as_ref(),
            self.max_review_rounds,
        );

        match directive {
            Directive::CompleteOk { slug, archive_path } => Ok(DriveOutcome::Completed { slug, archive_path }),
            Directive::Error { code, message } => Ok(DriveOutcome::Blocked { slug: slug.unwrap_or("?").to_owned(), code, message }),
            Directive::PreparedOk { .. } => Ok(DriveOutcome::AwaitingMore),
            Directive::ToolCall(call) => self.dispatch_work(&call).await,
        }
    }

    async fn dispatch_prepare(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        self.promote_roadmap(&call.args).await;
        let session = self.spawn_for(call, SessionRole::Architect).await?;
        self.await_exit(&session.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;
        self.registry.close(&session.session_id, "next-prepare complete").await;
        info!(slug = %call.args, "next-prepare POST_COMPLETION: session ended, looping");
        Ok(DriveOutcome::AwaitingMore)
    }

    async fn dispatch_work(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        match call.command.as_str() {
            "commit-pending" => self.dispatch_commit_pending(call).await,
            "next-build" => self.dispatch_next_build(call).await,
            "next-review" => self.dispatch_next_review(call).await,
            "next-fix-review" => self.dispatch_next_fix_review(call).await,
            "next-finalize" => self.dispatch_next_finalize(call).await,
            other => {
                warn!(command = %other, "unrecognized ToolCall command, ending without recipe");
                Ok(DriveOutcome::AwaitingMore)
            }
        }
    }

    async fn dispatch_commit_pending(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        let session = self.spawn_for(call, SessionRole::Builder).await?;
        self.await_exit(&session.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;
        self.registry.close(&session.session_id, "commit-pending complete").await;
        Ok(DriveOutcome::AwaitingMore)
    }

    async fn dispatch_next_build(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        let session = self.spawn_for(call, SessionRole::Builder).await?;
        self.await_exit(&session.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;
        self.registry.close(&session.session_id, "next-build complete").await;

        let dir = self.work_item_dir(&call.args);
        let worktree = self.worktree_dir(&call.args);
        let report = verify_artifacts(&dir, &worktree, VerifyPhase::Build);
        self.update_state(&call.args, |state| {
            state.phase = Phase::Build;
            state.build = if report.passed() { PhaseStatus::Complete } else { PhaseStatus::InProgress };
        })
        .await;

        Ok(DriveOutcome::AwaitingMore)
    }

    /// `next-review` POST_COMPLETION: the one recipe with real transition
    /// logic. `REQUEST CHANGES` keeps the reviewer alive and runs a direct
    /// peer conversation with a dispatched fixer.
    async fn dispatch_next_review(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        let reviewer = self.spawn_for(call, SessionRole::Reviewer).await?;
        // Waits for the reviewer's first pass to settle (exit-marker seen,
        // process still alive) rather than for the process to die, so the
        // reviewer is still there to hold a peer conversation below.
        self.await_exit(&reviewer.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;

        let slug = call.args.clone();
        loop {
            let verdict = self.read_verdict(&slug);
            match verdict {
                Some(Verdict::Approve) => {
                    self.registry.close(&reviewer.session_id, "review approved").await;
                    self.update_state(&slug, |state| state.review = ReviewStatus::Approved).await;
                    return Ok(DriveOutcome::AwaitingMore);
                }
                Some(Verdict::RequestChanges) => {
                    let round = self.current_review_round(&slug);
                    if round >= self.max_review_rounds {
                        self.registry.close(&reviewer.session_id, "review round limit reached").await;
                        return Ok(DriveOutcome::Blocked {
                            slug: slug.clone(),
                            code: "REVIEW_ROUND_LIMIT_EXCEEDED".to_owned(),
                            message: format!("{slug} blocked after {round} review rounds"),
                        });
                    }

                    let (fixer_kind, fixer_tier) = self.availability.pick(teleclaude_todo::TaskType::Fix);
                    let fix_call = ToolCall {
                        command: "next-fix-review".to_owned(),
                        args: slug.clone(),
                        project: call.project.clone(),
                        agent: fixer_kind,
                        thinking_tier: fixer_tier,
                        subfolder: call.subfolder.clone(),
                        note: None,
                    };
                    let fixer = self.spawn_for(&fix_call, SessionRole::Fixer).await?;

                    self.relay_hub
                        .direct_link(
                            RelayParticipant {
                                session_id: reviewer.session_id.clone(),
                                display_name: "reviewer".to_owned(),
                                ordinal: 0,
                                role: ParticipantRole::Speaker,
                            },
                            RelayParticipant {
                                session_id: fixer.session_id.clone(),
                                display_name: "fixer".to_owned(),
                                ordinal: 1,
                                role: ParticipantRole::Speaker,
                            },
                        )
                        .await?;

                    // Both sides' output is pumped into the relay for the
                    // round's duration. The reviewer's pump has no natural
                    // end (it keeps talking as long as the fixer does), so
                    // it runs as a background task cancelled once the
                    // fixer's own pump reports the fixer's turn is over;
                    // the fixer does not self-terminate, it reports done
                    // via its exit marker while its process stays up.
                    let round_shutdown = CancellationToken::new();
                    let reviewer_pump = tokio::spawn(relay_pump(
                        Arc::clone(&self.bridge),
                        Arc::clone(&self.relay_hub),
                        reviewer.session_id.clone(),
                        reviewer.terminal_handle.clone(),
                        round_shutdown.clone(),
                    ));

                    let fixer_result = tokio::time::timeout(
                        DEFAULT_SESSION_TIMEOUT,
                        relay_pump(
                            Arc::clone(&self.bridge),
                            Arc::clone(&self.relay_hub),
                            fixer.session_id.clone(),
                            fixer.terminal_handle.clone(),
                            round_shutdown.clone(),
                        ),
                    )
                    .await;

                    round_shutdown.cancel();
                    let _ = reviewer_pump.await;

                    match fixer_result {
                        Ok(Some(SessionEvent::ExitedAbnormally { reason })) => {
                            warn!(slug = %slug, reason = %reason, "fixer session ended abnormally during peer review");
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            return Err(DaemonError::WaitTimedOut(format!(
                                "{} poller channel closed",
                                fixer.terminal_handle
                            )));
                        }
                        Err(_) => return Err(DaemonError::WaitTimedOut(fixer.terminal_handle.clone())),
                    }

                    if let Some(relay_id) = self.relay_hub.relay_for_session(&reviewer.session_id).await {
                        self.relay_hub.end(&relay_id).await;
                    }
                    self.registry.close(&fixer.session_id, "fix-review complete").await;
                    self.update_state(&slug, |state| state.review_round += 1).await;
                    // Loop: re-read the verdict the reviewer wrote to
                    // review-findings.md and decide again. The reviewer
                    // session itself is never closed here.
                }
                None => {
                    self.registry.close(&reviewer.session_id, "ambiguous verdict").await;
                    return Ok(DriveOutcome::Blocked {
                        slug: slug.clone(),
                        code: "AMBIGUOUS_VERDICT".to_owned(),
                        message: "review-findings.md has no clear verdict".to_owned(),
                    });
                }
            }
        }
    }

    /// Fallback path when the reviewer session has already died: a plain
    /// fix dispatch with no live peer link. The stale verdict is cleared
    /// so the next `next_work` call re-requests a fresh review.
    async fn dispatch_next_fix_review(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        let session = self.spawn_for(call, SessionRole::Fixer).await?;
        self.await_exit(&session.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;
        self.registry.close(&session.session_id, "fix-review complete").await;

        let findings_path = self.work_item_dir(&call.args).join("review-findings.md");
        let _ = std::fs::remove_file(&findings_path);
        self.update_state(&call.args, |state| state.review_round += 1).await;
        Ok(DriveOutcome::AwaitingMore)
    }

    async fn dispatch_next_finalize(&self, call: &ToolCall) -> Result<DriveOutcome, DaemonError> {
        debug_assert_eq!(call.subfolder, "", "next-finalize must run from the main repo");
        let session = self.spawn_for(call, SessionRole::Finalizer).await?;
        self.await_exit(&session.terminal_handle, DEFAULT_SESSION_TIMEOUT).await?;
        self.registry.close(&session.session_id, "finalize complete").await;
        self.update_state(&call.args, |state| state.phase = Phase::Done).await;
        Ok(DriveOutcome::AwaitingMore)
    }

    /// Spawns the agent binary as a live interactive session and seeds its
    /// initial task prompt as input rather than baking it into argv, so the
    /// process is still there to be driven further (relay peer conversation,
    /// a second `send_input`) instead of a one-shot invocation that exits
    /// the moment it finishes its first turn.
    async fn spawn_for(
        &self,
        call: &ToolCall,
        role: SessionRole,
    ) -> Result<teleclaude_bridge::Session, DaemonError> {
        let agent_kind = map_agent_kind(call.agent);
        let command = argv_for(agent_kind);
        let subfolder = if call.subfolder.is_empty() { None } else { Some(call.subfolder.clone()) };

        let session = self
            .registry
            .create(SessionSpec {
                command,
                agent_kind,
                role,
                project_path: call.project.clone(),
                subfolder,
                chat_binding: None,
                parent_session_id: None,
                cols: 200,
                rows: 50,
            })
            .await?;

        self.bridge.send_input(&session.terminal_handle, &prompt_for(call), true).await?;

        info!(session_id = %session.session_id, command = %call.command, slug = %call.args, "dispatched session");
        Ok(session)
    }

    /// Runs a poller until it observes a terminal event or the timeout
    /// elapses, then tears the poller down.
    async fn await_exit(&self, handle: &str, timeout: Duration) -> Result<SessionEvent, DaemonError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let poller = OutputPoller::new(Arc::clone(&self.bridge), handle.to_owned());
        let poller_shutdown = shutdown.clone();
        let poller_task = tokio::spawn(async move { poller.run(tx, poller_shutdown).await });

        let result = tokio::time::timeout(timeout, async {
            while let Some(event) = rx.recv().await {
                if event.is_terminal() {
                    return Some(event);
                }
            }
            None
        })
        .await;

        shutdown.cancel();
        let _ = poller_task.await;

        match result {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(DaemonError::WaitTimedOut(format!("{handle} poller channel closed"))),
            Err(_) => Err(DaemonError::WaitTimedOut(handle.to_owned())),
        }
    }

    async fn promote_roadmap(&self, slug: &str) {
        let path = self.project_root.join("todos").join("roadmap.md");
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            let promoted = promote_to_in_progress(&content, slug);
            if promoted != content {
                let _ = tokio::fs::write(&path, promoted).await;
            }
        }
    }

    fn read_verdict(&self, slug: &str) -> Option<Verdict> {
        let findings = std::fs::read_to_string(self.work_item_dir(slug).join("review-findings.md")).ok()?;
        parse_verdict(&findings)
    }

    fn current_review_round(&self, slug: &str) -> u32 {
        StateYaml::load(&self.work_item_dir(slug).join("state.yaml"))
            .map(|s| s.review_round)
            .unwrap_or(0)
    }

    async fn update_state(&self, slug: &str, mutate: impl FnOnce(&mut StateYaml)) {
        let path = self.work_item_dir(slug).join("state.yaml");
        let mut state = StateYaml::load(&path).unwrap_or_else(|_| StateYaml::fresh());
        mutate(&mut state);
        if let Err(e) = state.save(&path) {
            warn!(slug = %slug, error = %e, "failed to persist state.yaml");
        }
    }

    fn work_item_dir(&self, slug: &str) -> PathBuf {
        self.project_root.join("todos").join(slug)
    }

    fn worktree_dir(&self, slug: &str) -> PathBuf {
        self.project_root.join("trees").join(slug)
    }
}

fn map_agent_kind(kind: TodoAgentKind) -> BridgeAgentKind {
    match kind {
        TodoAgentKind::Claude => BridgeAgentKind::Claude,
        TodoAgentKind::Codex => BridgeAgentKind::Codex,
        TodoAgentKind::Gemini => BridgeAgentKind::Gemini,
    }
}

fn binary_for(agent_kind: BridgeAgentKind) -> &'static str {
    match agent_kind {
        BridgeAgentKind::Claude => "claude",
        BridgeAgentKind::Codex => "codex",
        BridgeAgentKind::Gemini => "gemini",
        BridgeAgentKind::Shell => "sh",
    }
}

fn argv_for(agent_kind: BridgeAgentKind) -> Vec<String> {
    vec![binary_for(agent_kind).to_owned()]
}

fn prompt_for(call: &ToolCall) -> String {
    let mut prompt = format!("{} {}", call.command, call.args);
    if let Some(note) = &call.note {
        prompt.push_str(" -- ");
        prompt.push_str(note);
    }
    prompt
}

/// Runs a poller on `handle`, forwarding every observed output delta into
/// the relay as `session_id`'s turn, until a terminal event arrives or
/// `shutdown` is cancelled. Returns the terminal event, if any.
async fn relay_pump(
    bridge: Arc<TerminalBridge>,
    relay_hub: Arc<RelayHub>,
    session_id: String,
    handle: String,
    shutdown: CancellationToken,
) -> Option<SessionEvent> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let poller = OutputPoller::new(Arc::clone(&bridge), handle);
    let poller_shutdown = shutdown.clone();
    let poller_task = tokio::spawn(async move { poller.run(tx, poller_shutdown).await });

    let mut terminal = None;
    while let Some(event) = rx.recv().await {
        if event.is_terminal() {
            terminal = Some(event);
            break;
        }
        if let SessionEvent::OutputChanged { text_delta, .. } = &event {
            if let Err(e) = relay_hub.fan_out(&session_id, text_delta).await {
                warn!(session_id = %session_id, error = %e, "relay fan-out failed");
            }
        }
    }

    shutdown.cancel();
    let _ = poller_task.await;
    terminal
}
