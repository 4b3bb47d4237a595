// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon control surface: a minimal RPC exposed over a local Unix
//! socket so a command-line client can list sessions, start/end a
//! session, send text (optionally `--direct`, idempotent), query
//! availability, mark an agent unavailable, verify artifacts, and drive
//! `next_prepare`/`next_work`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path as AxumPath, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, warn};

use teleclaude_bridge::{SessionRegistry, TerminalBridge};
use teleclaude_relay::{ParticipantRole, RelayHub, RelayParticipant};
use teleclaude_todo::{next_prepare, next_work, verify_artifacts, AgentKind as TodoAgentKind, VerifyPhase};

use crate::availability::AvailabilityTracker;
use crate::gathering::{GatheringConfig, GatheringRunner};

pub struct ControlState {
    pub registry: Arc<SessionRegistry>,
    pub bridge: Arc<TerminalBridge>,
    pub relay_hub: Arc<RelayHub>,
    pub availability: Arc<AvailabilityTracker>,
    pub project_root: PathBuf,
    pub max_review_rounds: u32,
    pub gathering_config: GatheringConfig,
}

pub fn build_router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route("/v1/sessions", get(list_sessions))
        .route("/v1/sessions/:id/end", post(end_session))
        .route("/v1/sessions/:id/send", post(send_to_session))
        .route("/v1/sessions/:id/ack", post(ack_signal_session))
        .route("/v1/availability", get(list_availability))
        .route("/v1/availability/unavailable", post(mark_unavailable))
        .route("/v1/verify", post(verify))
        .route("/v1/next_prepare", post(run_next_prepare))
        .route("/v1/next_work", post(run_next_work))
        .route("/v1/gatherings/start", post(start_gathering))
        .with_state(state)
}

async fn list_sessions(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    let sessions = state.registry.list(false).await;
    Json(serde_json::json!({ "sessions": sessions }))
}

async fn end_session(State(state): State<Arc<ControlState>>, AxumPath(id): AxumPath<String>) -> impl IntoResponse {
    state.registry.close(&id, "control: end requested").await;
    Json(serde_json::json!({ "accepted": true }))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
    /// One-shot idempotent peer-link establishment with another session.
    #[serde(default)]
    direct: Option<String>,
}

async fn send_to_session(
    State(state): State<Arc<ControlState>>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<SendRequest>,
) -> impl IntoResponse {
    let Some(session) = state.registry.get(&id).await else {
        return Json(serde_json::json!({ "error": "session not found" })).into_response();
    };

    if let Some(target_id) = req.direct {
        let Some(target) = state.registry.get(&target_id).await else {
            return Json(serde_json::json!({ "error": "direct target not found" })).into_response();
        };
        let link_result = state
            .relay_hub
            .direct_link(
                RelayParticipant {
                    session_id: session.session_id.clone(),
                    display_name: session.session_id.clone(),
                    ordinal: 0,
                    role: ParticipantRole::Speaker,
                },
                RelayParticipant {
                    session_id: target.session_id.clone(),
                    display_name: target.session_id.clone(),
                    ordinal: 1,
                    role: ParticipantRole::Speaker,
                },
            )
            .await;
        // Idempotent: a second `send --direct` between the same pair
        // returns success without creating a second relay.
        if let Err(e) = link_result {
            if !matches!(e, teleclaude_relay::RelayError::AlreadyInRelay(_)) {
                return Json(serde_json::json!({ "error": e.to_string() })).into_response();
            }
        }
    }

    match state.registry.get(&session.session_id).await {
        Some(_) => Json(serde_json::json!({ "accepted": true })).into_response(),
        None => Json(serde_json::json!({ "error": "session not found" })).into_response(),
    }
}

/// `sessions ack <id>` — the human has seen a signal session; the
/// orchestrator may now end it. Resolves the Open Question of how long a
/// signal session is held open: until explicitly acknowledged.
async fn ack_signal_session(
    State(state): State<Arc<ControlState>>,
    AxumPath(id): AxumPath<String>,
) -> impl IntoResponse {
    state.registry.close(&id, "signal session acknowledged").await;
    Json(serde_json::json!({ "accepted": true }))
}

async fn list_availability(State(state): State<Arc<ControlState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "agents": state.availability.snapshot() }))
}

#[derive(Debug, Deserialize)]
struct MarkUnavailableRequest {
    agent_kind: TodoAgentKind,
    until_secs: u64,
    reason: String,
}

async fn mark_unavailable(State(state): State<Arc<ControlState>>, Json(req): Json<MarkUnavailableRequest>) -> impl IntoResponse {
    let until = Instant::now() + Duration::from_secs(req.until_secs);
    state.availability.mark_unavailable(req.agent_kind, until, req.reason);
    Json(serde_json::json!({ "accepted": true }))
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    slug: String,
    phase: String,
}

async fn verify(State(state): State<Arc<ControlState>>, Json(req): Json<VerifyRequest>) -> impl IntoResponse {
    let phase = match req.phase.as_str() {
        "build" => VerifyPhase::Build,
        "review" => VerifyPhase::Review,
        other => return Json(serde_json::json!({ "error": format!("unknown phase {other}") })).into_response(),
    };
    let work_item_dir = state.project_root.join("todos").join(&req.slug);
    let worktree_dir = state.project_root.join("trees").join(&req.slug);
    let report = verify_artifacts(&work_item_dir, &worktree_dir, phase);
    Json(serde_json::json!({ "passed": report.passed(), "failures": report.failures }))
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SlugRequest {
    #[serde(default)]
    slug: Option<String>,
}

async fn run_next_prepare(State(state): State<Arc<ControlState>>, Json(req): Json<SlugRequest>) -> impl IntoResponse {
    let availability = state.availability.as_ref();
    let directive = next_prepare(&state.project_root, req.slug.as_deref(), availability);
    Json(directive)
}

async fn run_next_work(State(state): State<Arc<ControlState>>, Json(req): Json<SlugRequest>) -> impl IntoResponse {
    let availability = state.availability.as_ref();
    let gate_runner = teleclaude_todo::NoOpGateRunner;
    let directive = next_work(
        &state.project_root,
        req.slug.as_deref(),
        availability,
        &gate_runner,
        state.max_review_rounds,
    );
    Json(directive)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GatheringRoleRequest {
    Speaker,
    Harvester,
    Human,
}

#[derive(Debug, Deserialize)]
struct GatheringParticipantRequest {
    session_id: String,
    display_name: String,
    ordinal: u32,
    role: GatheringRoleRequest,
}

#[derive(Debug, Deserialize)]
struct StartGatheringRequest {
    participants: Vec<GatheringParticipantRequest>,
}

/// Starts a gathering over already-live sessions and runs the ceremony to
/// completion in the background; the caller is not held open for the
/// gathering's duration. Refuses (via `RelayHub::start_gathering`'s own
/// nested-gathering guard) if any participant is already in an active relay.
async fn start_gathering(State(state): State<Arc<ControlState>>, Json(req): Json<StartGatheringRequest>) -> impl IntoResponse {
    let mut participants = Vec::with_capacity(req.participants.len());
    let mut handles = std::collections::HashMap::new();

    for p in &req.participants {
        let Some(session) = state.registry.get(&p.session_id).await else {
            return Json(serde_json::json!({ "error": format!("session {} not found", p.session_id) })).into_response();
        };
        handles.insert(p.session_id.clone(), session.terminal_handle.clone());
        participants.push(RelayParticipant {
            session_id: p.session_id.clone(),
            display_name: p.display_name.clone(),
            ordinal: p.ordinal,
            role: match p.role {
                GatheringRoleRequest::Speaker => ParticipantRole::Speaker,
                GatheringRoleRequest::Harvester => ParticipantRole::Harvester,
                GatheringRoleRequest::Human => ParticipantRole::Human,
            },
        });
    }

    let runner = GatheringRunner::new(Arc::clone(&state.bridge), Arc::clone(&state.relay_hub), state.gathering_config.clone());
    tokio::spawn(async move {
        match runner.run(participants, &handles).await {
            Ok(artifact) => info!(artifact_len = artifact.len(), "gathering closed with harvest artifact"),
            Err(e) => warn!(error = %e, "gathering ended in error"),
        }
    });

    Json(serde_json::json!({ "accepted": true })).into_response()
}
