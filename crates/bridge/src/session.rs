// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single writeable authority over `{session_id -> Session}`. All
//! mutations and lookups go through [`SessionRegistry`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bridge::TerminalBridge;
use crate::error::BridgeError;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Architect,
    Builder,
    Reviewer,
    Fixer,
    Finalizer,
    Human,
    Peer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBinding {
    pub adapter: String,
    pub channel: String,
    pub topic: Option<String>,
}

/// A live or tombstoned terminal-backed agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub terminal_handle: String,
    pub agent_kind: AgentKind,
    pub role: SessionRole,
    pub project_path: String,
    pub subfolder: Option<String>,
    pub chat_binding: Option<ChatBinding>,
    pub created_at: u64,
    pub closed_at: Option<u64>,
    pub parent_session_id: Option<String>,
    pub direct_peers: HashSet<String>,
}

impl Session {
    pub fn is_tombstoned(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// Parameters for [`SessionRegistry::create`].
pub struct SessionSpec {
    pub command: Vec<String>,
    pub agent_kind: AgentKind,
    pub role: SessionRole,
    pub project_path: String,
    pub subfolder: Option<String>,
    pub chat_binding: Option<ChatBinding>,
    pub parent_session_id: Option<String>,
    pub cols: u16,
    pub rows: u16,
}

pub struct SessionRegistry {
    bridge: Arc<TerminalBridge>,
    store: Arc<dyn Store>,
    sessions: RwLock<HashMap<String, Session>>,
}

const STORE_PREFIX: &str = "session/";

impl SessionRegistry {
    pub fn new(bridge: Arc<TerminalBridge>, store: Arc<dyn Store>) -> Self {
        Self {
            bridge,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Spawns the pane and atomically makes `session_id` and
    /// `terminal_handle` visible together.
    pub async fn create(&self, spec: SessionSpec) -> Result<Session, BridgeError> {
        let session_id = Uuid::new_v4().to_string();
        let terminal_handle = format!("tc-{session_id}");

        self.bridge
            .create_pane(
                &terminal_handle,
                &spec.command,
                spec.cols,
                spec.rows,
                Some(spec.subfolder.as_deref().unwrap_or(spec.project_path.as_str())),
            )
            .await?;

        let session = Session {
            session_id: session_id.clone(),
            terminal_handle,
            agent_kind: spec.agent_kind,
            role: spec.role,
            project_path: spec.project_path,
            subfolder: spec.subfolder,
            chat_binding: spec.chat_binding,
            created_at: epoch_ms(),
            closed_at: None,
            parent_session_id: spec.parent_session_id,
            direct_peers: HashSet::new(),
        };

        self.persist(&session).await;
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session.clone());
        info!(session_id = %session_id, role = ?session.role, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn list(&self, include_closed: bool) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| include_closed || !s.is_tombstoned())
            .cloned()
            .collect()
    }

    /// Idempotent: closing an already-closed or unknown session succeeds.
    pub async fn close(&self, id: &str, _reason: &str) {
        let handle = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                Some(session) if session.closed_at.is_none() => {
                    session.closed_at = Some(epoch_ms());
                    self.persist_locked(session).await;
                    Some(session.terminal_handle.clone())
                }
                _ => None,
            }
        };

        if let Some(handle) = handle {
            self.bridge.destroy(&handle).await;
            debug!(session_id = %id, "session closed");
        }
    }

    /// Establishes a symmetric direct-peer link, idempotent.
    pub async fn link_peers(&self, a: &str, b: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(sa) = sessions.get_mut(a) {
            sa.direct_peers.insert(b.to_owned());
        }
        if let Some(sb) = sessions.get_mut(b) {
            sb.direct_peers.insert(a.to_owned());
        }
    }

    /// Compares persisted live sessions against the bridge's actual panes
    /// and tombstones orphans whose pane no longer exists.
    pub async fn reconcile(&self) -> Vec<String> {
        let mut tombstoned = Vec::new();
        let ids: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| !s.is_tombstoned())
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            let handle = self.sessions.read().await.get(&id).map(|s| s.terminal_handle.clone());
            if let Some(handle) = handle {
                if !self.bridge.is_alive(&handle).await {
                    self.close(&id, "reconcile: pane not found").await;
                    tombstoned.push(id);
                }
            }
        }
        tombstoned
    }

    async fn persist(&self, session: &Session) {
        self.persist_locked(session).await;
    }

    async fn persist_locked(&self, session: &Session) {
        if let Ok(bytes) = serde_json::to_vec(session) {
            let key = format!("{STORE_PREFIX}{}", session.session_id);
            if let Err(e) = self.store.put(&key, bytes).await {
                tracing::warn!(session_id = %session.session_id, error = %e, "failed to persist session");
            }
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
