// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state machine consults availability through a trait object so this
//! crate has no dependency on the daemon's concrete `CredentialBroker`-style
//! tracker.

use serde::{Deserialize, Serialize};

use crate::directive::ThinkingTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
    Gemini,
}

/// Task types the fallback matrix is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Prepare,
    Build,
    Review,
    Fix,
    Commit,
    Finalize,
}

/// Picks the best currently-available `(agent_kind, thinking_tier)` for a
/// task type, per the fallback matrix of the agent-availability component.
pub trait AgentAvailability {
    fn pick(&self, task: TaskType) -> (AgentKind, ThinkingTier);
}

/// Default fallback matrix used when the caller has no opinion: prefers
/// Claude at `slow` for planning-heavy tasks and `medium`/`fast` for
/// mechanical ones.
pub struct AlwaysClaude;

impl AgentAvailability for AlwaysClaude {
    fn pick(&self, task: TaskType) -> (AgentKind, ThinkingTier) {
        let tier = match task {
            TaskType::Prepare | TaskType::Review | TaskType::Finalize => ThinkingTier::Slow,
            TaskType::Build | TaskType::Fix => ThinkingTier::Medium,
            TaskType::Commit => ThinkingTier::Fast,
        };
        (AgentKind::Claude, tier)
    }
}
