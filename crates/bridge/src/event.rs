// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Lazy sequence member produced by a session's output poller.
///
/// Totally ordered within one poller; no ordering guarantee across pollers
/// except what the relay enforces by sequential delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    OutputChanged {
        text_delta: String,
        first_seen_at: u64,
        stable_since: u64,
    },
    IdleDetected {
        since: u64,
    },
    ExitedNormally {
        exit_marker_seen: bool,
    },
    ExitedAbnormally {
        reason: String,
    },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::ExitedNormally { .. } | SessionEvent::ExitedAbnormally { .. }
        )
    }
}
