// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Failures surfaced by the terminal bridge and session registry.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("pane not found: {0}")]
    PaneNotFound(String),

    #[error("pane already exists: {0}")]
    PaneAlreadyExists(String),

    #[error("multiplexer unavailable: {0}")]
    MultiplexerUnavailable(String),

    #[error("session spawn failed: {0}")]
    SessionSpawnFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Stable wire code, matching the taxonomy kinds named in the error
    /// handling design rather than Rust type names.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::PaneNotFound(_) => "PANE_LOST",
            BridgeError::PaneAlreadyExists(_) => "PANE_EXISTS",
            BridgeError::MultiplexerUnavailable(_) => "MULTIPLEXER_UNAVAILABLE",
            BridgeError::SessionSpawnFailed(_) => "SESSION_SPAWN_FAILED",
            BridgeError::Io(_) => "INTERNAL",
        }
    }
}
