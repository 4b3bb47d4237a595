// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("session {0} is already a participant in an active relay")]
    AlreadyInRelay(String),

    #[error("session {0} is not in any active relay")]
    NotInRelay(String),

    #[error("relay {0} not found")]
    NotFound(String),

    #[error("it is not {0}'s turn to speak")]
    NotSpeakersTurn(String),

    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("adapter rate limited: {0}")]
    AdapterRateLimited(String),
}
