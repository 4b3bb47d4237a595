// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// The orchestration-level error taxonomy: kinds, not type names, per the
/// error handling design. Most variants wrap a lower crate's error; the
/// two daemon-local kinds are `ConfigInvalid` (fatal at startup) and
/// `ReviewRoundLimitExceeded` (closure policy already applied upstream).
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("bridge error: {0}")]
    Bridge(#[from] teleclaude_bridge::BridgeError),

    #[error("relay error: {0}")]
    Relay(#[from] teleclaude_relay::RelayError),

    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("session wait timed out: {0}")]
    WaitTimedOut(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
