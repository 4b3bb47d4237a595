// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// The state machine's own error taxonomy. Surfaced to callers only as the
/// `code` field of `Directive::Error`; this type exists so internal
/// plumbing (state.yaml parsing, gate execution) can propagate a cause.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state.yaml malformed: {0}")]
    StateYamlMalformed(#[from] serde_yaml::Error),
}

/// Wire-facing error kinds a `Directive::Error` can carry, matching the
/// taxonomy kinds that originate in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoWork,
    NotPrepared,
    AmbiguousVerdict,
    BuildGateFailed,
    VerifyFailed,
    ReviewRoundLimitExceeded,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoWork => "NO_WORK",
            ErrorCode::NotPrepared => "NOT_PREPARED",
            ErrorCode::AmbiguousVerdict => "AMBIGUOUS_VERDICT",
            ErrorCode::BuildGateFailed => "BUILD_GATE",
            ErrorCode::VerifyFailed => "VERIFY",
            ErrorCode::ReviewRoundLimitExceeded => "REVIEW_ROUND_LIMIT_EXCEEDED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
