// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::availability::AgentKind;
use crate::error::ErrorCode;

/// A coarse resource hint passed to the agent back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingTier {
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub command: String,
    pub args: String,
    pub project: String,
    pub agent: AgentKind,
    pub thinking_tier: ThinkingTier,
    pub subfolder: String,
    pub note: Option<String>,
}

/// The single tagged return value of the state machine; the orchestrator's
/// only input. Errors are a variant, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Directive {
    Error { code: String, message: String },
    PreparedOk { slug: String },
    CompleteOk { slug: String, archive_path: String },
    ToolCall(ToolCall),
}

impl Directive {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Directive::Error {
            code: code.as_str().to_owned(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Directive::Error { .. })
    }
}
