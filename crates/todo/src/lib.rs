// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stateless todo state machine: given a working directory and an
//! optional slug, `next_prepare`/`next_work` read roadmap/work-item/worktree
//! state from disk and return a single [`Directive`]. No in-memory state
//! governs transitions; every call is self-contained.

mod availability;
mod directive;
mod error;
mod gates;
mod machine;
mod roadmap;
mod state_yaml;
mod verify;

pub use availability::{AgentAvailability, AgentKind, AlwaysClaude, TaskType};
pub use directive::{Directive, ThinkingTier, ToolCall};
pub use error::{ErrorCode, TodoError};
pub use gates::{BuildGateRunner, GateCheck, GateReport, NoOpGateRunner, ShellGateRunner};
pub use machine::{next_prepare, next_work};
pub use roadmap::{parse as parse_roadmap, promote_to_in_progress, resolve_slug, RoadmapEntry, RoadmapStatus};
pub use state_yaml::{is_template, parse_verdict, Phase, PhaseStatus, ReviewStatus, StateYaml, Verdict};
pub use verify::{verify_artifacts, VerifyPhase, VerifyReport};
