// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestration kernel: session supervisor, output relay, todo state
//! machine, and agent-availability policy, wired together behind a local
//! control surface.

pub mod availability;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod federation;
pub mod gathering;
pub mod run;

pub use availability::AvailabilityTracker;
pub use config::Config;
pub use control::{build_router, ControlState};
pub use dispatch::{DriveOutcome, Orchestrator};
pub use error::DaemonError;
pub use federation::{ComputerRecord, ComputerRegistry};
pub use gathering::{GatheringConfig, GatheringRunner};
