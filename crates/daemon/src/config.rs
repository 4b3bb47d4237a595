// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Daemon that bridges chat-platform conversations to terminal-backed AI
/// coding agents and drives the todo state machine.
#[derive(Debug, Parser, Clone)]
#[command(name = "teleclauded", version, about)]
pub struct Config {
    /// Unix socket path for the daemon control surface.
    #[arg(long, env = "TELECLAUDE_SOCKET", default_value = "/tmp/teleclaude.sock")]
    pub socket: String,

    /// Root of the project the orchestrator drives `todos/`, `trees/`,
    /// `done/` under.
    #[arg(long, env = "TELECLAUDE_PROJECT_ROOT")]
    pub project_root: PathBuf,

    /// Review-round limit before a todo is blocked for human review.
    #[arg(long, env = "TELECLAUDE_MAX_REVIEW_ROUNDS", default_value = "3")]
    pub max_review_rounds: u32,

    /// Output poller sampling interval, in milliseconds.
    #[arg(long, env = "TELECLAUDE_POLL_INTERVAL_MS", default_value = "500")]
    pub poll_interval_ms: u64,

    /// Consecutive unchanged samples before a pane is considered idle.
    #[arg(long, env = "TELECLAUDE_IDLE_THRESHOLD_SAMPLES", default_value = "10")]
    pub idle_threshold_samples: u32,

    /// Ring buffer capacity per pane, in bytes.
    #[arg(long, env = "TELECLAUDE_RING_SIZE", default_value = "1048576")]
    pub ring_size: usize,

    /// Computer-registry heartbeat interval, in seconds. Only relevant when
    /// federation is configured.
    #[arg(long, env = "TELECLAUDE_HEARTBEAT_SECS", default_value = "30")]
    pub heartbeat_secs: u64,

    /// Seconds since last heartbeat before a peer computer is considered
    /// offline. Defaults to twice the heartbeat interval.
    #[arg(long, env = "TELECLAUDE_STALENESS_SECS")]
    pub staleness_secs: Option<u64>,

    /// Bound, in characters, of a human-mode adapter's coalesced tail
    /// message.
    #[arg(long, env = "TELECLAUDE_HUMAN_TAIL_BOUND", default_value = "3400")]
    pub human_tail_bound: usize,

    /// Maximum chat message length for peer-mode chunking.
    #[arg(long, env = "TELECLAUDE_PEER_MAX_MESSAGE_LENGTH", default_value = "4096")]
    pub peer_max_message_length: usize,

    /// Rounds per gathering phase (inhale/hold/exhale); each round cycles
    /// every speaker once in ordinal order.
    #[arg(long, env = "TELECLAUDE_GATHERING_ROUNDS_PER_PHASE", default_value = "1")]
    pub gathering_rounds_per_phase: u32,

    /// Heartbeat prompts injected into a gathering speaker's turn before
    /// the close-of-turn prompt forces an advance.
    #[arg(long, env = "TELECLAUDE_GATHERING_BEATS_PER_TURN", default_value = "3")]
    pub gathering_beats_per_turn: u32,

    /// Seconds of no detected pass before a gathering speaker's turn
    /// receives a heartbeat prompt.
    #[arg(long, env = "TELECLAUDE_GATHERING_BEAT_INTERVAL_SECS", default_value = "30")]
    pub gathering_beat_interval_secs: u64,

    /// Generous timeout, in seconds, for the harvester to produce the
    /// gathering's close-phase artifact.
    #[arg(long, env = "TELECLAUDE_GATHERING_HARVEST_TIMEOUT_SECS", default_value = "600")]
    pub gathering_harvest_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "TELECLAUDE_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TELECLAUDE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validated before the socket is bound; a `ConfigInvalid` here is
    /// fatal at startup.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.project_root.is_dir() {
            anyhow::bail!("project root {} does not exist", self.project_root.display());
        }
        if self.max_review_rounds == 0 {
            anyhow::bail!("max_review_rounds must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn effective_staleness_secs(&self) -> u64 {
        self.staleness_secs.unwrap_or(self.heartbeat_secs * 2)
    }
}
