// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session loop that samples rendered pane text, reads only what's new
//! since the last sample, and emits typed [`SessionEvent`]s.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::TerminalBridge;
use crate::error::BridgeError;
use crate::event::SessionEvent;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5);

/// Samples one pane on a fixed interval and emits the lazy `SessionEvent`
/// sequence described for the output poller. Events from a single poller
/// are totally ordered; cancelling `shutdown` stops the sequence at the
/// next sample boundary without leaking the polling task.
pub struct OutputPoller {
    bridge: Arc<TerminalBridge>,
    handle: String,
    poll_interval: Duration,
    idle_threshold: Duration,
}

impl OutputPoller {
    pub fn new(bridge: Arc<TerminalBridge>, handle: impl Into<String>) -> Self {
        Self {
            bridge,
            handle: handle.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Runs until the pane reports exit or `shutdown` is cancelled, sending
    /// every emitted event on `event_tx`. Returns without error in both
    /// cases; a closed `event_tx` also stops the loop.
    pub async fn run(self, event_tx: mpsc::Sender<SessionEvent>, shutdown: CancellationToken) {
        let exit_marker = self.bridge.exit_marker(&self.handle).await.ok();
        let idle_samples_threshold =
            (self.idle_threshold.as_millis() / self.poll_interval.as_millis().max(1)).max(1) as u32;

        let mut cursor: u64 = 0;
        let mut idle_samples: u32 = 0;
        let mut idle_armed = false;
        let mut first_seen_at = epoch_ms();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(pane = %self.handle, "poller cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let delta = match self.bridge.capture_new(&self.handle, &mut cursor).await {
                Ok(text) => text,
                Err(BridgeError::PaneNotFound(_)) => {
                    let _ = event_tx
                        .send(SessionEvent::ExitedAbnormally {
                            reason: "pane_lost".to_owned(),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    let _ = event_tx
                        .send(SessionEvent::ExitedAbnormally {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            if let Some(marker) = &exit_marker {
                if delta.contains(marker.as_str()) {
                    let _ = event_tx
                        .send(SessionEvent::ExitedNormally {
                            exit_marker_seen: true,
                        })
                        .await;
                    return;
                }
            }

            if !self.bridge.is_alive(&self.handle).await {
                let _ = event_tx
                    .send(SessionEvent::ExitedNormally {
                        exit_marker_seen: false,
                    })
                    .await;
                return;
            }

            if delta.is_empty() {
                idle_samples += 1;
                if idle_samples >= idle_samples_threshold && !idle_armed {
                    idle_armed = true;
                    if event_tx
                        .send(SessionEvent::IdleDetected { since: epoch_ms() })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                continue;
            }

            idle_samples = 0;
            idle_armed = false;
            let now = epoch_ms();
            if event_tx
                .send(SessionEvent::OutputChanged {
                    text_delta: delta,
                    first_seen_at,
                    stable_since: now,
                })
                .await
                .is_err()
            {
                return;
            }
            first_seen_at = now;
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
