// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives the `inhale -> hold -> exhale -> close` gathering ceremony over a
//! set of already-live sessions: broadcasts phase banners, runs each
//! speaker's turn with heartbeat/pass detection via [`teleclaude_relay::gathering`],
//! and harvests a closing artifact from the distinguished harvester.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use teleclaude_bridge::{OutputPoller, SessionEvent, TerminalBridge};
use teleclaude_relay::{
    close_of_turn_prompt, harvest_prompt, heartbeat_prompt, ParticipantRole, PassDetector, Phase,
    RelayHub, RelayParticipant, TalkingPiece,
};

use crate::error::DaemonError;

#[derive(Debug, Clone)]
pub struct GatheringConfig {
    pub rounds_per_phase: u32,
    pub beats_per_turn: u32,
    pub beat_interval: Duration,
    pub harvest_timeout: Duration,
}

pub struct GatheringRunner {
    bridge: Arc<TerminalBridge>,
    relay_hub: Arc<RelayHub>,
    config: GatheringConfig,
}

impl GatheringRunner {
    pub fn new(bridge: Arc<TerminalBridge>, relay_hub: Arc<RelayHub>, config: GatheringConfig) -> Self {
        Self { bridge, relay_hub, config }
    }

    /// Runs the full ceremony over `participants` (already spawned and
    /// seeded by the caller) and returns the harvester's produced artifact.
    /// `handles` maps each participant's `session_id` to its terminal
    /// handle.
    pub async fn run(
        &self,
        participants: Vec<RelayParticipant>,
        handles: &HashMap<String, String>,
    ) -> Result<String, DaemonError> {
        let harvester_id = participants
            .iter()
            .find(|p| p.role == ParticipantRole::Harvester)
            .map(|p| p.session_id.clone())
            .ok_or_else(|| DaemonError::ConfigInvalid("gathering requires exactly one harvester".to_owned()))?;

        let relay_id = self.relay_hub.start_gathering(participants.clone()).await?;
        let mut piece = TalkingPiece::new(&participants, self.config.beats_per_turn);
        let pass_detector = PassDetector::default();
        let mut phase = Phase::Inhale;

        loop {
            self.broadcast(&participants, handles, phase.banner()).await;

            if phase == Phase::Close {
                let harvester_handle = handles.get(&harvester_id).cloned().ok_or_else(|| {
                    DaemonError::ConfigInvalid(format!("no terminal handle for harvester {harvester_id}"))
                })?;
                self.bridge.send_input(&harvester_handle, harvest_prompt(), true).await?;
                let event = self.await_harvester(&harvester_handle).await?;
                let outcome = match event {
                    SessionEvent::ExitedNormally { .. } => self.bridge.capture(&harvester_handle).await.map_err(DaemonError::from),
                    SessionEvent::ExitedAbnormally { reason } => Err(DaemonError::WaitTimedOut(reason)),
                    _ => unreachable!("await_harvester only returns terminal events"),
                };
                self.relay_hub.end(&relay_id).await;
                return outcome;
            }

            for _round in 0..self.config.rounds_per_phase {
                for _ in 0..piece.speakers_len() {
                    let speaker_id = piece
                        .current_speaker()
                        .map(str::to_owned)
                        .ok_or_else(|| DaemonError::ConfigInvalid("gathering has no speakers".to_owned()))?;
                    let handle = handles
                        .get(&speaker_id)
                        .cloned()
                        .ok_or_else(|| DaemonError::ConfigInvalid(format!("no terminal handle for {speaker_id}")))?;

                    self.bridge.send_input(&handle, &format!("{} — your turn", phase.banner()), false).await?;
                    self.run_speaker_turn(&speaker_id, &handle, &mut piece, &pass_detector).await?;
                    piece.advance();
                }
            }

            phase = phase.next().expect("close phase handled above");
        }
    }

    /// Monitors a speaker's pane until a pass is detected, the pane exits,
    /// or the beat limit is reached (injecting heartbeat/close-of-turn
    /// prompts along the way).
    async fn run_speaker_turn(
        &self,
        speaker_id: &str,
        handle: &str,
        piece: &mut TalkingPiece,
        pass_detector: &PassDetector,
    ) -> Result<(), DaemonError> {
        let mut cursor: u64 = 0;
        let _ = self.bridge.capture_new(handle, &mut cursor).await;

        loop {
            match self.wait_for_delta(handle, &mut cursor).await {
                Some(delta) => {
                    if let Err(e) = self.relay_hub.fan_out(speaker_id, &delta).await {
                        warn!(session_id = %speaker_id, error = %e, "gathering fan-out failed");
                    }
                    if pass_detector.detects_pass(&delta) {
                        return Ok(());
                    }
                }
                None => {
                    if !self.bridge.is_alive(handle).await {
                        return Ok(());
                    }
                    if piece.tick() {
                        self.bridge.send_input(handle, close_of_turn_prompt(), false).await?;
                        return Ok(());
                    }
                    self.bridge
                        .send_input(handle, &heartbeat_prompt(piece.beat(), self.config.beats_per_turn), false)
                        .await?;
                }
            }
        }
    }

    /// Polls `handle` for new output until one arrives or `beat_interval`
    /// elapses with nothing new.
    async fn wait_for_delta(&self, handle: &str, cursor: &mut u64) -> Option<String> {
        let deadline = tokio::time::Instant::now() + self.config.beat_interval;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match self.bridge.capture_new(handle, cursor).await {
                Ok(delta) if !delta.is_empty() => return Some(delta),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    async fn broadcast(&self, participants: &[RelayParticipant], handles: &HashMap<String, String>, text: &str) {
        for p in participants {
            let Some(handle) = handles.get(&p.session_id) else { continue };
            if let Err(e) = self.bridge.send_input(handle, text, false).await {
                warn!(session_id = %p.session_id, error = %e, "gathering broadcast failed");
            }
        }
    }

    async fn await_harvester(&self, handle: &str) -> Result<SessionEvent, DaemonError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let poller = OutputPoller::new(Arc::clone(&self.bridge), handle.to_owned());
        let poller_shutdown = shutdown.clone();
        let poller_task = tokio::spawn(async move { poller.run(tx, poller_shutdown).await });

        let result = tokio::time::timeout(self.config.harvest_timeout, async {
            while let Some(event) = rx.recv().await {
                if event.is_terminal() {
                    return Some(event);
                }
            }
            None
        })
        .await;

        shutdown.cancel();
        let _ = poller_task.await;

        match result {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(DaemonError::WaitTimedOut(format!("{handle} poller channel closed"))),
            Err(_) => Err(DaemonError::WaitTimedOut(handle.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_cloneable_and_debuggable() {
        let config = GatheringConfig {
            rounds_per_phase: 1,
            beats_per_turn: 3,
            beat_interval: Duration::from_secs(30),
            harvest_timeout: Duration::from_secs(600),
        };
        let cloned = config.clone();
        assert_eq!(cloned.beats_per_turn, 3);
        assert!(format!("{cloned:?}").contains("beats_per_turn"));
    }
}
