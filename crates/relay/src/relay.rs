// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! N-way routing table on top of per-session pollers: delivers one
//! session's output to the other participants with attribution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RelayError;

/// Port the relay uses to push attributed text into a peer's pane. The
/// daemon implements this over the terminal bridge / session registry.
#[async_trait]
pub trait RelaySink: Send + Sync + 'static {
    async fn deliver(&self, session_id: &str, text: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Speaker,
    Harvester,
    Human,
}

#[derive(Debug, Clone)]
pub struct RelayParticipant {
    pub session_id: String,
    pub display_name: String,
    pub ordinal: u32,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    OneToOne,
    Gathering,
}

/// A routing table over a fixed set of participants. Baselines advance
/// monotonically; a delta delivered to peers is folded into the sender's
/// baseline immediately to prevent echo.
pub struct Relay {
    pub relay_id: String,
    pub participants: Vec<RelayParticipant>,
    pub mode: RelayMode,
    pub active: bool,
    baselines: HashMap<String, String>,
}

impl Relay {
    fn new(participants: Vec<RelayParticipant>, mode: RelayMode) -> Self {
        Self {
            relay_id: Uuid::new_v4().to_string(),
            baselines: participants
                .iter()
                .map(|p| (p.session_id.clone(), String::new()))
                .collect(),
            participants,
            mode,
            active: true,
        }
    }

    pub fn participant(&self, session_id: &str) -> Option<&RelayParticipant> {
        self.participants.iter().find(|p| p.session_id == session_id)
    }

    fn others(&self, sender: &str) -> impl Iterator<Item = &RelayParticipant> {
        let mut rest: Vec<&RelayParticipant> = self
            .participants
            .iter()
            .filter(|p| p.session_id != sender)
            .collect();
        rest.sort_by_key(|p| p.ordinal);
        rest.into_iter()
    }
}

/// Owns every active relay and the at-most-one-active-relay invariant per
/// session.
pub struct RelayHub {
    sink: Arc<dyn RelaySink>,
    relays: RwLock<HashMap<String, Relay>>,
    session_to_relay: RwLock<HashMap<String, String>>,
}

impl RelayHub {
    pub fn new(sink: Arc<dyn RelaySink>) -> Self {
        Self {
            sink,
            relays: RwLock::new(HashMap::new()),
            session_to_relay: RwLock::new(HashMap::new()),
        }
    }

    /// Establishes a one-shot direct peer link between two sessions.
    /// Idempotent: a second call for the same pair returns the existing
    /// relay rather than creating a second one.
    pub async fn direct_link(
        &self,
        a: RelayParticipant,
        b: RelayParticipant,
    ) -> Result<String, RelayError> {
        {
            let index = self.session_to_relay.read().await;
            if let Some(existing) = index.get(&a.session_id) {
                let relays = self.relays.read().await;
                if let Some(relay) = relays.get(existing) {
                    if relay.mode == RelayMode::OneToOne && relay.participant(&b.session_id).is_some() {
                        return Ok(existing.clone());
                    }
                }
                return Err(RelayError::AlreadyInRelay(a.session_id.clone()));
            }
            if index.contains_key(&b.session_id) {
                return Err(RelayError::AlreadyInRelay(b.session_id.clone()));
            }
        }

        let a_id = a.session_id.clone();
        let b_id = b.session_id.clone();
        let relay = Relay::new(vec![a, b], RelayMode::OneToOne);
        let relay_id = relay.relay_id.clone();

        self.relays.write().await.insert(relay_id.clone(), relay);
        let mut index = self.session_to_relay.write().await;
        index.insert(a_id, relay_id.clone());
        index.insert(b_id, relay_id.clone());

        debug!(relay_id = %relay_id, "direct link established");
        Ok(relay_id)
    }

    /// Starts a gathering. Refuses if any participant is already in an
    /// active relay (nested-gathering guard).
    pub async fn start_gathering(
        &self,
        participants: Vec<RelayParticipant>,
    ) -> Result<String, RelayError> {
        {
            let index = self.session_to_relay.read().await;
            for p in &participants {
                if index.contains_key(&p.session_id) {
                    return Err(RelayError::AlreadyInRelay(p.session_id.clone()));
                }
            }
        }

        let relay = Relay::new(participants, RelayMode::Gathering);
        let relay_id = relay.relay_id.clone();
        let ids: Vec<String> = relay.participants.iter().map(|p| p.session_id.clone()).collect();

        self.relays.write().await.insert(relay_id.clone(), relay);
        let mut index = self.session_to_relay.write().await;
        for id in ids {
            index.insert(id, relay_id.clone());
        }

        Ok(relay_id)
    }

    pub async fn relay_for_session(&self, session_id: &str) -> Option<String> {
        self.session_to_relay.read().await.get(session_id).cloned()
    }

    /// Fan out `text_delta` from `sender` to every other participant, in
    /// ordinal order, then fold the delta into the sender's baseline.
    ///
    /// For a gathering, only the current speaker's output is fanned out;
    /// callers enforce the talking-piece check before invoking this for
    /// gathering relays (see [`crate::gathering`]).
    pub async fn fan_out(&self, sender: &str, text_delta: &str) -> Result<(), RelayError> {
        let relay_id = self
            .session_to_relay
            .read()
            .await
            .get(sender)
            .cloned()
            .ok_or_else(|| RelayError::NotInRelay(sender.to_owned()))?;

        let mut relays = self.relays.write().await;
        let relay = relays
            .get_mut(&relay_id)
            .ok_or_else(|| RelayError::NotInRelay(sender.to_owned()))?;

        let display_name = relay
            .participant(sender)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| sender.to_owned());
        let ordinal = relay.participant(sender).map(|p| p.ordinal).unwrap_or(0);
        let attributed = format!("[{display_name} ({ordinal})]:\n{text_delta}");

        let targets: Vec<String> = relay.others(sender).map(|p| p.session_id.clone()).collect();
        for target in targets {
            if let Err(e) = self.sink.deliver(&target, &attributed).await {
                warn!(target = %target, error = %e, "relay delivery failed");
            }
        }

        relay
            .baselines
            .entry(sender.to_owned())
            .and_modify(|b| b.push_str(text_delta))
            .or_insert_with(|| text_delta.to_owned());

        Ok(())
    }

    /// Ends a relay, releasing its participants from the
    /// at-most-one-active-relay index.
    pub async fn end(&self, relay_id: &str) {
        let relay = self.relays.write().await.remove(relay_id);
        if let Some(relay) = relay {
            let mut index = self.session_to_relay.write().await;
            for p in &relay.participants {
                index.remove(&p.session_id);
            }
        }
    }

    pub async fn is_active(&self, relay_id: &str) -> bool {
        self.relays
            .read()
            .await
            .get(relay_id)
            .map(|r| r.active)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        delivered: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RelaySink for RecordingSink {
        async fn deliver(&self, session_id: &str, text: &str) -> anyhow::Result<()> {
            self.delivered
                .lock()
                .unwrap()
                .push((session_id.to_owned(), text.to_owned()));
            Ok(())
        }
    }

    fn participant(id: &str, ordinal: u32) -> RelayParticipant {
        RelayParticipant {
            session_id: id.to_owned(),
            display_name: id.to_owned(),
            ordinal,
            role: ParticipantRole::Speaker,
        }
    }

    #[tokio::test]
    async fn direct_link_is_idempotent() {
        let sink = Arc::new(RecordingSink { delivered: StdMutex::new(vec![]) });
        let hub = RelayHub::new(sink);

        let r1 = hub
            .direct_link(participant("a", 0), participant("b", 1))
            .await
            .unwrap();
        let r2 = hub
            .direct_link(participant("a", 0), participant("b", 1))
            .await
            .unwrap();
        assert_eq!(r1, r2);
    }

    #[tokio::test]
    async fn fan_out_delivers_to_other_participant_only() {
        let sink = Arc::new(RecordingSink { delivered: StdMutex::new(vec![]) });
        let hub = RelayHub::new(Arc::clone(&sink) as Arc<dyn RelaySink>);

        hub.direct_link(participant("a", 0), participant("b", 1))
            .await
            .unwrap();
        hub.fan_out("a", "hello").await.unwrap();

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "b");
        assert!(delivered[0].1.contains("hello"));
    }

    #[tokio::test]
    async fn nested_gathering_guard_rejects_busy_participant() {
        let sink = Arc::new(RecordingSink { delivered: StdMutex::new(vec![]) });
        let hub = RelayHub::new(sink);

        hub.direct_link(participant("a", 0), participant("b", 1))
            .await
            .unwrap();
        let err = hub
            .start_gathering(vec![participant("a", 0), participant("c", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::AlreadyInRelay(_)));
    }
}
