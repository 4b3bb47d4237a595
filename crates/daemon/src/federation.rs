// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Computer registry: a presence table for peer daemons reachable over the
//! shared chat channel. Federation between daemons is by message-bus
//! convention and explicitly lossy — this tracks liveness only, never
//! session state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use teleclaude_bridge::Store;

const STORE_PREFIX: &str = "computer/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputerRecord {
    pub computer_id: String,
    pub last_heartbeat: u64,
}

/// Tracks the last-seen heartbeat of every computer this daemon has heard
/// from, including itself. Staleness is derived, not pushed: a reader
/// decides a peer is offline rather than the registry evicting it.
pub struct ComputerRegistry {
    self_id: String,
    store: Arc<dyn Store>,
    peers: RwLock<HashMap<String, ComputerRecord>>,
}

impl ComputerRegistry {
    pub fn new(self_id: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self {
            self_id: self_id.into(),
            store,
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_heartbeat(&self, computer_id: &str) {
        let record = ComputerRecord {
            computer_id: computer_id.to_owned(),
            last_heartbeat: epoch_secs(),
        };
        if let Ok(bytes) = serde_json::to_vec(&record) {
            let key = format!("{STORE_PREFIX}{computer_id}");
            let _ = self.store.put(&key, bytes).await;
        }
        self.peers.write().await.insert(computer_id.to_owned(), record);
    }

    pub async fn snapshot(&self) -> Vec<ComputerRecord> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn is_stale(&self, computer_id: &str, staleness_secs: u64) -> bool {
        match self.peers.read().await.get(computer_id) {
            Some(record) => epoch_secs().saturating_sub(record.last_heartbeat) > staleness_secs,
            None => true,
        }
    }

    /// Background task: records this daemon's own heartbeat on a fixed
    /// cadence until `shutdown` fires.
    pub async fn run_heartbeat(self: Arc<Self>, interval: std::time::Duration, shutdown: CancellationToken) {
        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("heartbeat task stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let id = self.self_id.clone();
                    self.record_heartbeat(&id).await;
                    debug!(computer_id = %id, "heartbeat recorded");
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use teleclaude_bridge::MemoryStore;

    #[tokio::test]
    async fn unknown_computer_is_stale() {
        let registry = ComputerRegistry::new("here", Arc::new(MemoryStore::new()) as Arc<dyn Store>);
        assert!(registry.is_stale("elsewhere", 60).await);
    }

    #[tokio::test]
    async fn fresh_heartbeat_is_not_stale() {
        let registry = ComputerRegistry::new("here", Arc::new(MemoryStore::new()) as Arc<dyn Store>);
        registry.record_heartbeat("here").await;
        assert!(!registry.is_stale("here", 60).await);
    }
}
