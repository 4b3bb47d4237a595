// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 6: peer-mode chunking of a single large output delta.

use std::sync::Mutex;

use async_trait::async_trait;
use teleclaude_relay::{Adapter, PeerChunker};

struct RecordingAdapter {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Adapter for RecordingAdapter {
    async fn send(&self, _session_id: &str, text: &str) -> anyhow::Result<String> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(text.to_owned());
        Ok(format!("msg-{}", sent.len()))
    }

    async fn edit(&self, _session_id: &str, _message_id: &str, _text: &str) -> anyhow::Result<()> {
        panic!("peer mode never edits");
    }

    fn max_message_length(&self) -> usize {
        4096
    }
}

#[tokio::test]
async fn scenario_6_peer_chunking_emits_three_chunks_then_output_complete() {
    let adapter = RecordingAdapter { sent: Mutex::new(Vec::new()) };
    let chunker = PeerChunker::new(adapter.max_message_length());

    let delta = "x".repeat(9500);
    chunker.deliver_delta(&adapter, "peer-session", &delta).await.unwrap();
    // Session's poller reports ExitedNormally.
    chunker.deliver_complete(&adapter, "peer-session").await.unwrap();

    let sent = adapter.sent.lock().unwrap();
    assert_eq!(sent.len(), 4, "expected 3 chunks plus a terminal message");
    assert!(sent[0].starts_with("[Chunk 1/3]"));
    assert!(sent[1].starts_with("[Chunk 2/3]"));
    assert!(sent[2].starts_with("[Chunk 3/3]"));
    assert_eq!(sent[3], "[Output Complete]");

    let reassembled: String = sent[..3]
        .iter()
        .map(|chunk| chunk.split_once('\n').map(|(_, body)| body).unwrap_or(""))
        .collect();
    assert_eq!(reassembled.len(), delta.len());
}
