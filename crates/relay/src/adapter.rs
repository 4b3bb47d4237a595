// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The adapter port and the two per-session output-delivery modes: human
//! (coalescing, editable tail message) and peer (chunked, append-only).

use std::time::Duration;

use async_trait::async_trait;

pub const DEFAULT_HUMAN_TAIL_BOUND: usize = 3_400;
pub const DEFAULT_PEER_MAX_MESSAGE_LENGTH: usize = 4_096;

/// Capability set any chat-platform adapter must satisfy. Adapters are
/// selected at startup and bound to sessions at spawn.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    async fn send(&self, session_id: &str, text: &str) -> anyhow::Result<String>;
    async fn edit(&self, session_id: &str, message_id: &str, text: &str) -> anyhow::Result<()>;
    fn max_message_length(&self) -> usize {
        DEFAULT_PEER_MAX_MESSAGE_LENGTH
    }
    fn peer_poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }
}

/// Human-mode output manager: maintains a single bounded "tail" message,
/// edited in place. Truncation is from the top; a transcript link is
/// appended once truncation has occurred.
pub struct HumanTail {
    bound: usize,
    transcript_url: Option<String>,
    buffer: String,
    message_id: Option<String>,
    truncated: bool,
}

impl HumanTail {
    pub fn new(bound: usize, transcript_url: Option<String>) -> Self {
        Self {
            bound,
            transcript_url,
            buffer: String::new(),
            message_id: None,
            truncated: false,
        }
    }

    /// Folds a new delta into the tail buffer and pushes the result through
    /// `adapter`, creating the message on first use and editing thereafter.
    pub async fn append(
        &mut self,
        adapter: &dyn Adapter,
        session_id: &str,
        delta: &str,
    ) -> anyhow::Result<()> {
        self.buffer.push_str(delta);
        if self.buffer.len() > self.bound {
            let excess = self.buffer.len() - self.bound;
            let cut = floor_char_boundary(&self.buffer, excess);
            self.buffer.drain(..cut);
            self.truncated = true;
        }

        let rendered = self.render();
        match &self.message_id {
            Some(id) => adapter.edit(session_id, id, &rendered).await,
            None => {
                let id = adapter.send(session_id, &rendered).await?;
                self.message_id = Some(id);
                Ok(())
            }
        }
    }

    fn render(&self) -> String {
        if self.truncated {
            if let Some(url) = &self.transcript_url {
                return format!("{}\n\n[truncated; full transcript: {url}]", self.buffer);
            }
        }
        self.buffer.clone()
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut idx = index.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Peer-mode output manager: each delta becomes one or more sequential,
/// append-only messages, chunked to the adapter's max length with
/// `[Chunk k/n]` markers, followed by a terminal `[Output Complete]`
/// message once the session's poller reports exit.
pub struct PeerChunker {
    max_len: usize,
}

impl PeerChunker {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub async fn deliver_delta(
        &self,
        adapter: &dyn Adapter,
        session_id: &str,
        delta: &str,
    ) -> anyhow::Result<()> {
        let chunks = self.chunk(delta);
        let n = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let marker = format!("[Chunk {}/{n}]", i + 1);
            adapter.send(session_id, &format!("{marker}\n{chunk}")).await?;
        }
        Ok(())
    }

    pub async fn deliver_complete(&self, adapter: &dyn Adapter, session_id: &str) -> anyhow::Result<()> {
        adapter.send(session_id, "[Output Complete]").await?;
        Ok(())
    }

    fn chunk(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec![String::new()];
        }
        // Reserve room for the `[Chunk k/n]\n` marker itself.
        let budget = self.max_len.saturating_sub(32).max(1);
        let mut chunks = Vec::new();
        let bytes = text.as_bytes();
        let mut start = 0;
        while start < bytes.len() {
            let end = floor_char_boundary(text, (start + budget).min(bytes.len()));
            let end = if end <= start { (start + 1).min(bytes.len()) } else { end };
            chunks.push(text[start..end].to_owned());
            start = end;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeAdapter {
        sent: Mutex<Vec<String>>,
        edited: Mutex<Vec<(String, String)>>,
        max_len: usize,
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        async fn send(&self, _session_id: &str, text: &str) -> anyhow::Result<String> {
            self.sent.lock().unwrap().push(text.to_owned());
            Ok(format!("msg-{}", self.sent.lock().unwrap().len()))
        }
        async fn edit(&self, _session_id: &str, message_id: &str, text: &str) -> anyhow::Result<()> {
            self.edited.lock().unwrap().push((message_id.to_owned(), text.to_owned()));
            Ok(())
        }
        fn max_message_length(&self) -> usize {
            self.max_len
        }
    }

    #[tokio::test]
    async fn human_tail_edits_after_first_send() {
        let adapter = FakeAdapter { sent: Mutex::new(vec![]), edited: Mutex::new(vec![]), max_len: 4096 };
        let mut tail = HumanTail::new(100, None);
        tail.append(&adapter, "s1", "hello ").await.unwrap();
        tail.append(&adapter, "s1", "world").await.unwrap();

        assert_eq!(adapter.sent.lock().unwrap().len(), 1);
        assert_eq!(adapter.edited.lock().unwrap().len(), 1);
        assert_eq!(adapter.edited.lock().unwrap()[0].1, "hello world");
    }

    #[tokio::test]
    async fn human_tail_truncates_from_top() {
        let adapter = FakeAdapter { sent: Mutex::new(vec![]), edited: Mutex::new(vec![]), max_len: 4096 };
        let mut tail = HumanTail::new(10, Some("https://t/1".to_owned()));
        tail.append(&adapter, "s1", "0123456789abcdef").await.unwrap();
        let sent = adapter.sent.lock().unwrap();
        assert!(sent[0].contains("truncated"));
        assert!(sent[0].starts_with("6789abcdef"));
    }

    #[tokio::test]
    async fn peer_chunker_splits_and_marks_complete() {
        let adapter = FakeAdapter { sent: Mutex::new(vec![]), edited: Mutex::new(vec![]), max_len: 4096 };
        let chunker = PeerChunker::new(4096);
        let text = "x".repeat(9500);
        chunker.deliver_delta(&adapter, "s1", &text).await.unwrap();
        chunker.deliver_complete(&adapter, "s1").await.unwrap();

        let sent = adapter.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert!(sent[0].starts_with("[Chunk 1/3]"));
        assert!(sent[1].starts_with("[Chunk 2/3]"));
        assert!(sent[2].starts_with("[Chunk 3/3]"));
        assert_eq!(sent[3], "[Output Complete]");
    }
}
