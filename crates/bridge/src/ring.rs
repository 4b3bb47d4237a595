// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Fixed-capacity circular byte buffer backing a pane's scrollback-bounded
/// capture.
///
/// Tracks the total number of bytes ever written so `capture` can hand back
/// the retained tail without re-allocating on every poll. When the buffer
/// wraps, older data is silently discarded.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    write_pos: usize,
    total_written: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)],
            capacity: capacity.max(1),
            write_pos: 0,
            total_written: 0,
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.capacity) {
            let start = self.write_pos;
            let end = start + chunk.len();

            if end <= self.capacity {
                self.buf[start..end].copy_from_slice(chunk);
            } else {
                let first = self.capacity - start;
                self.buf[start..self.capacity].copy_from_slice(&chunk[..first]);
                self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
            }

            self.write_pos = end % self.capacity;
            self.total_written += chunk.len() as u64;
        }
    }

    /// Retained bytes, oldest first. Bounded by `capacity`.
    pub fn snapshot(&self) -> Vec<u8> {
        let retained = self.total_written.min(self.capacity as u64) as usize;
        if retained == 0 {
            return Vec::new();
        }
        let start = if self.total_written as usize <= self.capacity {
            0
        } else {
            self.write_pos
        };
        let mut out = Vec::with_capacity(retained);
        out.extend_from_slice(&self.buf[start..self.capacity]);
        out.extend_from_slice(&self.buf[..start]);
        out.truncate(retained);
        out
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Bytes written since `cursor`, clamped to what's still retained, then
    /// advances `cursor` to the buffer's current write position.
    ///
    /// If `cursor` points further back than the oldest retained byte (the
    /// caller fell behind by more than `capacity`), the unrecoverable gap is
    /// dropped rather than re-sent: the retained tail is returned exactly
    /// once, not re-emitted on every subsequent call the way re-diffing a
    /// stale prefix would.
    pub fn read_new(&self, cursor: &mut u64) -> Vec<u8> {
        let retained_from = self.total_written.saturating_sub(self.capacity as u64);
        let from = (*cursor).max(retained_from);
        *cursor = self.total_written;
        if from >= self.total_written {
            return Vec::new();
        }
        let skip = (from - retained_from) as usize;
        let mut out = self.snapshot();
        out.drain(..skip.min(out.len()));
        out
    }
}
