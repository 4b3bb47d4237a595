// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive mediator for all interaction with panes. Operations on a
//! single pane are serialized; panes are concurrent with each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::pty::spawn::NativePty;
use crate::pty::{Backend, BackendInput, Boxed, ExitStatus};
use crate::ring::RingBuffer;
use crate::screen::Screen;

const DEFAULT_RING_CAPACITY: usize = 1_048_576;

/// A pane's rendered scrollback: raw PTY bytes are fed through a `Screen`
/// (VT100/ANSI-aware) and only the *rendered* text is retained in the ring,
/// so a redrawing TUI's cursor-movement and clear sequences never leak into
/// `capture()`/`read_new()` output.
struct Capture {
    screen: Screen,
    rendered: RingBuffer,
    last_lines: Vec<String>,
}

impl Capture {
    fn new(cols: u16, rows: u16, ring_capacity: usize) -> Self {
        Self {
            screen: Screen::new(cols, rows),
            rendered: RingBuffer::new(ring_capacity),
            last_lines: Vec::new(),
        }
    }

    fn feed(&mut self, data: &[u8]) {
        self.screen.feed(data);
        let lines = self.screen.rendered_lines();
        let delta = rendered_delta(&self.last_lines, &lines);
        if !delta.is_empty() {
            self.rendered.write(delta.as_bytes());
        }
        self.last_lines = lines;
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.screen.resize(cols, rows);
    }
}

/// Diffs the previous rendered screen against the current one. When the new
/// view is a continuation (current screen starts with every line of the
/// last screen, plus more), only the newly appeared lines are new content;
/// otherwise the screen redrew in place (e.g. a TUI repainting) and the
/// whole current view is the delta.
fn rendered_delta(last: &[String], current: &[String]) -> String {
    if current.len() >= last.len() && current[..last.len()] == *last {
        if current.len() == last.len() {
            return String::new();
        }
        return current[last.len()..].join("\n") + "\n";
    }
    if current == last {
        return String::new();
    }
    let mut joined = current.join("\n");
    joined.push('\n');
    joined
}

struct Pane {
    input_tx: mpsc::Sender<BackendInput>,
    resize_tx: mpsc::Sender<(u16, u16)>,
    capture: Arc<StdMutex<Capture>>,
    child_pid: Option<u32>,
    exited: Arc<AtomicBool>,
    exit_status: Arc<StdMutex<Option<ExitStatus>>>,
    exit_marker: String,
    _backend_task: JoinHandle<()>,
    _drain_task: JoinHandle<()>,
}

/// Wraps the native PTY spawn mechanism with the `create_pane` / `send_input`
/// / `capture` / `destroy` surface.
pub struct TerminalBridge {
    panes: RwLock<HashMap<String, Arc<Pane>>>,
    ring_capacity: usize,
}

impl Default for TerminalBridge {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl TerminalBridge {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            panes: RwLock::new(HashMap::new()),
            ring_capacity,
        }
    }

    /// Create a named pane running `command`. Fails if `name` already
    /// exists.
    pub async fn create_pane(
        &self,
        name: &str,
        command: &[String],
        cols: u16,
        rows: u16,
        cwd: Option<&str>,
    ) -> Result<(), BridgeError> {
        {
            let panes = self.panes.read().await;
            if panes.contains_key(name) {
                return Err(BridgeError::PaneAlreadyExists(name.to_owned()));
            }
        }

        let mut backend = NativePty::spawn(command, cols, rows, cwd)
            .map_err(|e| BridgeError::SessionSpawnFailed(e.to_string()))?
            .boxed();

        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<BackendInput>(256);
        let (resize_tx, resize_rx) = mpsc::channel::<(u16, u16)>(4);

        let child_pid = backend.child_pid();
        let exited = Arc::new(AtomicBool::new(false));
        let exit_status = Arc::new(StdMutex::new(None));

        let exited_for_task = Arc::clone(&exited);
        let exit_status_for_task = Arc::clone(&exit_status);
        let pane_name = name.to_owned();
        let backend_task = tokio::spawn(async move {
            let result = run_backend(backend.as_mut(), output_tx, input_rx, resize_rx).await;
            match result {
                Ok(status) => *exit_status_for_task.lock().expect("exit status lock") = Some(status),
                Err(e) => warn!(pane = %pane_name, error = %e, "pane backend exited with error"),
            }
            exited_for_task.store(true, Ordering::Release);
        });

        let capture = Arc::new(StdMutex::new(Capture::new(cols, rows, self.ring_capacity)));
        let capture_drain_handle = Arc::clone(&capture);
        let drain_task = tokio::spawn(async move {
            while let Some(chunk) = output_rx.recv().await {
                capture_drain_handle.lock().expect("capture lock").feed(&chunk);
            }
        });

        let pane = Arc::new(Pane {
            input_tx,
            resize_tx,
            capture,
            child_pid,
            exited,
            exit_status,
            exit_marker: format!("__teleclaude_exit_{name}__"),
            _backend_task: backend_task,
            _drain_task: drain_task,
        });

        self.panes.write().await.insert(name.to_owned(), pane);
        debug!(pane = %name, "pane created");
        Ok(())
    }

    /// Writes `text` followed by a newline; if `append_exit_marker` is set,
    /// also writes a sentinel that the poller watches for.
    pub async fn send_input(
        &self,
        handle: &str,
        text: &str,
        append_exit_marker: bool,
    ) -> Result<(), BridgeError> {
        let pane = self.lookup(handle).await?;
        if pane.exited.load(Ordering::Acquire) {
            return Err(BridgeError::PaneNotFound(handle.to_owned()));
        }

        let mut payload = format!("{text}\n");
        if append_exit_marker {
            payload.push_str(&format!("echo '{}'\n", pane.exit_marker));
        }

        pane.input_tx
            .send(BackendInput::Write(Bytes::from(payload)))
            .await
            .map_err(|_| BridgeError::PaneNotFound(handle.to_owned()))
    }

    /// Resize a pane's pty and its rendering screen together, so captured
    /// text reflows at the new width rather than wrapping at a stale one.
    pub async fn resize(&self, handle: &str, cols: u16, rows: u16) -> Result<(), BridgeError> {
        let pane = self.lookup(handle).await?;
        pane.capture.lock().expect("capture lock").resize(cols, rows);
        pane.resize_tx
            .send((cols, rows))
            .await
            .map_err(|_| BridgeError::PaneNotFound(handle.to_owned()))
    }

    /// Returns the scrollback-bounded, VT100-rendered pane text.
    pub async fn capture(&self, handle: &str) -> Result<String, BridgeError> {
        let pane = self.lookup(handle).await?;
        let bytes = pane.capture.lock().expect("capture lock").rendered.snapshot();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Returns only the rendered text produced since `cursor`, advancing it.
    /// Used by `OutputPoller` in place of a baseline-prefix diff, which
    /// breaks once the ring wraps.
    pub async fn capture_new(&self, handle: &str, cursor: &mut u64) -> Result<String, BridgeError> {
        let pane = self.lookup(handle).await?;
        let bytes = pane.capture.lock().expect("capture lock").rendered.read_new(cursor);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// The sentinel string this pane writes when `send_input` is called with
    /// `append_exit_marker = true`.
    pub async fn exit_marker(&self, handle: &str) -> Result<String, BridgeError> {
        Ok(self.lookup(handle).await?.exit_marker.clone())
    }

    pub async fn is_alive(&self, handle: &str) -> bool {
        match self.panes.read().await.get(handle) {
            Some(pane) => !pane.exited.load(Ordering::Acquire),
            None => false,
        }
    }

    /// Idempotent: destroying an already-destroyed or unknown pane succeeds.
    pub async fn destroy(&self, handle: &str) {
        let pane = self.panes.write().await.remove(handle);
        if let Some(pane) = pane {
            if let Some(pid) = pane.child_pid {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGHUP);
            }
            pane._backend_task.abort();
            pane._drain_task.abort();
            debug!(pane = %handle, "pane destroyed");
        }
    }

    async fn lookup(&self, handle: &str) -> Result<Arc<Pane>, BridgeError> {
        self.panes
            .read()
            .await
            .get(handle)
            .cloned()
            .ok_or_else(|| BridgeError::PaneNotFound(handle.to_owned()))
    }
}

async fn run_backend(
    backend: &mut dyn Backend,
    output_tx: mpsc::Sender<Bytes>,
    input_rx: mpsc::Receiver<BackendInput>,
    resize_rx: mpsc::Receiver<(u16, u16)>,
) -> anyhow::Result<ExitStatus> {
    backend.run(output_tx, input_rx, resize_rx).await
}
