// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal bridge, output poller, and session registry: the layer that
//! owns every live pane on this host.

mod bridge;
pub mod error;
pub mod event;
pub mod poller;
pub mod pty;
pub mod ring;
mod screen;
pub mod session;
pub mod store;

pub use bridge::TerminalBridge;
pub use error::BridgeError;
pub use event::SessionEvent;
pub use poller::OutputPoller;
pub use session::{AgentKind, ChatBinding, Session, SessionRegistry, SessionRole, SessionSpec};
pub use store::{MemoryStore, Store};
