// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-to-one and gathering relays, and the adapter port they deliver
//! through.

pub mod adapter;
pub mod error;
pub mod gathering;
pub mod relay;

pub use adapter::{Adapter, HumanTail, PeerChunker};
pub use error::RelayError;
pub use gathering::{close_of_turn_prompt, harvest_prompt, heartbeat_prompt, Phase, PassDetector, TalkingPiece};
pub use relay::{ParticipantRole, Relay, RelayHub, RelayMode, RelayParticipant, RelaySink};
