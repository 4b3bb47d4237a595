// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gathering phase state machine: `inhale -> hold -> exhale -> close`, a
//! talking-piece pointer that cycles through speakers, and pass-phrase
//! detection that advances it early.

use regex::Regex;

use crate::relay::{ParticipantRole, RelayParticipant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Inhale,
    Hold,
    Exhale,
    Close,
}

impl Phase {
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Inhale => Some(Phase::Hold),
            Phase::Hold => Some(Phase::Exhale),
            Phase::Exhale => Some(Phase::Close),
            Phase::Close => None,
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            Phase::Inhale => "=== phase: inhale ===",
            Phase::Hold => "=== phase: hold ===",
            Phase::Exhale => "=== phase: exhale ===",
            Phase::Close => "=== phase: close ===",
        }
    }
}

/// Tracks whose turn it is within a gathering and how many heartbeats the
/// current speaker has used.
pub struct TalkingPiece {
    speakers: Vec<String>,
    current: usize,
    beat: u32,
    beats_per_turn: u32,
}

impl TalkingPiece {
    /// `beats_per_turn` is the number of heartbeat prompts injected before
    /// the close-of-turn prompt forces an advance. The harvester's ordinal
    /// is excluded from the speaker cycle.
    pub fn new(participants: &[RelayParticipant], beats_per_turn: u32) -> Self {
        let mut speakers: Vec<&RelayParticipant> = participants
            .iter()
            .filter(|p| p.role != ParticipantRole::Harvester)
            .collect();
        speakers.sort_by_key(|p| p.ordinal);

        Self {
            speakers: speakers.into_iter().map(|p| p.session_id.clone()).collect(),
            current: 0,
            beat: 0,
            beats_per_turn,
        }
    }

    pub fn speakers_len(&self) -> usize {
        self.speakers.len()
    }

    pub fn current_speaker(&self) -> Option<&str> {
        self.speakers.get(self.current).map(String::as_str)
    }

    pub fn is_current_speaker(&self, session_id: &str) -> bool {
        self.current_speaker() == Some(session_id)
    }

    /// Advances the piece to the next speaker, resetting the beat counter.
    pub fn advance(&mut self) {
        if self.speakers.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.speakers.len();
        self.beat = 0;
    }

    /// Records a heartbeat with no pass; returns true if this was the final
    /// beat (the caller should inject a close-of-turn prompt and advance).
    pub fn tick(&mut self) -> bool {
        self.beat += 1;
        self.beat >= self.beats_per_turn
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }
}

/// Conservative pass detection: the phrase must appear at the start of the
/// new output (sentence-start heuristic), not merely anywhere in it.
pub struct PassDetector {
    re: Regex,
}

impl Default for PassDetector {
    fn default() -> Self {
        Self {
            // unwrap: the pattern is a fixed literal, never user input.
            re: Regex::new(r"(?m)^(I pass\b|Passing to\b)").expect("valid pass-detection regex"),
        }
    }
}

impl PassDetector {
    pub fn detects_pass(&self, new_output: &str) -> bool {
        self.re.is_match(new_output)
    }
}

pub fn heartbeat_prompt(beat: u32, beats_per_turn: u32) -> String {
    format!("beat {beat}/{beats_per_turn}; continue, pivot, or pass")
}

pub fn close_of_turn_prompt() -> &'static str {
    "final beat reached; wrap up your turn now"
}

pub fn harvest_prompt() -> &'static str {
    "produce the harvest: summarize the gathering's output into a single artifact"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_detection_requires_sentence_start() {
        let detector = PassDetector::default();
        assert!(detector.detects_pass("I pass for now"));
        assert!(detector.detects_pass("Passing to the next speaker"));
        assert!(!detector.detects_pass("I will not say I pass mid-sentence"));
    }

    #[test]
    fn phase_sequence_terminates_at_close() {
        assert_eq!(Phase::Inhale.next(), Some(Phase::Hold));
        assert_eq!(Phase::Hold.next(), Some(Phase::Exhale));
        assert_eq!(Phase::Exhale.next(), Some(Phase::Close));
        assert_eq!(Phase::Close.next(), None);
    }

    fn participant(id: &str, ordinal: u32, role: ParticipantRole) -> RelayParticipant {
        RelayParticipant { session_id: id.to_owned(), display_name: id.to_owned(), ordinal, role }
    }

    #[test]
    fn talking_piece_excludes_harvester_and_cycles_in_ordinal_order() {
        let participants = vec![
            participant("b", 1, ParticipantRole::Speaker),
            participant("h", 2, ParticipantRole::Harvester),
            participant("a", 0, ParticipantRole::Speaker),
        ];
        let mut piece = TalkingPiece::new(&participants, 3);
        assert_eq!(piece.speakers_len(), 2);
        assert_eq!(piece.current_speaker(), Some("a"));
        piece.advance();
        assert_eq!(piece.current_speaker(), Some("b"));
        piece.advance();
        assert_eq!(piece.current_speaker(), Some("a"));
    }

    #[test]
    fn talking_piece_tick_reports_final_beat() {
        let participants = vec![participant("a", 0, ParticipantRole::Speaker)];
        let mut piece = TalkingPiece::new(&participants, 2);
        assert!(!piece.tick());
        assert!(piece.tick());
    }
}
