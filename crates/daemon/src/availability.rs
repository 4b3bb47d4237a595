// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate-limit/outage tracker with a static per-task fallback matrix. Each
//! daemon tracks availability locally; there is no cross-host coordination.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use teleclaude_todo::{AgentAvailability, AgentKind, TaskType, ThinkingTier};
use tracing::info;

#[derive(Debug, Clone)]
struct UnavailableUntil {
    until: Instant,
    reason: String,
}

/// A single agent kind's availability as of the moment `snapshot()` was
/// called, for the control surface's `/v1/availability` response.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AvailabilityRecord {
    pub agent_kind: AgentKind,
    pub available: bool,
    pub unavailable_for_secs: Option<u64>,
    pub reason: Option<String>,
}

/// Best-first `(agent_kind, thinking_tier)` candidates per task type.
fn fallback_matrix(task: TaskType) -> &'static [(AgentKind, ThinkingTier)] {
    use AgentKind::*;
    use ThinkingTier::*;
    match task {
        TaskType::Prepare => &[(Claude, Slow), (Codex, Slow), (Gemini, Slow)],
        TaskType::Build => &[(Claude, Medium), (Codex, Medium), (Gemini, Medium)],
        TaskType::Review => &[(Claude, Slow), (Gemini, Slow), (Codex, Slow)],
        TaskType::Fix => &[(Claude, Medium), (Codex, Medium), (Gemini, Medium)],
        TaskType::Commit => &[(Claude, Fast), (Codex, Fast), (Gemini, Fast)],
        TaskType::Finalize => &[(Claude, Slow), (Codex, Slow), (Gemini, Slow)],
    }
}

/// Tracks per-agent-kind outage windows and selects the best available
/// candidate for a task type.
pub struct AvailabilityTracker {
    unavailable: RwLock<HashMap<AgentKind, UnavailableUntil>>,
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self {
            unavailable: RwLock::new(HashMap::new()),
        }
    }

    /// Upserts an outage record. No cross-host coordination: this only
    /// affects this daemon's own selection.
    pub fn mark_unavailable(&self, agent_kind: AgentKind, until: Instant, reason: impl Into<String>) {
        let reason = reason.into();
        info!(?agent_kind, reason = %reason, "agent marked unavailable");
        self.unavailable
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent_kind, UnavailableUntil { until, reason });
    }

    pub fn mark_available(&self, agent_kind: AgentKind) {
        self.unavailable.write().unwrap_or_else(|e| e.into_inner()).remove(&agent_kind);
    }

    fn until_for(&self, agent_kind: AgentKind) -> Option<Instant> {
        let table = self.unavailable.read().unwrap_or_else(|e| e.into_inner());
        table.get(&agent_kind).map(|record| record.until)
    }

    /// The full per-agent-kind table for the control surface's availability
    /// query, in fallback-matrix order.
    pub fn snapshot(&self) -> Vec<AvailabilityRecord> {
        let now = Instant::now();
        let table = self.unavailable.read().unwrap_or_else(|e| e.into_inner());
        [AgentKind::Claude, AgentKind::Codex, AgentKind::Gemini]
            .into_iter()
            .map(|agent_kind| match table.get(&agent_kind) {
                Some(record) if record.until > now => AvailabilityRecord {
                    agent_kind,
                    available: false,
                    unavailable_for_secs: Some((record.until - now).as_secs()),
                    reason: Some(record.reason.clone()),
                },
                _ => AvailabilityRecord {
                    agent_kind,
                    available: true,
                    unavailable_for_secs: None,
                    reason: None,
                },
            })
            .collect()
    }
}

impl AgentAvailability for AvailabilityTracker {
    fn pick(&self, task: TaskType) -> (AgentKind, ThinkingTier) {
        let now = Instant::now();
        let candidates = fallback_matrix(task);

        for (agent, tier) in candidates {
            match self.until_for(*agent) {
                Some(until) if until > now => continue,
                _ => return (*agent, *tier),
            }
        }

        // None are available: pick the one whose outage window ends soonest
        // so the orchestrator waits minimally.
        candidates
            .iter()
            .min_by_key(|(agent, _)| self.until_for(*agent).unwrap_or(now))
            .copied()
            .unwrap_or(candidates[0])
    }
}

#[allow(dead_code)]
fn soon(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_candidate_when_all_available() {
        let tracker = AvailabilityTracker::new();
        let (agent, tier) = tracker.pick(TaskType::Prepare);
        assert_eq!(agent, AgentKind::Claude);
        assert_eq!(tier, ThinkingTier::Slow);
    }

    #[test]
    fn falls_back_when_first_choice_unavailable() {
        let tracker = AvailabilityTracker::new();
        tracker.mark_unavailable(AgentKind::Claude, soon(60), "rate limited");
        let (agent, _) = tracker.pick(TaskType::Build);
        assert_eq!(agent, AgentKind::Codex);
    }

    #[test]
    fn past_outage_window_is_treated_as_available() {
        let tracker = AvailabilityTracker::new();
        tracker.mark_unavailable(AgentKind::Claude, Instant::now() - Duration::from_secs(1), "stale");
        let (agent, _) = tracker.pick(TaskType::Commit);
        assert_eq!(agent, AgentKind::Claude);
    }

    #[test]
    fn snapshot_reports_reason_and_remaining_window() {
        let tracker = AvailabilityTracker::new();
        tracker.mark_unavailable(AgentKind::Codex, soon(60), "rate limited");
        let table = tracker.snapshot();

        let claude = table.iter().find(|r| r.agent_kind == AgentKind::Claude).unwrap();
        assert!(claude.available);
        assert!(claude.reason.is_none());

        let codex = table.iter().find(|r| r.agent_kind == AgentKind::Codex).unwrap();
        assert!(!codex.available);
        assert_eq!(codex.reason.as_deref(), Some("rate limited"));
        assert!(codex.unavailable_for_secs.unwrap() > 0);
    }

    #[test]
    fn all_unavailable_picks_soonest_expiry() {
        let tracker = AvailabilityTracker::new();
        tracker.mark_unavailable(AgentKind::Claude, soon(100), "a");
        tracker.mark_unavailable(AgentKind::Codex, soon(10), "b");
        tracker.mark_unavailable(AgentKind::Gemini, soon(50), "c");
        let (agent, _) = tracker.pick(TaskType::Prepare);
        assert_eq!(agent, AgentKind::Codex);
    }
}
