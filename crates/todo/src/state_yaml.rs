// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `state.yaml` schema and the review-verdict line parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TodoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Build,
    Review,
    Finalize,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InProgress,
    ChangesRequested,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateYaml {
    pub phase: Phase,
    #[serde(default = "default_build_status")]
    pub build: PhaseStatus,
    #[serde(default = "default_review_status")]
    pub review: ReviewStatus,
    #[serde(default)]
    pub review_round: u32,
    #[serde(default)]
    pub signal: Option<String>,
}

fn default_build_status() -> PhaseStatus {
    PhaseStatus::Pending
}

fn default_review_status() -> ReviewStatus {
    ReviewStatus::Pending
}

impl StateYaml {
    pub fn fresh() -> Self {
        Self {
            phase: Phase::Prepare,
            build: PhaseStatus::Pending,
            review: ReviewStatus::Pending,
            review_round: 0,
            signal: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, TodoError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), TodoError> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// The phase/status consistency check used by verify-artifacts: a
    /// `build` phase row must not claim `review` is already decided, and a
    /// `review` phase row must have `build` complete.
    pub fn is_internally_consistent(&self) -> bool {
        match self.phase {
            Phase::Prepare => true,
            Phase::Build => !matches!(self.review, ReviewStatus::Approved),
            Phase::Review => matches!(self.build, PhaseStatus::Complete),
            Phase::Finalize => matches!(self.review, ReviewStatus::Approved),
            Phase::Done => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    RequestChanges,
}

/// Parses the verdict line out of `review-findings.md`. Returns `None` when
/// neither a clear `APPROVE` nor `REQUEST CHANGES` verdict is present
/// (`AMBIGUOUS_VERDICT`).
pub fn parse_verdict(review_findings: &str) -> Option<Verdict> {
    for line in review_findings.lines() {
        let lower = line.to_ascii_lowercase();
        let Some(rest) = lower.strip_prefix("verdict:") else {
            continue;
        };
        let rest = rest.trim();
        if rest.starts_with("approve") {
            return Some(Verdict::Approve);
        }
        if rest.starts_with("request changes") {
            return Some(Verdict::RequestChanges);
        }
    }
    None
}

/// Template detection for review-findings.md: a non-template document has
/// a populated `## Critical` or `## Verdict` heading with content beneath
/// it, not just the bare heading.
pub fn is_template(review_findings: &str) -> bool {
    if review_findings.trim().is_empty() {
        return true;
    }
    let headings = ["## critical", "## verdict"];
    let lower = review_findings.to_ascii_lowercase();
    let mut populated = false;
    let lines: Vec<&str> = lower.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if headings.contains(&line.trim()) {
            let has_body = lines[i + 1..]
                .iter()
                .take_while(|l| !l.trim_start().starts_with("##"))
                .any(|l| !l.trim().is_empty());
            if has_body {
                populated = true;
            }
        }
    }
    !populated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_changes_verdict() {
        let content = "# Review\n\nverdict: REQUEST CHANGES\n\nsome notes\n";
        assert_eq!(parse_verdict(content), Some(Verdict::RequestChanges));
    }

    #[test]
    fn parses_approve_verdict() {
        let content = "verdict: APPROVE\n";
        assert_eq!(parse_verdict(content), Some(Verdict::Approve));
    }

    #[test]
    fn ambiguous_when_no_verdict_line() {
        assert_eq!(parse_verdict("# Review\nlooks fine I guess\n"), None);
    }

    #[test]
    fn template_detection_flags_empty_headings() {
        let content = "## Critical\n\n## Verdict\n\nverdict: APPROVE\n";
        assert!(is_template(content));
    }

    #[test]
    fn template_detection_accepts_populated_critical() {
        let content = "## Critical\n\nFound a data race in the poller.\n\nverdict: REQUEST CHANGES\n";
        assert!(!is_template(content));
    }

    #[test]
    fn consistency_rejects_review_phase_with_incomplete_build() {
        let mut state = StateYaml::fresh();
        state.phase = Phase::Review;
        state.build = PhaseStatus::InProgress;
        assert!(!state.is_internally_consistent());
    }
}
