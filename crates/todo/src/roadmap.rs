// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parser for `todos/roadmap.md`'s `### [{status}] {slug} — {description}`
//! heading format.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadmapStatus {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct RoadmapEntry {
    pub status: RoadmapStatus,
    pub slug: String,
    pub description: String,
    pub line: usize,
}

fn heading_regex() -> Regex {
    // Tolerates whitespace and both ASCII `-` and em-dash between slug and
    // description.
    Regex::new(r"^###\s*\[([ >x])\]\s*(\S+)\s*(?:-|\x{2014})\s*(.*)$")
        .expect("valid roadmap heading regex")
}

pub fn parse(content: &str) -> Vec<RoadmapEntry> {
    let re = heading_regex();
    content
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let caps = re.captures(line.trim_end())?;
            let status = match &caps[1] {
                " " => RoadmapStatus::Pending,
                ">" => RoadmapStatus::InProgress,
                "x" => RoadmapStatus::Done,
                _ => return None,
            };
            Some(RoadmapEntry {
                status,
                slug: caps[2].to_owned(),
                description: caps[3].trim().to_owned(),
                line: i,
            })
        })
        .collect()
}

/// Resolves the slug to act on: the explicitly requested slug if given,
/// else the first in-progress entry, else the first pending entry.
pub fn resolve_slug(content: &str, requested: Option<&str>) -> Option<String> {
    if let Some(slug) = requested {
        return Some(slug.to_owned());
    }
    let entries = parse(content);
    entries
        .iter()
        .find(|e| e.status == RoadmapStatus::InProgress)
        .or_else(|| entries.iter().find(|e| e.status == RoadmapStatus::Pending))
        .map(|e| e.slug.clone())
}

/// Rewrites the first pending heading for `slug` to in-progress (`[>]`).
/// The caller (orchestrator) is responsible for writing the result back to
/// `roadmap.md`; this function is pure.
pub fn promote_to_in_progress(content: &str, slug: &str) -> String {
    let re = heading_regex();
    content
        .lines()
        .map(|line| {
            if let Some(caps) = re.captures(line.trim_end()) {
                if &caps[1] == " " && &caps[2] == slug {
                    return line.replacen("[ ]", "[>]", 1);
                }
            }
            line.to_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roadmap_resolves_no_slug() {
        assert_eq!(resolve_slug("# Roadmap\n", None), None);
    }

    #[test]
    fn pending_entry_resolves_first() {
        let content = "# Roadmap\n\n### [ ] alpha — first thing\n### [ ] beta — second thing\n";
        assert_eq!(resolve_slug(content, None), Some("alpha".to_owned()));
    }

    #[test]
    fn in_progress_preferred_over_pending() {
        let content = "### [ ] alpha — first\n### [>] beta — second\n";
        assert_eq!(resolve_slug(content, None), Some("beta".to_owned()));
    }

    #[test]
    fn explicit_slug_overrides_roadmap() {
        let content = "### [ ] alpha — first\n";
        assert_eq!(resolve_slug(content, Some("zeta")), Some("zeta".to_owned()));
    }

    #[test]
    fn promote_flips_marker_for_matching_slug_only() {
        let content = "### [ ] alpha — first\n### [ ] beta — second\n";
        let promoted = promote_to_in_progress(content, "alpha");
        assert!(promoted.contains("### [>] alpha"));
        assert!(promoted.contains("### [ ] beta"));
    }

    #[test]
    fn tolerates_em_dash_and_whitespace() {
        let content = "###   [ ]   gamma   —   uses an em dash\n";
        let entries = parse(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slug, "gamma");
        assert_eq!(entries[0].description, "uses an em dash");
    }
}
