// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `next_prepare` / `next_work`: the stateless heart of the core. Every
//! call reads files, reads availability, and returns a [`Directive`]. No
//! hidden in-memory state governs transitions.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::availability::{AgentAvailability, TaskType};
use crate::directive::{Directive, ToolCall};
use crate::error::ErrorCode;
use crate::gates::BuildGateRunner;
use crate::roadmap;
use crate::state_yaml::{parse_verdict, Verdict};
use crate::verify::{verify_artifacts, VerifyPhase};

fn todos_dir(working_dir: &Path, slug: &str) -> PathBuf {
    working_dir.join("todos").join(slug)
}

fn worktree_dir(working_dir: &Path, slug: &str) -> PathBuf {
    working_dir.join("trees").join(slug)
}

fn done_entry(working_dir: &Path, slug: &str) -> Option<PathBuf> {
    let done = working_dir.join("done");
    let entries = std::fs::read_dir(done).ok()?;
    entries
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(&format!("-{slug}")))
                .unwrap_or(false)
        })
        .map(|e| e.path())
}

fn resolve_slug(working_dir: &Path, slug: Option<&str>) -> Option<String> {
    let roadmap_path = working_dir.join("todos").join("roadmap.md");
    let content = std::fs::read_to_string(roadmap_path).unwrap_or_default();
    roadmap::resolve_slug(&content, slug)
}

fn tool_call(
    command: &str,
    slug: &str,
    project: &Path,
    availability: &dyn AgentAvailability,
    task: TaskType,
    subfolder: &str,
    note: Option<&str>,
) -> Directive {
    let (agent, thinking_tier) = availability.pick(task);
    Directive::ToolCall(ToolCall {
        command: command.to_owned(),
        args: slug.to_owned(),
        project: project.to_string_lossy().into_owned(),
        agent,
        thinking_tier,
        subfolder: subfolder.to_owned(),
        note: note.map(str::to_owned),
    })
}

/// Phase A: ensures `requirements.md` and `implementation-plan.md` exist.
pub fn next_prepare(
    working_dir: &Path,
    slug: Option<&str>,
    availability: &dyn AgentAvailability,
) -> Directive {
    let Some(slug) = resolve_slug(working_dir, slug) else {
        return Directive::error(ErrorCode::NoWork, "No pending items in roadmap.");
    };

    let dir = todos_dir(working_dir, &slug);

    if !dir.join("requirements.md").exists() {
        return tool_call(
            "next-prepare",
            &slug,
            working_dir,
            availability,
            TaskType::Prepare,
            "",
            Some("engage as collaborator"),
        );
    }

    if !dir.join("implementation-plan.md").exists() {
        return tool_call(
            "next-prepare",
            &slug,
            working_dir,
            availability,
            TaskType::Prepare,
            "",
            Some("engage as collaborator"),
        );
    }

    Directive::PreparedOk { slug }
}

/// Phase B: order of checks matters; returns as soon as one matches.
pub fn next_work(
    working_dir: &Path,
    slug: Option<&str>,
    availability: &dyn AgentAvailability,
    gate_runner: &dyn BuildGateRunner,
    max_review_rounds: u32,
) -> Directive {
    let Some(slug) = resolve_slug(working_dir, slug) else {
        return Directive::error(ErrorCode::NoWork, "No pending items in roadmap.");
    };

    if let Some(archive_path) = done_entry(working_dir, &slug) {
        return Directive::CompleteOk {
            slug,
            archive_path: archive_path.to_string_lossy().into_owned(),
        };
    }

    let dir = todos_dir(working_dir, &slug);
    if !dir.join("requirements.md").exists() || !dir.join("implementation-plan.md").exists() {
        return Directive::error(ErrorCode::NotPrepared, "run next_prepare first");
    }

    let worktree = worktree_dir(working_dir, &slug);
    ensure_worktree(working_dir, &worktree, &slug);

    if worktree_has_uncommitted_changes(&worktree) {
        return tool_call(
            "commit-pending",
            &slug,
            working_dir,
            availability,
            TaskType::Commit,
            &worktree.to_string_lossy(),
            None,
        );
    }

    let gate_report = gate_runner.run(&worktree, &slug);
    if !gate_report.passed() {
        let report = gate_report
            .failures()
            .iter()
            .map(|f| format!("{}: {}", f.name, f.output))
            .collect::<Vec<_>>()
            .join("\n");
        return Directive::error(ErrorCode::BuildGateFailed, report);
    }

    let build_verify = verify_artifacts(&dir, &worktree, VerifyPhase::Build);
    if build_verify.has_failures_beyond_unchecked_boxes() {
        return Directive::error(ErrorCode::VerifyFailed, build_verify.failures.join("\n"));
    }

    let plan = std::fs::read_to_string(dir.join("implementation-plan.md")).unwrap_or_default();
    let has_unchecked = plan.lines().any(|l| l.trim_start().starts_with("- [ ]"));

    if has_unchecked {
        return tool_call(
            "next-build",
            &slug,
            working_dir,
            availability,
            TaskType::Build,
            &worktree.to_string_lossy(),
            None,
        );
    }

    if !build_verify.passed() {
        return Directive::error(ErrorCode::VerifyFailed, build_verify.failures.join("\n"));
    }

    let findings_path = dir.join("review-findings.md");
    if !findings_path.exists() {
        return tool_call(
            "next-review",
            &slug,
            working_dir,
            availability,
            TaskType::Review,
            &worktree.to_string_lossy(),
            None,
        );
    }

    let findings = std::fs::read_to_string(&findings_path).unwrap_or_default();
    match parse_verdict(&findings) {
        Some(Verdict::RequestChanges) => {
            let round = read_review_round(&dir);
            if round >= max_review_rounds {
                closure_policy(&slug)
            } else {
                tool_call(
                    "next-fix-review",
                    &slug,
                    working_dir,
                    availability,
                    TaskType::Fix,
                    &worktree.to_string_lossy(),
                    None,
                )
            }
        }
        Some(Verdict::Approve) => tool_call(
            "next-finalize",
            &slug,
            working_dir,
            availability,
            TaskType::Finalize,
            "",
            None,
        ),
        None => Directive::error(ErrorCode::AmbiguousVerdict, "review-findings.md has no clear verdict"),
    }
}

fn read_review_round(dir: &Path) -> u32 {
    crate::state_yaml::StateYaml::load(&dir.join("state.yaml"))
        .map(|s| s.review_round)
        .unwrap_or(0)
}

/// Applied when `review_round >= max_review_rounds`: stop recommending
/// further fix iterations. The orchestrator reacts to this error by marking
/// the todo `blocked` and emitting a signal session (the state machine
/// itself does not mutate files).
fn closure_policy(slug: &str) -> Directive {
    Directive::error(
        ErrorCode::ReviewRoundLimitExceeded,
        format!("review round limit of {slug} reached; blocking for human review"),
    )
}

fn ensure_worktree(working_dir: &Path, worktree: &Path, slug: &str) {
    if worktree.exists() {
        return;
    }
    let _ = Command::new("git")
        .args(["worktree", "add", "-b", slug, &worktree.to_string_lossy()])
        .current_dir(working_dir)
        .status();
}

fn worktree_has_uncommitted_changes(worktree: &Path) -> bool {
    match Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(worktree)
        .output()
    {
        Ok(out) => !out.stdout.is_empty(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AlwaysClaude;
    use crate::gates::NoOpGateRunner;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn empty_roadmap_yields_no_work() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "todos/roadmap.md", "# Roadmap\n");

        let directive = next_work(tmp.path(), None, &AlwaysClaude, &NoOpGateRunner, 3);
        match directive {
            Directive::Error { code, message } => {
                assert_eq!(code, "NO_WORK");
                assert_eq!(message, "No pending items in roadmap.");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn fresh_slug_dispatches_next_prepare() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "todos/roadmap.md", "### [ ] alpha — first thing\n");

        let directive = next_prepare(tmp.path(), None, &AlwaysClaude);
        match directive {
            Directive::ToolCall(call) => {
                assert_eq!(call.command, "next-prepare");
                assert_eq!(call.args, "alpha");
                assert_eq!(call.subfolder, "");
                assert!(call.note.unwrap_or_default().contains("engage as collaborator"));
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
    }

    #[test]
    fn not_prepared_when_artifacts_missing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "todos/roadmap.md", "### [ ] alpha — first thing\n");

        let directive = next_work(tmp.path(), Some("alpha"), &AlwaysClaude, &NoOpGateRunner, 3);
        match directive {
            Directive::Error { code, .. } => assert_eq!(code, "NOT_PREPARED"),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
