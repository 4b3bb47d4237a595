// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build-gates: a pure predicate over the worktree, run headlessly, that
//! never dispatches a worker on failure — it only returns a report.

use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct GateCheck {
    pub name: String,
    pub passed: bool,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct GateReport {
    pub checks: Vec<GateCheck>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> Vec<&GateCheck> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// Runs the configured formatter/linter/test commands over a worktree.
/// Injected so the state machine itself stays free of process-execution
/// concerns; the daemon wires a concrete runner at startup.
pub trait BuildGateRunner: Send + Sync {
    fn run(&self, worktree: &Path, slug: &str) -> GateReport;
}

/// Runs a fixed, ordered list of shell commands in the worktree directory.
pub struct ShellGateRunner {
    commands: Vec<(String, String)>,
}

impl ShellGateRunner {
    pub fn new(commands: Vec<(String, String)>) -> Self {
        Self { commands }
    }
}

impl BuildGateRunner for ShellGateRunner {
    fn run(&self, worktree: &Path, _slug: &str) -> GateReport {
        let checks = self
            .commands
            .iter()
            .map(|(name, command)| {
                let output = Command::new("sh").arg("-c").arg(command).current_dir(worktree).output();
                match output {
                    Ok(out) => GateCheck {
                        name: name.clone(),
                        passed: out.status.success(),
                        output: format!(
                            "{}{}",
                            String::from_utf8_lossy(&out.stdout),
                            String::from_utf8_lossy(&out.stderr)
                        ),
                    },
                    Err(e) => GateCheck {
                        name: name.clone(),
                        passed: false,
                        output: format!("failed to spawn: {e}"),
                    },
                }
            })
            .collect();
        GateReport { checks }
    }
}

/// A runner that always reports success, for work items without a
/// configured gate list.
pub struct NoOpGateRunner;

impl BuildGateRunner for NoOpGateRunner {
    fn run(&self, _worktree: &Path, _slug: &str) -> GateReport {
        GateReport { checks: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_runner_always_passes() {
        let report = NoOpGateRunner.run(Path::new("."), "alpha");
        assert!(report.passed());
    }

    #[test]
    fn shell_runner_reports_failure() {
        let runner = ShellGateRunner::new(vec![("always fails".to_owned(), "exit 1".to_owned())]);
        let report = runner.run(Path::new("."), "alpha");
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);
    }
}
