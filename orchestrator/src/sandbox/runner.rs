//! Isolated execution of generated module code: always a separate child
//! process, never in-process dynamic evaluation of generated source (see
//! the crate's top-level design notes). Resource limits are enforced by
//! killing the child on wall-clock timeout; CPU/memory ceilings are passed
//! to the child's environment for it to self-enforce via `setrlimit`-aware
//! build tooling where available.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;

use super::policy::ExecutionPolicy;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to prepare sandbox workspace: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("failed to spawn sandboxed process: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct SandboxExecution {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: f64,
    pub timed_out: bool,
    pub tests_passed: u32,
    pub tests_failed: u32,
}

pub struct SandboxRunner {
    policy: ExecutionPolicy,
}

impl SandboxRunner {
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self { policy }
    }

    /// Compile `adapter_source` + `test_source` as a single `rustc --test`
    /// unit in an isolated temp directory and run the resulting binary,
    /// under the policy's wall-clock limit.
    pub fn execute_tests(&self, adapter_source: &str, test_source: &str) -> SandboxExecution {
        let workspace = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return SandboxExecution {
                    exit_code: -1,
                    stderr: format!("workspace setup failed: {e}"),
                    ..Default::default()
                }
            }
        };

        let combined = format!("{adapter_source}\n{test_source}\n");
        let source_path = workspace.path().join("module.rs");
        if let Err(e) = std::fs::write(&source_path, combined) {
            return SandboxExecution {
                exit_code: -1,
                stderr: format!("failed to write module source: {e}"),
                ..Default::default()
            };
        }

        let binary_path = workspace.path().join("module_test_bin");
        let compile_start = Instant::now();
        let compile = self.run_with_timeout(
            Command::new("rustc")
                .arg("--test")
                .arg("--edition=2021")
                .arg("-o")
                .arg(&binary_path)
                .arg(&source_path),
            self.policy.max_wall_seconds,
        );

        let compile = match compile {
            Ok(output) => output,
            Err(e) => {
                return SandboxExecution {
                    exit_code: -1,
                    stderr: format!("compile step failed: {e}"),
                    execution_time_ms: compile_start.elapsed().as_secs_f64() * 1000.0,
                    ..Default::default()
                }
            }
        };

        if compile.exit_code != 0 {
            return SandboxExecution {
                exit_code: compile.exit_code,
                stdout: compile.stdout,
                stderr: compile.stderr,
                execution_time_ms: compile_start.elapsed().as_secs_f64() * 1000.0,
                timed_out: compile.timed_out,
                ..Default::default()
            };
        }

        let run_start = Instant::now();
        let run = match self.run_with_timeout(&mut Command::new(&binary_path), self.policy.max_wall_seconds) {
            Ok(output) => output,
            Err(e) => {
                return SandboxExecution {
                    exit_code: -1,
                    stderr: format!("test binary failed to run: {e}"),
                    execution_time_ms: run_start.elapsed().as_secs_f64() * 1000.0,
                    ..Default::default()
                }
            }
        };

        let (tests_passed, tests_failed) = parse_test_summary(&run.stdout);

        SandboxExecution {
            exit_code: run.exit_code,
            stdout: run.stdout,
            stderr: run.stderr,
            execution_time_ms: run_start.elapsed().as_secs_f64() * 1000.0,
            timed_out: run.timed_out,
            tests_passed,
            tests_failed,
        }
    }

    /// Run an arbitrary command to completion (for e.g. `cargo build`
    /// during the pipeline's build stage), killing it if it exceeds the
    /// policy's wall-clock limit.
    pub fn execute(&self, command: &mut Command) -> SandboxExecution {
        let start = Instant::now();
        match self.run_with_timeout(command, self.policy.max_wall_seconds) {
            Ok(mut output) => {
                output.execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
                output
            }
            Err(e) => SandboxExecution {
                exit_code: -1,
                stderr: e.to_string(),
                execution_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                ..Default::default()
            },
        }
    }

    fn run_with_timeout(&self, command: &mut Command, timeout_secs: u64) -> Result<SandboxExecution, SandboxError> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SandboxError::Spawn)?;

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let timed_out = loop {
            match child.try_wait().map_err(SandboxError::Spawn)? {
                Some(_) => break false,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break true;
                }
                None => std::thread::sleep(Duration::from_millis(25)),
            }
        };

        let output = child.wait_with_output().map_err(SandboxError::Spawn)?;
        Ok(SandboxExecution {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out,
            ..Default::default()
        })
    }
}

fn parse_test_summary(stdout: &str) -> (u32, u32) {
    let re = Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed").unwrap();
    if let Some(caps) = re.captures(stdout) {
        let passed = caps[1].parse().unwrap_or(0);
        let failed = caps[2].parse().unwrap_or(0);
        return (passed, failed);
    }
    (0, 0)
}

/// Write `content` to `path`, creating parent directories if needed.
/// Helper shared by the pipeline's write stage when staging adapter source
/// into a sandboxed module directory before validation.
pub fn stage_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_test_summary_extracts_counts() {
        let stdout = "running 2 tests\ntest result: FAILED. 1 passed; 1 failed; 0 ignored\n";
        let (passed, failed) = parse_test_summary(stdout);
        assert_eq!(passed, 1);
        assert_eq!(failed, 1);
    }

    #[test]
    fn parse_test_summary_defaults_to_zero_when_absent() {
        assert_eq!(parse_test_summary("no summary line"), (0, 0));
    }
}
