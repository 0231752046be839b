use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// File the validation script writes into the run directory
pub const VALIDATION_RESULT_FILE: &str = "validation.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        })
    }
}

/// One candidate patch to check
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub run_id: &'a str,
    pub task_id: &'a str,
    pub repo_dir: &'a Path,
    pub patch_path: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub verdict: Verdict,
    /// Where the validator left its full stderr, if anywhere
    pub stderr_log_path: Option<PathBuf>,
    /// Failure evidence fed back into the repair prompt
    pub failure_logs: String,
}

impl ValidationOutcome {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            stderr_log_path: None,
            failure_logs: String::new(),
        }
    }

    #[must_use]
    pub fn fail(failure_logs: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            stderr_log_path: None,
            failure_logs: failure_logs.into(),
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Checks a patch against a repository; any error counts as `fail`
#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, request: &ValidationRequest<'_>) -> anyhow::Result<ValidationOutcome>;
}

/// Runs an external validation script and reads its verdict file.
///
/// The script is called as
/// `<script> --run-id <id> --task-id <task> --repo-dir <dir> --patch <file>`
/// and must write `{"verdict": "pass"|"fail", "stderr_log_path": ...}` to
/// `<runs_dir>/<run_id>/validation.json`.
pub struct ScriptValidator {
    script: PathBuf,
    runs_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ScriptVerdict {
    verdict: Verdict,
    #[serde(default)]
    stderr_log_path: Option<PathBuf>,
    #[serde(default)]
    failure_reason: Option<String>,
}

impl ScriptValidator {
    pub fn new(script: impl Into<PathBuf>, runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            runs_dir: runs_dir.into(),
        }
    }

    fn result_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id).join(VALIDATION_RESULT_FILE)
    }
}

#[async_trait]
impl ValidationService for ScriptValidator {
    async fn validate(&self, request: &ValidationRequest<'_>) -> anyhow::Result<ValidationOutcome> {
        if !self.script.is_file() {
            log::warn!(
                "Validation script {} not found, treating as fail",
                self.script.display()
            );
            return Ok(ValidationOutcome::fail(format!(
                "validation script {} not found",
                self.script.display()
            )));
        }

        // A verdict left over from an earlier attempt must not be re-read
        let result_path = self.result_path(request.run_id);
        match tokio::fs::remove_file(&result_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("clear {}", result_path.display()));
            }
        }

        log::info!(
            "Validating {} (run {}, task {})",
            request.patch_path.display(),
            request.run_id,
            request.task_id
        );
        let output = Command::new(&self.script)
            .arg("--run-id")
            .arg(request.run_id)
            .arg("--task-id")
            .arg(request.task_id)
            .arg("--repo-dir")
            .arg(request.repo_dir)
            .arg("--patch")
            .arg(request.patch_path)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawn {}", self.script.display()))?;

        let process_logs = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let raw = match tokio::fs::read_to_string(&result_path).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!(
                    "No verdict at {} ({e}); script exited with {}",
                    result_path.display(),
                    output.status
                );
                return Ok(ValidationOutcome::fail(process_logs));
            }
        };
        let parsed: ScriptVerdict = serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", result_path.display()))?;

        if parsed.verdict == Verdict::Pass {
            return Ok(ValidationOutcome {
                stderr_log_path: parsed.stderr_log_path,
                ..ValidationOutcome::pass()
            });
        }

        let mut failure_logs = match &parsed.stderr_log_path {
            Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
            None => String::new(),
        };
        if failure_logs.trim().is_empty() {
            failure_logs = process_logs;
        }
        if let Some(reason) = parsed.failure_reason {
            log::warn!("Validation failed: {reason}");
            failure_logs = format!("{reason}\n{failure_logs}");
        }

        Ok(ValidationOutcome {
            verdict: Verdict::Fail,
            stderr_log_path: parsed.stderr_log_path,
            failure_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn request<'a>(repo: &'a Path, patch: &'a Path) -> ValidationRequest<'a> {
        ValidationRequest {
            run_id: "run-1",
            task_id: "attempt-0",
            repo_dir: repo,
            patch_path: patch,
        }
    }

    #[cfg(unix)]
    async fn write_script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("validate.sh");
        tokio::fs::write(&path, format!("#!/bin/sh\n{body}\n")).await.unwrap();
        let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&path, perms).await.unwrap();
        path
    }

    #[test]
    fn verdict_serde() {
        assert_eq!(serde_json::to_string(&Verdict::Pass).unwrap(), "\"pass\"");
        let parsed: Verdict = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(parsed, Verdict::Fail);
    }

    #[tokio::test]
    async fn missing_script_is_a_fail() {
        let temp = TempDir::new().unwrap();
        let validator = ScriptValidator::new(temp.path().join("absent.sh"), temp.path());
        let patch = temp.path().join("fix.patch");

        let outcome = validator.validate(&request(temp.path(), &patch)).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.failure_logs.contains("not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_verdict_is_read_from_run_dir() {
        let temp = TempDir::new().unwrap();
        let runs = temp.path().join("runs");
        tokio::fs::create_dir_all(runs.join("run-1")).await.unwrap();
        let script = write_script(
            temp.path(),
            &format!(
                "echo '{{\"verdict\": \"pass\", \"stderr_log_path\": \"/dev/null\"}}' > {}/run-1/validation.json",
                runs.display()
            ),
        )
        .await;

        let validator = ScriptValidator::new(script, &runs);
        let patch = temp.path().join("fix.patch");
        let outcome = validator.validate(&request(temp.path(), &patch)).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.stderr_log_path, Some(PathBuf::from("/dev/null")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_logs_come_from_stderr_file() {
        let temp = TempDir::new().unwrap();
        let runs = temp.path().join("runs");
        tokio::fs::create_dir_all(runs.join("run-1")).await.unwrap();
        let log_path = temp.path().join("stderr.log");
        tokio::fs::write(&log_path, "test_login ... FAILED").await.unwrap();

        let script = write_script(
            temp.path(),
            &format!(
                "echo '{{\"verdict\": \"fail\", \"stderr_log_path\": \"{}\"}}' > {}/run-1/validation.json",
                log_path.display(),
                runs.display()
            ),
        )
        .await;

        let validator = ScriptValidator::new(script, &runs);
        let patch = temp.path().join("fix.patch");
        let outcome = validator.validate(&request(temp.path(), &patch)).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.failure_logs, "test_login ... FAILED");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_without_verdict_file_fails_with_output() {
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "echo 'patch does not apply' >&2\nexit 1").await;

        let validator = ScriptValidator::new(script, temp.path().join("runs"));
        let patch = temp.path().join("fix.patch");
        let outcome = validator.validate(&request(temp.path(), &patch)).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.failure_logs.contains("patch does not apply"));
    }
}
