//! Client for the external checker program.
//!
//! The checker is called as `checker <input> <output> <answer>` and speaks
//! only through its exit code: 0 accepted, 1 wrong answer, 2 presentation
//! error, anything else means the checker itself is broken.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::runtime::Runtime;
use tokio::time::timeout;

use crate::verdict::Verdict;

mod exit_codes {
    pub const OK: i32 = 0;
    pub const WRONG_ANSWER: i32 = 1;
    pub const PRESENTATION_ERROR: i32 = 2;
}

/// The checker's judgement of one produced output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub verdict: Verdict,
    /// Reported as a wrong answer, kept apart for the log and report
    pub presentation_error: bool,
    /// Everything the checker printed, stdout and stderr combined
    pub diagnostic: Vec<u8>,
}

impl CheckReport {
    pub fn failure() -> Self {
        Self {
            verdict: Verdict::Failure,
            presentation_error: false,
            diagnostic: Vec::new(),
        }
    }

    /// Maps the checker's exit code; unknown codes are checker failures
    pub fn from_exit_code(code: Option<i32>, diagnostic: Vec<u8>) -> Self {
        let (verdict, presentation_error) = match code {
            Some(exit_codes::OK) => (Verdict::Accepted, false),
            Some(exit_codes::WRONG_ANSWER) => (Verdict::WrongAnswer, false),
            Some(exit_codes::PRESENTATION_ERROR) => (Verdict::WrongAnswer, true),
            _ => {
                log::error!("CHECKER FAILED with exit code {code:?}:");
                log::error!("{}", diagnostic_text(&diagnostic));
                (Verdict::Failure, false)
            }
        };
        Self {
            verdict,
            presentation_error,
            diagnostic,
        }
    }

    pub fn diagnostic_text(&self) -> Cow<'_, str> {
        diagnostic_text(&self.diagnostic)
    }
}

/// Decodes checker output for logging; bytes that are not UTF-8 are replaced
pub fn diagnostic_text(bytes: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => Cow::Borrowed(s.trim_end()),
        Cow::Owned(s) => Cow::Owned(s.trim_end().to_string()),
    }
}

/// Trait for anything that can judge a produced output
pub trait Checker {
    fn check(&self, input: &Path, output: &Path, answer: &Path) -> CheckReport;
}

/// Runs a checker executable as a child process
pub struct ProcessChecker {
    path: PathBuf,
    /// stdout and stderr of the checker both land here
    log_path: PathBuf,
    timeout: Duration,
    runtime: Runtime,
}

impl ProcessChecker {
    pub fn build(
        path: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            path: path.into(),
            log_path: log_path.into(),
            timeout,
            runtime,
        })
    }

    /// Executes the checker, killing it when it outlives the timeout
    async fn execute_checker_async(
        &self,
        input: &Path,
        output: &Path,
        answer: &Path,
    ) -> Result<ExitStatus> {
        let log_file = fs::File::create(&self.log_path)?;

        let mut cmd = tokio::process::Command::new(&self.path);
        cmd.arg(input)
            .arg(output)
            .arg(answer)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file))
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        match timeout(self.timeout, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => bail!("checker did not finish within {} ms", self.timeout.as_millis()),
        }
    }
}

impl Checker for ProcessChecker {
    fn check(&self, input: &Path, output: &Path, answer: &Path) -> CheckReport {
        let status = self
            .runtime
            .block_on(self.execute_checker_async(input, output, answer));

        match status {
            Ok(status) => {
                let diagnostic = fs::read(&self.log_path).unwrap_or_else(|e| {
                    log::warn!("Cannot read checker output {}: {e}", self.log_path.display());
                    Vec::new()
                });
                CheckReport::from_exit_code(status.code(), diagnostic)
            }
            Err(e) => {
                log::error!("CHECKER FAILED: {e:#}");
                CheckReport::failure()
            }
        }
    }
}
