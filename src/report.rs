use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::CliArgs;
use crate::discovery::task_name;
use crate::judge::{SubmissionResult, TestReport};
use crate::verdict::Verdict;

/// Where the verdict of a submission is persisted
///
/// Resolved from the arguments alone, so even a run that fails during
/// discovery can still leave its verdict behind.
#[derive(Debug, Clone)]
pub struct ResultSink {
    dir: PathBuf,
    task_name: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    task: &'a str,
    datetime: &'a str,
    verdict: Verdict,
    results: &'a [TestReport],
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>, task_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            task_name: task_name.into(),
        }
    }

    pub fn from_cli(cli: &CliArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("cannot determine the current directory")?;
        let workdir = cwd.join(&cli.workdir);
        let workdir = workdir.canonicalize().unwrap_or(workdir);
        Ok(Self::new(workdir.join(&cli.resultsdir), task_name(&workdir)))
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// `<resultsdir>/<task>.res`
    pub fn verdict_path(&self) -> PathBuf {
        self.dir.join(format!("{}.res", self.task_name))
    }

    /// `<resultsdir>/<task>.json`
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.task_name))
    }

    /// Writes exactly the two-letter verdict code
    pub fn write_verdict(&self, verdict: Verdict) -> Result<PathBuf> {
        let path = self.verdict_path();
        write_file(&path, verdict.code().as_bytes())?;
        Ok(path)
    }

    /// Writes the per-test details of a run as JSON
    pub fn write_report(&self, result: &SubmissionResult) -> Result<PathBuf> {
        let report = JsonReport {
            task: &self.task_name,
            datetime: &result.timestamp,
            verdict: result.verdict,
            results: &result.tests,
        };
        let path = self.report_path();
        write_file(&path, serde_json::to_string_pretty(&report)?.as_bytes())?;
        Ok(path)
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_verdict_file_holds_only_the_code() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(dir.path(), "sum.v2");

        let path = sink.write_verdict(Verdict::WrongAnswer).unwrap();
        assert_eq!(path, dir.path().join("sum.v2.res"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "WA");

        sink.write_verdict(Verdict::Accepted).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "OK");
    }

    #[test]
    fn test_json_report_lists_judged_tests() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(dir.path(), "sum");
        let result = SubmissionResult {
            timestamp: "2024-01-01T00:00:00.000Z".into(),
            verdict: Verdict::TimeLimitExceeded,
            tests: vec![
                TestReport {
                    name: "01".into(),
                    verdict: Verdict::Accepted,
                    attempts: 1,
                    presentation_error: false,
                    diagnostic: Some("1 lines".into()),
                },
                TestReport {
                    name: "02".into(),
                    verdict: Verdict::TimeLimitExceeded,
                    attempts: 3,
                    presentation_error: false,
                    diagnostic: None,
                },
            ],
        };

        let path = sink.write_report(&result).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_json_include!(
            actual: written,
            expected: json!({
                "task": "sum",
                "verdict": "TL",
                "results": [
                    { "name": "01", "verdict": "OK", "diagnostic": "1 lines" },
                    { "name": "02", "verdict": "TL", "attempts": 3 }
                ]
            })
        );
    }

    #[test]
    fn test_unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ResultSink::new(dir.path().join("missing"), "sum");
        assert!(sink.write_verdict(Verdict::Failure).is_err());
    }
}
