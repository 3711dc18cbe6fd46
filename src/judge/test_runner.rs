use std::path::Path;

use crate::checker::Checker;
use crate::discovery::TestCase;
use crate::retry::Retry;
use crate::sandbox::{self, Limits, SandboxRunner};
use crate::scratch::ScratchFiles;
use crate::verdict::{Halt, Verdict};

use super::TestReport;

/// Judges one test at a time: stage, run with retries, check, clean up
pub struct TestRunner<'a> {
    sandbox: &'a dyn SandboxRunner,
    checker: &'a dyn Checker,
    scratch: &'a ScratchFiles,
    solution: &'a Path,
    retry: Retry,
}

impl<'a> TestRunner<'a> {
    pub fn new(
        sandbox: &'a dyn SandboxRunner,
        checker: &'a dyn Checker,
        scratch: &'a ScratchFiles,
        solution: &'a Path,
        retry: Retry,
    ) -> Self {
        Self {
            sandbox,
            checker,
            scratch,
            solution,
            retry,
        }
    }

    /// Produces the verdict of `test` under `limits`
    ///
    /// The working directory is swept before and after the test. A failed
    /// sweep is returned as an error even when the test itself was judged.
    pub fn run(&self, test: &TestCase, limits: &Limits) -> Result<TestReport, Halt> {
        log::info!("Running test {}:", test.name);
        self.scratch.cleanup()?;
        let report = self.judge_test(test, limits);
        self.scratch.cleanup()?;

        if let Ok(report) = &report {
            log::info!("  Verdict: {}", report.verdict);
        }
        report
    }

    fn judge_test(&self, test: &TestCase, limits: &Limits) -> Result<TestReport, Halt> {
        let (execution, attempts) = self.retry.run(
            |attempt| -> Result<Verdict, Halt> {
                if attempt > 1 {
                    log::info!("  Got time limit, running again (attempt {attempt})");
                }
                self.scratch.stage_input(&test.input)?;
                Ok(sandbox::execute(
                    self.sandbox,
                    self.solution,
                    self.scratch.input(),
                    self.scratch.output(),
                    limits,
                ))
            },
            |outcome| matches!(outcome, Ok(Verdict::TimeLimitExceeded)),
        );
        let execution = execution?;

        if !execution.is_accepted() {
            log::info!("  The program terminated abnormally");
            return Ok(TestReport {
                name: test.name.clone(),
                verdict: execution,
                attempts,
                presentation_error: false,
                diagnostic: None,
            });
        }

        log::info!("  The program finished, checking its output:");
        let check = self
            .checker
            .check(self.scratch.input(), self.scratch.output(), &test.answer);
        let diagnostic = check.diagnostic_text().into_owned();
        if !diagnostic.is_empty() {
            log::info!("  Checker output: {diagnostic}");
        }
        if check.presentation_error {
            log::info!("  Presentation error, reported as {}", check.verdict);
        }

        Ok(TestReport {
            name: test.name.clone(),
            verdict: check.verdict,
            attempts,
            presentation_error: check.presentation_error,
            diagnostic: Some(diagnostic).filter(|d| !d.is_empty()),
        })
    }
}
