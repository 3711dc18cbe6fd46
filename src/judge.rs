mod test_runner;

pub use test_runner::TestRunner;

use serde::Serialize;

use crate::config::{Config, TimeBudget};
use crate::create_timestamp;
use crate::discovery::TestCase;
use crate::sandbox::Limits;
use crate::verdict::{Halt, Verdict};

/// Limits in force for the next test
///
/// The first test of a run gets the warm-up budget, every later one the
/// steady budget, whatever the first test's outcome was.
#[derive(Debug, Clone)]
pub struct LimitPolicy {
    warm_up: Limits,
    steady: Limits,
    current: Limits,
}

impl LimitPolicy {
    pub fn new(warm_up: Limits, steady: Limits) -> Self {
        Self {
            warm_up,
            steady,
            current: warm_up,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let limits = |budget: TimeBudget| Limits {
            time_limit: budget.time_limit.into(),
            timeout: budget.timeout.into(),
            memory_limit: config.memory_limit.bytes(),
        };
        Self::new(limits(config.warm_up), limits(config.steady))
    }

    pub fn current(&self) -> &Limits {
        &self.current
    }

    fn warm_up(&mut self) {
        self.current = self.warm_up;
    }

    fn settle(&mut self) {
        self.current = self.steady;
    }
}

/// Verdict and details of one judged test
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub name: String,
    pub verdict: Verdict,
    /// Sandbox runs made, more than one only after time limits
    pub attempts: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub presentation_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Outcome of judging a whole submission
///
/// `tests` holds the judged tests in order; tests after the first failing
/// one are absent.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub timestamp: String,
    pub verdict: Verdict,
    pub tests: Vec<TestReport>,
}

impl SubmissionResult {
    /// A run that stopped before any test was judged
    pub fn halted(halt: &Halt) -> Self {
        Self {
            timestamp: create_timestamp(),
            verdict: halt.verdict(),
            tests: Vec::new(),
        }
    }

    pub fn verdict_of(&self, test_name: &str) -> Option<Verdict> {
        self.tests
            .iter()
            .find(|t| t.name == test_name)
            .map(|t| t.verdict)
    }

    /// Test names paired with their verdicts, in judging order
    pub fn verdicts(&self) -> impl Iterator<Item = (&str, Verdict)> + '_ {
        self.tests.iter().map(|t| (t.name.as_str(), t.verdict))
    }
}

enum State {
    Init,
    Running(usize),
    Done,
    Stopped(Verdict),
}

/// Drives the tests of one submission in order and stops at the first failure
pub struct Judge<'a> {
    runner: TestRunner<'a>,
    policy: LimitPolicy,
}

impl<'a> Judge<'a> {
    pub fn new(runner: TestRunner<'a>, policy: LimitPolicy) -> Self {
        Self { runner, policy }
    }

    /// Judges `tests`, which must already be in lexicographic order
    pub fn run(mut self, tests: &[TestCase]) -> SubmissionResult {
        let timestamp = create_timestamp();
        let mut reports = Vec::with_capacity(tests.len());
        let mut state = State::Init;

        let verdict = loop {
            state = match state {
                State::Init if tests.is_empty() => {
                    log::error!("No tests found, check that the task directory is named correctly");
                    State::Stopped(Verdict::NoTests)
                }
                State::Init => {
                    self.policy.warm_up();
                    State::Running(0)
                }
                State::Running(index) if index == tests.len() => State::Done,
                State::Running(index) => {
                    let test = &tests[index];
                    let report = self
                        .runner
                        .run(test, self.policy.current())
                        .unwrap_or_else(|halt| {
                            log::error!("Test {} aborted: {halt}", test.name);
                            TestReport {
                                name: test.name.clone(),
                                verdict: halt.verdict(),
                                attempts: 0,
                                presentation_error: false,
                                diagnostic: None,
                            }
                        });
                    self.policy.settle();

                    let verdict = report.verdict;
                    reports.push(report);
                    if verdict.is_accepted() {
                        State::Running(index + 1)
                    } else {
                        log::info!("Stopping the run.");
                        State::Stopped(verdict)
                    }
                }
                State::Done => break Verdict::Accepted,
                State::Stopped(verdict) => break verdict,
            };
        };

        SubmissionResult {
            timestamp,
            verdict,
            tests: reports,
        }
    }
}
