mod isolate_runner;
mod runner;
mod simple_runner;

pub use isolate_runner::IsolateRunner;
pub use runner::{SandboxError, SandboxRunner};
pub use simple_runner::SimpleRunner;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::config::SandboxKind;
use crate::verdict::Verdict;

/// Box id used when the judge drives `isolate`
const ISOLATE_BOX_ID: u8 = 0;

/// Limits a single solution run is judged against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Wall time above which the run is a time limit
    pub time_limit: Duration,
    /// Hard bound after which the sandbox kills the solution
    pub timeout: Duration,
    /// Peak memory in bytes above which the run is a memory limit
    pub memory_limit: u64,
}

/// Resources consumed by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub wall_time: Duration,
    pub memory: u64,
}

/// How the solution process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    /// Killed by the sandbox at the hard timeout
    TimedOut,
}

/// What the sandbox reports for a run that did start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub usage: Usage,
    pub termination: Termination,
}

impl Execution {
    /// Classifies the run against the judge's own limits
    ///
    /// The sandbox may enforce different thresholds, so memory and time are
    /// compared here again. Memory wins over time, time over abnormal exit.
    pub fn verdict(&self, limits: &Limits) -> Verdict {
        if self.usage.memory > limits.memory_limit {
            Verdict::MemoryLimitExceeded
        } else if self.termination == Termination::TimedOut
            || self.usage.wall_time > limits.time_limit
        {
            Verdict::TimeLimitExceeded
        } else if self.termination != Termination::Exited(0) {
            Verdict::RuntimeError
        } else {
            Verdict::Accepted
        }
    }
}

/// Runs the solution once and turns the outcome into a verdict
///
/// Never retries. A sandbox that fails to produce a measurement yields
/// a runtime error.
pub fn execute(
    sandbox: &dyn SandboxRunner,
    executable: &Path,
    input: &Path,
    output: &Path,
    limits: &Limits,
) -> Verdict {
    match sandbox.run(executable, input, output, limits) {
        Ok(execution) => {
            let verdict = execution.verdict(limits);
            log::debug!(
                "  run finished: {:?}, {} ms, {} KB -> {verdict}",
                execution.termination,
                execution.usage.wall_time.as_millis(),
                execution.usage.memory / 1024,
            );
            verdict
        }
        Err(e) => {
            log::info!("  run failed: {e}");
            Verdict::RuntimeError
        }
    }
}

/// Creates the sandbox backend selected on the command line
///
/// `Auto` picks isolate when `which isolate` finds it.
pub fn create_sandbox_runner(kind: SandboxKind) -> Result<Box<dyn SandboxRunner>> {
    let use_isolate = match kind {
        SandboxKind::Simple => false,
        SandboxKind::Isolate => true,
        SandboxKind::Auto => std::process::Command::new("which")
            .arg("isolate")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false),
    };

    if use_isolate {
        log::info!("Using IsolateRunner (box {ISOLATE_BOX_ID})");
        Ok(Box::new(IsolateRunner::build(ISOLATE_BOX_ID)?))
    } else {
        log::info!("Using SimpleRunner");
        Ok(Box::new(SimpleRunner::build()?))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use super::*;

    const LIMITS: Limits = Limits {
        time_limit: Duration::from_millis(1000),
        timeout: Duration::from_millis(2000),
        memory_limit: 64 * 1024 * 1024,
    };

    struct FixedSandbox {
        outcome: fn() -> Result<Execution, SandboxError>,
        calls: Cell<u32>,
    }

    impl SandboxRunner for FixedSandbox {
        fn run(&self, _: &Path, _: &Path, _: &Path, _: &Limits) -> Result<Execution, SandboxError> {
            self.calls.set(self.calls.get() + 1);
            (self.outcome)()
        }
    }

    fn run_with(outcome: fn() -> Result<Execution, SandboxError>) -> Verdict {
        let sandbox = FixedSandbox {
            outcome,
            calls: Cell::new(0),
        };
        let p = Path::new("unused");
        let verdict = execute(&sandbox, p, p, p, &LIMITS);
        assert_eq!(sandbox.calls.get(), 1);
        verdict
    }

    fn exited(wall_ms: u64, memory: u64, code: i32) -> Execution {
        Execution {
            usage: Usage {
                wall_time: Duration::from_millis(wall_ms),
                memory,
            },
            termination: Termination::Exited(code),
        }
    }

    #[test]
    fn test_clean_run_is_accepted() {
        assert_eq!(run_with(|| Ok(exited(999, 1024, 0))), Verdict::Accepted);
        assert_eq!(run_with(|| Ok(exited(1000, LIMITS.memory_limit, 0))), Verdict::Accepted);
    }

    #[test]
    fn test_judge_limits_are_rechecked() {
        assert_eq!(run_with(|| Ok(exited(1001, 0, 0))), Verdict::TimeLimitExceeded);
        assert_eq!(
            run_with(|| Ok(exited(10, LIMITS.memory_limit + 1, 0))),
            Verdict::MemoryLimitExceeded
        );
        // memory is reported even when the run was also too slow
        assert_eq!(
            run_with(|| Ok(exited(5000, LIMITS.memory_limit + 1, 0))),
            Verdict::MemoryLimitExceeded
        );
    }

    #[test]
    fn test_kill_at_timeout_is_time_limit() {
        let verdict = run_with(|| {
            Ok(Execution {
                usage: Usage::default(),
                termination: Termination::TimedOut,
            })
        });
        assert_eq!(verdict, Verdict::TimeLimitExceeded);
    }

    #[test]
    fn test_abnormal_exit_is_runtime_error() {
        assert_eq!(run_with(|| Ok(exited(10, 0, 3))), Verdict::RuntimeError);
        let verdict = run_with(|| {
            Ok(Execution {
                usage: Usage::default(),
                termination: Termination::Signaled(libc::SIGSEGV),
            })
        });
        assert_eq!(verdict, Verdict::RuntimeError);
    }

    #[test]
    fn test_sandbox_errors_are_runtime_errors() {
        let verdict =
            run_with(|| Err(SandboxError::Launch(io::Error::from(io::ErrorKind::NotFound))));
        assert_eq!(verdict, Verdict::RuntimeError);
        let verdict = run_with(|| Err(anyhow::anyhow!("meta file missing").into()));
        assert_eq!(verdict, Verdict::RuntimeError);
    }
}
