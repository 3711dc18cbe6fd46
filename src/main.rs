use std::process::ExitCode;

use clap::Parser;

use arbiter::checker::ProcessChecker;
use arbiter::config::CliArgs;
use arbiter::discovery::Workspace;
use arbiter::judge::{Judge, LimitPolicy, SubmissionResult, TestRunner};
use arbiter::logging::{self, LOG_FILENAME};
use arbiter::report::ResultSink;
use arbiter::retry::Retry;
use arbiter::sandbox::create_sandbox_runner;
use arbiter::scratch::ScratchFiles;
use arbiter::verdict::{Halt, Verdict};

/// Any verdict other than OK
const EXIT_REJECTED: u8 = 254;
/// No verdict could be determined or persisted
const EXIT_CATASTROPHIC: u8 = 255;

fn main() -> ExitCode {
    let log_path = match std::env::current_dir() {
        Ok(dir) => dir.join(LOG_FILENAME),
        Err(e) => {
            eprintln!("ERROR: cannot determine the current directory: {e}");
            return ExitCode::from(EXIT_CATASTROPHIC);
        }
    };
    if let Err(e) = logging::setup_logging(&log_path) {
        eprintln!("ERROR setting up loggers: {e:#}");
        return ExitCode::from(EXIT_CATASTROPHIC);
    }

    let exit_code = match judge_submission() {
        Ok(Verdict::Accepted) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_REJECTED),
        Err(e) => {
            log::error!("Judging could not complete: {e:#}");
            ExitCode::from(EXIT_CATASTROPHIC)
        }
    };

    if let Err(e) = logging::echo_log(&log_path) {
        eprintln!("ERROR: cannot print {}: {e}", log_path.display());
    }
    exit_code
}

/// Judges the submission and persists its verdict
///
/// Errors here mean not even a verdict file could be produced.
fn judge_submission() -> anyhow::Result<Verdict> {
    let cli = match CliArgs::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            log::error!("Cannot read command line arguments: {e}");
            return Err(e.into());
        }
        Err(e) => e.exit(),
    };
    let sink = ResultSink::from_cli(&cli)?;

    let result = prepare_and_judge(&cli).unwrap_or_else(|halt| {
        log::error!("{halt}");
        SubmissionResult::halted(&halt)
    });

    log::info!(
        "=== Judging of task {} finished, VERDICT: {} ===",
        sink.task_name(),
        result.verdict
    );
    if let Err(e) = sink.write_report(&result) {
        log::warn!("Detailed report not written: {e:#}");
    }
    sink.write_verdict(result.verdict)?;
    Ok(result.verdict)
}

fn prepare_and_judge(cli: &CliArgs) -> Result<SubmissionResult, Halt> {
    let config = cli.to_config()?;
    let workspace = Workspace::discover(cli)?;
    let sandbox = create_sandbox_runner(cli.sandbox)?;

    let scratch = ScratchFiles::new(&workspace.workdir);
    let checker = ProcessChecker::build(
        &workspace.checker,
        scratch.checker_log(),
        config.checker_timeout.into(),
    )?;
    let runner = TestRunner::new(
        sandbox.as_ref(),
        &checker,
        &scratch,
        &workspace.solution,
        Retry::new(config.max_attempts),
    );

    log::info!("=== Judging of task {} started ===", workspace.task_name);
    let judge = Judge::new(runner, LimitPolicy::from_config(&config));
    Ok(judge.run(&workspace.tests))
}
