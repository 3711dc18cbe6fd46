use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    name = "arbiter",
    version = "0.1.0",
    about = "Judges one solution executable against a directory of tests",
    long_about = None
)]
pub struct CliArgs {
    /// Working directory, relative to the current directory
    #[arg(long, short = 'w', default_value = ".")]
    pub workdir: PathBuf,

    /// Directory with the tests, relative to the working directory
    #[arg(long, short = 't', default_value = "test")]
    pub testdir: PathBuf,

    /// Directory the verdict is written to, relative to the working directory
    #[arg(long, short = 'r', default_value = ".")]
    pub resultsdir: PathBuf,

    /// Executable under test; the single executable in `Debug/` if omitted
    #[arg(long, short = 's')]
    pub solution: Option<PathBuf>,

    /// Directory holding `checkers/<os>/`; defaults to this binary's directory
    #[arg(long = "tools-dir")]
    pub tools_dir: Option<PathBuf>,

    /// Sandbox backend used to run the solution
    #[arg(long, value_enum, default_value_t = SandboxKind::Simple)]
    pub sandbox: SandboxKind,

    /// Path to a JSON file with judging limits
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Load the judging configuration, falling back to defaults without a file
    pub fn to_config(&self) -> anyhow::Result<Config> {
        let Some(path) = &self.config_path else {
            return Ok(Config::default());
        };
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open config file {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("malformed config file {}", path.display()))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SandboxKind {
    /// Plain child process with rlimits and a wall-clock kill
    Simple,
    /// The `isolate` sandbox
    Isolate,
    /// `isolate` when installed, otherwise `simple`
    Auto,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Budget for the first test, absorbing cold-start costs
    pub warm_up: TimeBudget,
    /// Budget for every test after the first
    pub steady: TimeBudget,
    pub memory_limit: MegaByte,
    /// Sandbox attempts per test while the result is a time limit
    pub max_attempts: u32,
    pub checker_timeout: MilliSecond,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            warm_up: TimeBudget {
                time_limit: MilliSecond(3000),
                timeout: MilliSecond(6000),
            },
            steady: TimeBudget {
                time_limit: MilliSecond(1500),
                timeout: MilliSecond(3000),
            },
            memory_limit: MegaByte(256),
            max_attempts: 3,
            checker_timeout: MilliSecond(30_000),
        }
    }
}

/// Judged time limit plus the hard wall-clock bound given to the sandbox
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    pub time_limit: MilliSecond,
    pub timeout: MilliSecond,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MilliSecond(pub u64);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MegaByte(pub u64);

impl From<MilliSecond> for Duration {
    fn from(value: MilliSecond) -> Self {
        Duration::from_millis(value.0)
    }
}

impl MegaByte {
    pub fn bytes(self) -> u64 {
        self.0 * 1024 * 1024
    }
}
