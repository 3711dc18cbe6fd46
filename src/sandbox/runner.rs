use std::fmt;
use std::path::Path;

use super::{Execution, Limits};

/// Trait for the external component that launches the solution
///
/// An implementation binds stdin and stdout of `executable` to the given
/// files, enforces the limits as well as it can, and must always return
/// within `limits.timeout` plus a bounded overhead. Judging a run against
/// the limits is not its job: see [`super::execute`].
pub trait SandboxRunner {
    fn run(
        &self,
        executable: &Path,
        input: &Path,
        output: &Path,
        limits: &Limits,
    ) -> Result<Execution, SandboxError>;
}

/// The sandbox could not produce a measurement at all
#[derive(Debug)]
pub enum SandboxError {
    /// The process never started
    Launch(std::io::Error),
    /// Anything else that went wrong inside the sandbox call
    Internal(anyhow::Error),
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch(e) => write!(f, "failed to launch: {e}"),
            Self::Internal(e) => write!(f, "sandbox error: {e:#}"),
        }
    }
}

impl std::error::Error for SandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Launch(e) => Some(e),
            Self::Internal(e) => Some(&**e),
        }
    }
}

impl From<anyhow::Error> for SandboxError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}
