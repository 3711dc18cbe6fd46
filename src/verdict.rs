use std::fmt;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Outcome of a single test or of a whole submission
///
/// Verdicts carry no ordering. A submission takes the verdict of its first
/// non-accepted test, not the "worst" one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "OK")]
    Accepted,
    /// Also covers presentation errors reported by the checker
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TL")]
    TimeLimitExceeded,
    #[serde(rename = "ML")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    /// The judge itself failed; never attributed to the candidate
    #[serde(rename = "FL")]
    Failure,
    #[serde(rename = "NT")]
    NoTests,
}

impl Verdict {
    /// The two-letter code written to the result file
    pub fn code(self) -> &'static str {
        match self {
            Self::Accepted => "OK",
            Self::WrongAnswer => "WA",
            Self::TimeLimitExceeded => "TL",
            Self::MemoryLimitExceeded => "ML",
            Self::RuntimeError => "RE",
            Self::Failure => "FL",
            Self::NoTests => "NT",
        }
    }

    #[inline]
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure that stops judging and decides the overall verdict
///
/// Every setup or infrastructure problem ends up here, usually as
/// [`Verdict::Failure`]. The cause is kept for the log.
#[derive(Debug)]
pub struct Halt {
    verdict: Verdict,
    cause: anyhow::Error,
}

impl Halt {
    pub fn new(verdict: Verdict, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            verdict,
            cause: cause.into(),
        }
    }

    /// Infrastructure failure with a plain message
    pub fn failure(message: impl fmt::Display) -> Self {
        Self::new(Verdict::Failure, anyhow!("{message}"))
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.verdict, self.cause)
    }
}

impl std::error::Error for Halt {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.cause)
    }
}

impl From<anyhow::Error> for Halt {
    fn from(cause: anyhow::Error) -> Self {
        Self::new(Verdict::Failure, cause)
    }
}

impl From<std::io::Error> for Halt {
    fn from(cause: std::io::Error) -> Self {
        Self::new(Verdict::Failure, cause)
    }
}
