/// Bounded retry of a single step
///
/// The step is attempted at least once and at most `max_attempts` times,
/// stopping as soon as the predicate no longer asks for another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retry {
    max_attempts: u32,
}

impl Retry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs `step` with the 1-based attempt number, returning the last
    /// outcome together with the number of attempts made
    pub fn run<T>(
        &self,
        mut step: impl FnMut(u32) -> T,
        should_retry: impl Fn(&T) -> bool,
    ) -> (T, u32) {
        let mut attempt = 1;
        loop {
            let outcome = step(attempt);
            if attempt >= self.max_attempts || !should_retry(&outcome) {
                return (outcome, attempt);
            }
            attempt += 1;
        }
    }
}
