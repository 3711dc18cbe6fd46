//! Transient files the judge shares with the solution and the checker.
//!
//! All of them live in the working directory and match `put???.txt`, so one
//! sweep removes whatever a test left behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::verdict::Halt;

pub const INPUT_FILENAME: &str = "putin1.txt";
pub const OUTPUT_FILENAME: &str = "putout.txt";
pub const ANSWER_FILENAME: &str = "putans.txt";
pub const CHECKER_LOG_FILENAME: &str = "putchk.txt";

/// Fixed locations of the staged input, produced output and checker log
#[derive(Debug, Clone)]
pub struct ScratchFiles {
    dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    checker_log: PathBuf,
}

impl ScratchFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            input: dir.join(INPUT_FILENAME),
            output: dir.join(OUTPUT_FILENAME),
            checker_log: dir.join(CHECKER_LOG_FILENAME),
            dir,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn checker_log(&self) -> &Path {
        &self.checker_log
    }

    /// Copies a test's input to where the solution expects it
    pub fn stage_input(&self, test_input: &Path) -> Result<(), Halt> {
        log::debug!(
            "  staging {} as {}",
            test_input.display(),
            self.input.display()
        );
        fs::copy(test_input, &self.input).map_err(|e| {
            Halt::failure(format!(
                "cannot stage {} as {}: {e}",
                test_input.display(),
                self.input.display()
            ))
        })?;
        Ok(())
    }

    /// Removes every transient file from the working directory
    ///
    /// Files that are already gone are fine. Anything that cannot be removed
    /// stops the whole run: the next test would see stale data.
    pub fn cleanup(&self) -> Result<(), Halt> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Halt::failure(format!("cannot list {}: {e}", self.dir.display()))),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if !is_transient(&name.to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => log::trace!("removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!("Cannot remove transient test file {}: {e}", path.display());
                    return Err(Halt::failure(format!("cannot remove {}: {e}", path.display())));
                }
            }
        }
        Ok(())
    }
}

/// Matches `put???.txt`
fn is_transient(name: &str) -> bool {
    name.len() == 10 && name.is_char_boundary(6) && name.starts_with("put") && name.ends_with(".txt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_pattern() {
        for name in [INPUT_FILENAME, OUTPUT_FILENAME, ANSWER_FILENAME, CHECKER_LOG_FILENAME] {
            assert!(is_transient(name), "{name}");
        }
        assert!(!is_transient("put.txt"));
        assert!(!is_transient("putin12.txt"));
        assert!(!is_transient("output.txt"));
        assert!(!is_transient("putout.dat"));
    }

    #[test]
    fn test_cleanup_removes_only_transient_files() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFiles::new(dir.path());
        fs::write(scratch.input(), "1 2").unwrap();
        fs::write(scratch.output(), "3").unwrap();
        fs::write(dir.path().join("putxyz.txt"), "").unwrap();
        fs::write(dir.path().join("solution.exe"), "").unwrap();

        scratch.cleanup().unwrap();

        assert!(!scratch.input().exists());
        assert!(!scratch.output().exists());
        assert!(!dir.path().join("putxyz.txt").exists());
        assert!(dir.path().join("solution.exe").exists());
    }

    #[test]
    fn test_cleanup_of_clean_directory() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFiles::new(dir.path());
        scratch.cleanup().unwrap();
        scratch.cleanup().unwrap();

        let missing = ScratchFiles::new(dir.path().join("gone"));
        missing.cleanup().unwrap();
    }

    #[test]
    fn test_stage_input_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFiles::new(dir.path());
        let first = dir.path().join("01");
        let second = dir.path().join("02");
        fs::write(&first, "first").unwrap();
        fs::write(&second, "second").unwrap();

        scratch.stage_input(&first).unwrap();
        scratch.stage_input(&second).unwrap();
        assert_eq!(fs::read_to_string(scratch.input()).unwrap(), "second");

        let halt = scratch.stage_input(&dir.path().join("03")).unwrap_err();
        assert_eq!(halt.verdict(), crate::verdict::Verdict::Failure);
    }
}
