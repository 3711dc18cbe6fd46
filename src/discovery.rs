use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

use crate::config::CliArgs;
use crate::verdict::{Halt, Verdict};

/// Directory inside the working directory searched when no solution is given
const DEFAULT_SOLUTION_DIR: &str = "Debug";
/// Suffix of the reference answer next to each test input
const ANSWER_SUFFIX: &str = ".a";
/// Length of a test name, e.g. `01`
const TEST_NAME_LEN: usize = 2;
const PROBE_FILENAME: &str = "###qqq@@.json";

/// One test: its input and the reference answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub input: PathBuf,
    pub answer: PathBuf,
}

/// Everything found on disk before judging starts
#[derive(Debug, Clone)]
pub struct Workspace {
    pub task_name: String,
    pub workdir: PathBuf,
    pub solution: PathBuf,
    pub checker: PathBuf,
    pub tests: Vec<TestCase>,
}

impl Workspace {
    /// Resolves directories, tests, checker and solution from the arguments
    pub fn discover(cli: &CliArgs) -> Result<Self, Halt> {
        let cwd = std::env::current_dir().context("cannot determine the current directory")?;
        let workdir = existing_dir("workdir", &cwd.join(&cli.workdir))?;
        let testdir = existing_dir("testdir", &workdir.join(&cli.testdir))?;
        let resultsdir = existing_dir("resultsdir", &workdir.join(&cli.resultsdir))?;

        let tests = discover_tests(&testdir)?;
        if tests.is_empty() {
            log::error!(
                "No tests found in {}, check that the task is named correctly",
                testdir.display()
            );
            return Err(Halt::new(
                Verdict::NoTests,
                anyhow!("no tests in {}", testdir.display()),
            ));
        }
        check_writable("workdir", &workdir)?;
        check_writable("resultsdir", &resultsdir)?;
        let task_name = task_name(&workdir);

        log::debug!(
            "FOUND TESTS: {}",
            tests.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(" ")
        );

        let tools_dir = match &cli.tools_dir {
            Some(dir) => cwd.join(dir),
            None => default_tools_dir()?,
        };
        let known = known_checkers(&tools_dir)?;
        let checker = select_checker(&testdir, &workdir, &known)?;
        log::debug!("FOUND CHECKER: {}", checker.display());

        let solution = find_solution(&workdir, cli.solution.as_deref())?;
        log::debug!("FOUND SOLUTION: {}", solution.display());

        Ok(Self {
            task_name,
            workdir,
            solution,
            checker,
            tests,
        })
    }
}

fn existing_dir(role: &str, path: &Path) -> Result<PathBuf, Halt> {
    if !path.is_dir() {
        log::error!("Cannot find {role} directory \"{}\"", path.display());
        return Err(Halt::failure(format!("{role} {} is not a directory", path.display())));
    }
    Ok(path.canonicalize()?)
}

/// Creates and removes a probe file to make sure `dir` accepts writes
fn check_writable(role: &str, dir: &Path) -> Result<(), Halt> {
    let probe = dir.join(PROBE_FILENAME);
    fs::write(&probe, b"")
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|e| {
            log::error!("Cannot write to {role} directory \"{}\": {e}", dir.display());
            Halt::failure(format!("{role} {} is not writable", dir.display()))
        })
}

/// The directory's name with everything but `[A-Za-z0-9_.]` removed
pub fn task_name(workdir: &Path) -> String {
    workdir
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Lists the tests of `testdir` in lexicographic order
///
/// A test is a regular, non-hidden file with a two-character name; its
/// answer is the file of the same name with an `.a` suffix and must exist.
pub fn discover_tests(testdir: &Path) -> Result<Vec<TestCase>, Halt> {
    let mut tests = Vec::new();
    for entry in fs::read_dir(testdir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.')
            || name.chars().count() != TEST_NAME_LEN
            || !entry.file_type()?.is_file()
        {
            continue;
        }
        let input = entry.path();
        let answer = testdir.join(format!("{name}{ANSWER_SUFFIX}"));
        if !answer.is_file() {
            log::error!("Test {name} has no answer file {}", answer.display());
            return Err(Halt::failure(format!("missing answer for test {name}")));
        }
        tests.push(TestCase {
            name,
            input,
            answer,
        });
    }
    tests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tests)
}

fn default_tools_dir() -> Result<PathBuf, Halt> {
    let exe = std::env::current_exe().context("cannot locate the arbiter binary")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| Halt::failure("the arbiter binary has no parent directory"))
}

/// Standard checkers shipped in `<tools>/checkers/<os>/`, keyed by file stem
pub fn known_checkers(tools_dir: &Path) -> Result<HashMap<String, PathBuf>, Halt> {
    let dir = tools_dir.join("checkers").join(std::env::consts::OS);
    let mut checkers = HashMap::new();
    if dir.is_dir() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !is_executable(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                checkers.insert(stem.to_string_lossy().into_owned(), path.canonicalize()?);
            }
        }
    }
    let mut names: Vec<_> = checkers.keys().map(String::as_str).collect();
    names.sort_unstable();
    log::debug!("FOUND STANDARD CHECKERS ({}): {names:?}", dir.display());
    Ok(checkers)
}

/// Picks the checker named by the test directory
///
/// The test directory must hold exactly one candidate: either a file named
/// like a standard checker, which is then copied into the working
/// directory, or a custom `check`/`check.exe` used in place.
pub fn select_checker(
    testdir: &Path,
    workdir: &Path,
    known: &HashMap<String, PathBuf>,
) -> Result<PathBuf, Halt> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(testdir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let file_name = path.file_name().unwrap_or_default().to_string_lossy().to_lowercase();
        let stem = path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
        if is_custom_checker(&file_name) || known.contains_key(&stem) {
            candidates.push(path);
        }
    }
    candidates.sort();

    let [candidate] = candidates.as_slice() else {
        log::error!("The test directory must contain EITHER:");
        log::error!("    1) a file named like a standard checker, OR");
        log::error!("    2) a custom checker named check or check.exe");
        log::error!("    candidates: {candidates:?}");
        return Err(Halt::failure(format!(
            "expected exactly one checker in {}, found {}",
            testdir.display(),
            candidates.len()
        )));
    };

    let file_name = candidate.file_name().unwrap_or_default().to_string_lossy().to_lowercase();
    if is_custom_checker(&file_name) {
        return Ok(candidate.canonicalize()?);
    }

    let stem = candidate.file_stem().unwrap_or_default().to_string_lossy();
    let source = &known[&*stem];
    let target = workdir.join(source.file_name().unwrap_or_default());
    fs::copy(source, &target)
        .with_context(|| format!("cannot copy checker {} into the workdir", source.display()))?;
    Ok(target)
}

fn is_custom_checker(lowercase_name: &str) -> bool {
    matches!(lowercase_name, "check" | "check.exe")
}

/// Resolves the solution executable
///
/// An explicit path is taken relative to the working directory. Without one,
/// `Debug/` must contain exactly one executable.
pub fn find_solution(workdir: &Path, explicit: Option<&Path>) -> Result<PathBuf, Halt> {
    if let Some(path) = explicit {
        let path = workdir.join(path);
        if !path.is_file() {
            log::error!("Solution file not found ({})", path.display());
            return Err(Halt::failure(format!("no solution at {}", path.display())));
        }
        return Ok(path.canonicalize()?);
    }

    let dir = workdir.join(DEFAULT_SOLUTION_DIR);
    let mut found = Vec::new();
    if dir.is_dir() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if is_executable(&path) {
                found.push(path);
            }
        }
    }

    match found.as_slice() {
        [solution] => Ok(solution.canonicalize()?),
        [] => {
            log::error!("Solution file not found ({}/*)", dir.display());
            Err(Halt::failure("no solution executable found"))
        }
        _ => {
            log::error!(
                "Without an explicit solution, {} must hold exactly one executable",
                dir.display()
            );
            Err(Halt::failure("more than one solution executable found"))
        }
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    meta.is_file()
        && (meta.permissions().mode() & 0o111 != 0
            || path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("exe")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_task_name_is_sanitized() {
        assert_eq!(task_name(Path::new("/judge/Task 1-b.v2")), "Task1b.v2");
        assert_eq!(task_name(Path::new("/judge/задача_7")), "_7");
    }

    #[test]
    fn test_tests_are_sorted_two_letter_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["10", "02", "01"] {
            fs::write(dir.path().join(name), "").unwrap();
            fs::write(dir.path().join(format!("{name}.a")), "").unwrap();
        }
        fs::write(dir.path().join("check"), "").unwrap();
        fs::write(dir.path().join("003"), "").unwrap();
        fs::create_dir(dir.path().join("04")).unwrap();

        let tests = discover_tests(dir.path()).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["01", "02", "10"]);
        assert_eq!(tests[0].answer, dir.path().join("01.a"));
    }

    #[test]
    fn test_hidden_files_are_not_tests() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".x"), "").unwrap();
        fs::write(dir.path().join("01"), "").unwrap();
        fs::write(dir.path().join("01.a"), "").unwrap();

        let tests = discover_tests(dir.path()).unwrap();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name, "01");
    }

    #[test]
    fn test_missing_answer_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01"), "").unwrap();
        assert!(discover_tests(dir.path()).is_err());
    }

    #[test]
    fn test_empty_test_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_tests(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_custom_checker_used_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let testdir = dir.path().join("test");
        fs::create_dir(&testdir).unwrap();
        touch(&testdir.join("check"), 0o755);

        let checker = select_checker(&testdir, dir.path(), &HashMap::new()).unwrap();
        assert_eq!(checker, testdir.join("check").canonicalize().unwrap());
    }

    #[test]
    fn test_known_checker_copied_to_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let tools = dir.path().join("tools");
        let os_dir = tools.join("checkers").join(std::env::consts::OS);
        fs::create_dir_all(&os_dir).unwrap();
        touch(&os_dir.join("fcmp_rtrim"), 0o755);
        touch(&os_dir.join("readme"), 0o644);
        let testdir = dir.path().join("test");
        fs::create_dir(&testdir).unwrap();
        fs::write(testdir.join("fcmp_rtrim"), "").unwrap();

        let known = known_checkers(&tools).unwrap();
        assert_eq!(known.len(), 1);
        let checker = select_checker(&testdir, dir.path(), &known).unwrap();
        assert_eq!(checker, dir.path().join("fcmp_rtrim"));
        assert!(checker.exists());
    }

    #[test]
    fn test_ambiguous_checker_fails() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("check"), 0o755);
        touch(&dir.path().join("CHECK.EXE"), 0o755);
        assert!(select_checker(dir.path(), dir.path(), &HashMap::new()).is_err());
        let empty = tempfile::tempdir().unwrap();
        assert!(select_checker(empty.path(), dir.path(), &HashMap::new()).is_err());
    }

    #[test]
    fn test_default_solution_must_be_unique() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_solution(dir.path(), None).is_err());

        let debug = dir.path().join(DEFAULT_SOLUTION_DIR);
        fs::create_dir(&debug).unwrap();
        touch(&debug.join("solution"), 0o755);
        touch(&debug.join("notes.txt"), 0o644);
        assert_eq!(
            find_solution(dir.path(), None).unwrap(),
            debug.join("solution").canonicalize().unwrap()
        );

        touch(&debug.join("other.exe"), 0o644);
        assert!(find_solution(dir.path(), None).is_err());
        assert!(find_solution(dir.path(), Some(Path::new("Debug/other.exe"))).is_ok());
        assert!(find_solution(dir.path(), Some(Path::new("Debug/none"))).is_err());
    }
}
