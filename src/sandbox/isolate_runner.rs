use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};

use super::{Execution, Limits, SandboxError, SandboxRunner, Termination, Usage};

// Sandbox configuration constants
const RUNTIME_PROCESSES: u32 = 4;
const RUNTIME_OPEN_FILES: u32 = 30;
const RUNTIME_FILE_SIZE: u32 = 16384; // KB

const EXECUTABLE_NAME: &str = "main";
const STDIN_NAME: &str = "stdin.txt";
const STDOUT_NAME: &str = "stdout.txt";

/// A sandbox that runs the solution inside an `isolate` box
///
/// The box is initialized once and reinitialized before every run so no
/// file survives from one test to the next.
pub struct IsolateRunner {
    /// Box number passed to `isolate -b`
    id: u8,
    /// Path to the box's working directory (inside isolate)
    box_dir: PathBuf,
    /// Meta file written by isolate, kept outside the box
    meta_path: PathBuf,
}

impl IsolateRunner {
    pub fn build(id: u8) -> Result<Self> {
        let box_dir = Self::initialize_isolate_sandbox(id)?;
        let meta_path = std::env::temp_dir().join(format!("arbiter-isolate-{id}.meta"));

        log::info!("IsolateRunner {id} initialized at {}", box_dir.display());
        Ok(Self {
            id,
            box_dir,
            meta_path,
        })
    }

    /// Initializes the isolate sandbox and returns the box directory
    fn initialize_isolate_sandbox(id: u8) -> Result<PathBuf> {
        let output = Command::new("isolate")
            .arg("-b")
            .arg(id.to_string())
            .arg("--cg")
            .arg("--init")
            .output()
            .map_err(|e| anyhow!("Failed to spawn isolate --init: {}", e))?;

        if !output.status.success() {
            bail!(
                "isolate --init exited with non-zero status; stderr={}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let root_dir_absolute = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root_dir_absolute.is_empty() {
            bail!(
                "isolate --init produced empty stdout; stderr={}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(PathBuf::from(root_dir_absolute).join("box"))
    }

    /// Brings the box back to a pristine state
    fn reinit(&self) -> Result<()> {
        Self::initialize_isolate_sandbox(self.id)?;
        log::debug!("IsolateRunner {} reinitialized", self.id);
        Ok(())
    }

    /// Copies the solution and its input into the box
    fn prepare_box(&self, executable: &Path, input: &Path) -> Result<(), SandboxError> {
        let boxed_executable = self.box_dir.join(EXECUTABLE_NAME);
        fs::copy(executable, &boxed_executable).map_err(SandboxError::Launch)?;
        fs::set_permissions(&boxed_executable, fs::Permissions::from_mode(0o755))
            .map_err(SandboxError::Launch)?;
        fs::copy(input, self.box_dir.join(STDIN_NAME)).map_err(SandboxError::Launch)?;
        Ok(())
    }

    /// Runs the boxed solution; isolate itself enforces the hard timeout
    fn execute_in_box(&self, limits: &Limits) -> Result<()> {
        let sandbox_id = self.id.to_string();
        let wall_time_arg = format!("--wall-time={:.3}", limits.timeout.as_secs_f64());
        let memory_arg = format!("--cg-mem={}", cgroup_memory_kb(limits));
        let processes_arg = format!("--processes={RUNTIME_PROCESSES}");
        let open_files_arg = format!("--open-files={RUNTIME_OPEN_FILES}");
        let fsize_arg = format!("--fsize={RUNTIME_FILE_SIZE}");
        let meta_path = self.meta_path.to_string_lossy();
        let executable = format!("./{EXECUTABLE_NAME}");

        let _ = fs::remove_file(&self.meta_path);
        Command::new("isolate")
            .args([
                "-b",
                &sandbox_id,
                "--cg",
                "--run",
                &wall_time_arg,
                &memory_arg,
                &processes_arg,
                &open_files_arg,
                &fsize_arg,
                "-E",
                "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
                "-M",
                &meta_path,
                "-i",
                STDIN_NAME,
                "-o",
                STDOUT_NAME,
                "--silent",
                "--",
                &executable,
            ])
            .output()
            .map_err(|e| anyhow!("Failed to spawn isolate --run: {}", e))?;

        Ok(())
    }
}

impl SandboxRunner for IsolateRunner {
    fn run(
        &self,
        executable: &Path,
        input: &Path,
        output: &Path,
        limits: &Limits,
    ) -> Result<Execution, SandboxError> {
        self.reinit()?;
        self.prepare_box(executable, input)?;
        self.execute_in_box(limits)?;

        let meta_content = fs::read_to_string(&self.meta_path)
            .map_err(|e| anyhow!("Failed to read meta file: {}", e))?;
        let execution = process_meta_content(&meta_content, limits)?;

        // A killed solution may leave no output behind
        match fs::copy(self.box_dir.join(STDOUT_NAME), output) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::write(output, b"").map_err(|e| anyhow!("Failed to write output: {}", e))?;
            }
            Err(e) => return Err(anyhow!("Failed to copy output out of the box: {}", e).into()),
        }

        Ok(execution)
    }
}

/// Memory handed to the cgroup, twice the judged limit so overuse is measurable
fn cgroup_memory_kb(limits: &Limits) -> u64 {
    limits.memory_limit.saturating_mul(2) / 1024
}

/// Turns an isolate meta file into an [`Execution`]
fn process_meta_content(meta_content: &str, limits: &Limits) -> Result<Execution> {
    let mut usage = Usage::default();
    let mut exit_code = 0;
    let mut signal = None;
    let mut timed_out = false;
    let mut oom_killed = false;

    for line in meta_content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "time-wall" => {
                if let Ok(secs) = value.parse::<f64>() {
                    usage.wall_time = Duration::from_secs_f64(secs);
                }
            }
            "cg-mem" | "max-rss" => {
                if let Ok(kb) = value.parse::<u64>() {
                    usage.memory = usage.memory.max(kb * 1024);
                }
            }
            "exitcode" => exit_code = value.parse().unwrap_or(-1),
            "exitsig" => signal = value.parse().ok(),
            "cg-oom-killed" => oom_killed = true,
            "status" => match value {
                "TO" => timed_out = true,
                "XX" => bail!("isolate reported an internal error"),
                _ => {}
            },
            "message" => log::debug!("  isolate: {value}"),
            _ => {}
        }
    }

    if oom_killed {
        usage.memory = usage.memory.max(cgroup_memory_kb(limits) * 1024);
    }

    let termination = if timed_out {
        Termination::TimedOut
    } else if let Some(signal) = signal {
        Termination::Signaled(signal)
    } else {
        Termination::Exited(exit_code)
    };

    Ok(Execution { usage, termination })
}
