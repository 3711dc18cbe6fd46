use std::fs::File;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use tokio::runtime::Runtime;
use tokio::time::timeout;

use super::{Execution, Limits, SandboxError, SandboxRunner, Termination, Usage};

/// A runner that executes the solution as a plain child process
///
/// SimpleRunner caps the address space and CPU time through rlimits, reads
/// peak memory from `wait4` and kills the process once the hard timeout
/// passes. The solution leads its own process group, and the whole group is
/// killed when the run ends so nothing it forked outlives the test. It
/// provides no file system or permission isolation.
pub struct SimpleRunner {
    /// Drives the wall-clock timer around the blocking wait
    runtime: Runtime,
}

impl SimpleRunner {
    pub fn build() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        log::info!("SimpleRunner initialized successfully");
        log::warn!("SimpleRunner provides NO security isolation - use only in trusted environments");

        Ok(Self { runtime })
    }

    /// Waits for `pid`, killing its group if it outlives `limit`
    async fn wait_bounded(pid: libc::pid_t, limit: Duration) -> Result<(libc::c_int, u64, bool)> {
        let mut waiter = tokio::task::spawn_blocking(move || wait_with_usage(pid));

        let (waited, timed_out) = match timeout(limit, &mut waiter).await {
            Ok(joined) => (joined?, false),
            Err(_) => {
                // the child has not been reaped yet, so the group id is still ours
                kill_group(pid);
                (waiter.await?, true)
            }
        };

        let (status, memory) = waited.map_err(|e| anyhow!("wait4 failed: {e}"))?;
        Ok((status, memory, timed_out))
    }
}

impl SandboxRunner for SimpleRunner {
    fn run(
        &self,
        executable: &Path,
        input: &Path,
        output: &Path,
        limits: &Limits,
    ) -> Result<Execution, SandboxError> {
        let stdin = File::open(input).map_err(SandboxError::Launch)?;
        let stdout = File::create(output).map_err(SandboxError::Launch)?;

        let mut command = Command::new(executable);
        command
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .process_group(0);
        if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        apply_rlimits(&mut command, limits);

        let start_time = Instant::now();
        let child = command.spawn().map_err(SandboxError::Launch)?;
        let pid = child.id() as libc::pid_t;

        // `child` is reaped by wait4 below, never through std
        let waited = self
            .runtime
            .block_on(Self::wait_bounded(pid, limits.timeout));
        let wall_time = start_time.elapsed();
        // background processes left by the solution must not reach the next test
        kill_group(pid);
        drop(child);
        let (status, memory, timed_out) = waited?;

        let termination = if timed_out {
            Termination::TimedOut
        } else if libc::WIFSIGNALED(status) {
            Termination::Signaled(libc::WTERMSIG(status))
        } else {
            Termination::Exited(libc::WEXITSTATUS(status))
        };

        Ok(Execution {
            usage: Usage { wall_time, memory },
            termination,
        })
    }
}

/// Installs the resource limits in the child right before exec
///
/// The address space gets twice the memory limit so an overuse can still be
/// measured and reported as a memory limit instead of a crash.
fn apply_rlimits(command: &mut Command, limits: &Limits) {
    let address_space = limits.memory_limit.saturating_mul(2) as libc::rlim_t;
    let cpu_seconds = (limits.timeout.as_secs() + 1) as libc::rlim_t;

    unsafe {
        command.pre_exec(move || {
            if address_space > 0 {
                let limit = libc::rlimit {
                    rlim_cur: address_space,
                    rlim_max: address_space,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }

            let cpu_limit = libc::rlimit {
                rlim_cur: cpu_seconds,
                rlim_max: cpu_seconds,
            };
            if libc::setrlimit(libc::RLIMIT_CPU, &cpu_limit) != 0 {
                return Err(io::Error::last_os_error());
            }

            Ok(())
        });
    }
}

/// Sends SIGKILL to every process in the group led by `pgid`
///
/// An empty group is not an error.
fn kill_group(pgid: libc::pid_t) {
    // SAFETY: a negative pid addresses a process group and touches no memory
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("Cannot kill process group {pgid}: {err}");
        }
    }
}

/// Blocks until `pid` ends, returning its wait status and peak RSS in bytes
fn wait_with_usage(pid: libc::pid_t) -> io::Result<(libc::c_int, u64)> {
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut usage) };
        if rc == pid {
            // ru_maxrss is in kilobytes on Linux
            let memory = (usage.ru_maxrss.max(0) as u64) * 1024;
            return Ok((status, memory));
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
