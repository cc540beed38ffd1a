use std::{collections::HashMap, fs::File, path::Path, process::Stdio, time::Duration};

use anyhow::Result;
use tokio::{
    process::{Child, Command},
    time::timeout,
};

/// Where a spawned command's output goes.
pub enum OutputStrategy {
    /// stdout is collected into [`CommandOutput::stdout`], stderr is dropped
    Capture,
    /// stdout and stderr are appended to the same file
    ToFile(File),
    Silent,
}

impl OutputStrategy {
    fn configure(&self, cmd: &mut Command) -> Result<()> {
        match self {
            OutputStrategy::Capture => {
                cmd.stdout(Stdio::piped());
                cmd.stderr(Stdio::null());
            }
            OutputStrategy::ToFile(file) => {
                cmd.stdout(Stdio::from(file.try_clone()?));
                cmd.stderr(Stdio::from(file.try_clone()?));
            }
            OutputStrategy::Silent => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub status_code: Option<i32>,
    pub stdout: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished(CommandOutput),
    /// the process was killed after the deadline
    TimedOut,
}

fn build_command(
    program: &str,
    args: &[String],
    current_dir: &Path,
    output: &OutputStrategy,
    env: Option<&HashMap<String, String>>,
) -> Result<Command> {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(current_dir).stdin(Stdio::null());
    output.configure(&mut cmd)?;

    if let Some(vars) = env {
        cmd.envs(vars);
    }
    Ok(cmd)
}

/// Runs a command to completion, killing it and every process it started if
/// it outlives `limit`.
///
/// Errors only when the process cannot be spawned or waited on; a non-zero
/// exit status is a normal [`RunOutcome::Finished`].
pub async fn run_command_with_timeout(
    program: &str,
    args: &[String],
    current_dir: &Path,
    limit: Duration,
    output: OutputStrategy,
    env: Option<&HashMap<String, String>>,
) -> Result<RunOutcome> {
    let mut cmd = build_command(program, args, current_dir, &output, env)?;
    // dropping the wait future on timeout kills the child
    cmd.kill_on_drop(true);
    // own group, so whatever the child spawns can be killed with it
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id();

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(out)) => Ok(RunOutcome::Finished(CommandOutput {
            status_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        })),
        Ok(Err(e)) => Err(anyhow::anyhow!("Error during execution : {}", e)),
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Ok(RunOutcome::TimedOut)
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    // ESRCH only means the whole group is already gone
    let _ = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Spawns a command and returns without waiting for it.
///
/// The child is not killed when the returned handle is dropped, so it keeps
/// running after the watcher exits.
pub fn run_command_background(
    program: &str,
    args: &[String],
    current_dir: &Path,
    output: OutputStrategy,
    env: Option<&HashMap<String, String>>,
) -> Result<Child> {
    let mut cmd = build_command(program, args, current_dir, &output, env)?;
    let child = cmd.spawn()?;
    Ok(child)
}
