//! Helpers for child processes: bounded waits, liveness probes, termination.

use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

/// Run a command with a timeout and capture stdout/stderr without risking
/// pipe deadlocks. Output is read concurrently while the child runs; a
/// timed-out child is killed and reported via `timed_out`, not an error.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!(timeout_secs = timeout.as_secs(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_output(stdout_handle).context("join stdout")?;
    let stderr = join_output(stderr_handle).context("join stderr")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

/// True when a process with this pid exists (signal 0 probe).
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Terminate a process: SIGTERM, a grace period, then SIGKILL if it is
/// still alive. Returns the name of the last signal sent, or `None` when
/// the process was already gone.
pub fn terminate(pid: u32, grace: Duration) -> Option<&'static str> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    if kill(target, None).is_err() {
        return None;
    }
    if kill(target, Signal::SIGTERM).is_err() {
        return None;
    }

    let deadline = std::time::Instant::now() + grace;
    while std::time::Instant::now() < deadline {
        if kill(target, None).is_err() {
            return Some("SIGTERM");
        }
        thread::sleep(Duration::from_millis(50));
    }

    if kill(target, Signal::SIGKILL).is_ok() {
        warn!(pid, "process survived SIGTERM, sent SIGKILL");
        return Some("SIGKILL");
    }
    Some("SIGTERM")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_output_within_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2"]);

        let output = run_with_timeout(cmd, Duration::from_secs(5)).expect("run");
        assert!(output.status.success());
        assert!(!output.timed_out);
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
    }

    #[test]
    fn kills_command_after_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");

        let output = run_with_timeout(cmd, Duration::from_millis(100)).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn probes_own_process_as_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn terminate_reports_none_for_dead_pid() {
        let mut child = Command::new("true").spawn().expect("spawn");
        child.wait().expect("wait");
        // The pid is reaped; the probe must not find it.
        assert_eq!(terminate(child.id(), Duration::from_millis(10)), None);
    }
}
