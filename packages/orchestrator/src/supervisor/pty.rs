//! Pseudo-terminal plumbing for worker processes.
//!
//! Each worker runs attached to a fresh pty pair in its own session,
//! so interactive prompts work and the whole process group can be
//! killed in one shot. The supervisor keeps only the controlling end.

use anyhow::{Context, Result};
use nix::pty::openpty;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setsid, Pid};
use std::fs::File;
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use tracing::warn;

/// A spawned worker with the controlling end split for the two relay
/// threads.
pub struct PtyChild {
    pub child: Child,
    pub output: File,
    pub input: File,
}

/// Spawn `command` attached to a new pty, in its own session.
pub fn spawn(mut command: Command) -> Result<PtyChild> {
    let pty = openpty(None, None).context("failed to open pty pair")?;

    command
        .stdin(Stdio::from(
            pty.slave.try_clone().context("failed to dup pty replica")?,
        ))
        .stdout(Stdio::from(
            pty.slave.try_clone().context("failed to dup pty replica")?,
        ))
        .stderr(Stdio::from(pty.slave));

    // New session, so kill_group reaches the worker and everything
    // it spawns.
    unsafe {
        use std::os::unix::process::CommandExt;
        command.pre_exec(|| {
            setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }

    let child = command.spawn().context("failed to spawn worker process")?;

    let output = File::from(pty.master);
    let input = output
        .try_clone()
        .context("failed to dup pty controlling end")?;
    Ok(PtyChild {
        child,
        output,
        input,
    })
}

/// SIGKILL the worker's whole process group. The worker has no
/// graceful shutdown hook, termination is abrupt.
pub fn kill_group(pid: u32) {
    let pgid = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        warn!(pid, error = %e, "failed to kill worker process group");
    }
}

/// Strip terminal escape sequences and carriage returns from raw pty
/// output, yielding plain log text.
pub fn strip_control_sequences(raw: &[u8]) -> String {
    static PATTERN: OnceLock<regex::bytes::Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::bytes::Regex::new(r"(?-u)(\x9B|\x1B\[)[0-?]*[ -/]*[@-~]|\x1B[^\[\]]*|\x0D")
            .expect("escape-sequence pattern is valid")
    });
    let cleaned = pattern.replace_all(raw, &b""[..]);
    String::from_utf8_lossy(&cleaned).into_owned()
}
