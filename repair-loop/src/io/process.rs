//! Helpers for running external tools with timeouts and bounded output.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::error::RepairError;

/// One external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

impl ToolCommand {
    fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, as one buffer.
    pub fn combined(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        buf.extend_from_slice(&self.stdout);
        buf.extend_from_slice(&self.stderr);
        buf
    }
}

/// Kills and reaps the child unless it was already waited on.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Run a tool to completion and capture its output.
///
/// A non-zero exit is a normal outcome and is returned as `Ok`. Errors are a
/// missing working directory, a failed spawn (e.g. executable not found) and
/// a timeout, after which the child has been killed and reaped.
///
/// The timeout also bounds output collection: a tool that exits but leaves a
/// background process holding its pipes is reported as timed out.
#[instrument(skip_all, fields(program = %request.program.display(), timeout_secs = request.timeout.as_secs()))]
pub fn run_tool(request: &ToolCommand) -> Result<CommandOutput> {
    if !request.workdir.is_dir() {
        return Err(RepairError::WorkdirMissing(request.workdir.clone()).into());
    }

    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .current_dir(&request.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(command = %request.display(), "spawning child process");
    let child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {}", request.program.display()));
        }
    };
    let mut guard = ChildGuard {
        child,
        reaped: false,
    };

    let stdout = guard
        .child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = guard
        .child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = request.output_limit_bytes;
    let stdout_rx = spawn_reader(stdout, limit);
    let stderr_rx = spawn_reader(stderr, limit);

    let started = Instant::now();
    let waited = guard
        .child
        .wait_timeout(request.timeout)
        .context("wait for command")?;
    let status = match waited {
        Some(status) => {
            guard.reaped = true;
            status
        }
        None => {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "command timed out, killing"
            );
            guard.child.kill().context("kill command")?;
            guard.child.wait().context("wait command after kill")?;
            guard.reaped = true;
            // Grandchildren may still hold the pipes; the readers are left to finish on their own.
            return Err(timed_out(request));
        }
    };

    let Some((stdout, stdout_truncated)) =
        recv_output(&stdout_rx, remaining(request, started)).context("collect stdout")?
    else {
        warn!("command exited but its stdout stayed open past the timeout");
        return Err(timed_out(request));
    };
    let Some((stderr, stderr_truncated)) =
        recv_output(&stderr_rx, remaining(request, started)).context("collect stderr")?
    else {
        warn!("command exited but its stderr stayed open past the timeout");
        return Err(timed_out(request));
    };

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

type StreamOutput = Result<(Vec<u8>, usize)>;

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamOutput> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone once run_tool has given up on this stream.
        let _ = tx.send(read_stream_limited(reader, limit));
    });
    rx
}

/// `None` when the stream is still open after `wait`.
fn recv_output(rx: &Receiver<StreamOutput>, wait: Duration) -> Result<Option<(Vec<u8>, usize)>> {
    match rx.recv_timeout(wait) {
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
    }
}

fn remaining(request: &ToolCommand, started: Instant) -> Duration {
    request.timeout.saturating_sub(started.elapsed())
}

fn timed_out(request: &ToolCommand) -> anyhow::Error {
    RepairError::ProcessTimeout {
        command: request.display(),
        timeout: request.timeout,
    }
    .into()
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
