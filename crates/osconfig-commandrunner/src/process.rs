//! Shell process plumbing for command execution.
//!
//! Each command runs as `/bin/sh -c <arguments>` leading its own process
//! group, so signals reach every descendant the shell starts. Standard output
//! and standard error share one pipe which a reader thread drains while the
//! engine polls for exit.

use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;

/// Interpreter used for command text.
pub(crate) const SHELL: &str = "/bin/sh";

/// Output retained per command; anything beyond is drained and discarded.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// A spawned shell and the thread collecting its combined output.
pub(crate) struct ShellProcess {
    child: Child,
    group: Pid,
    output: Arc<Mutex<Vec<u8>>>,
    drained: Receiver<io::Result<()>>,
}

/// Output gathered by [`ShellProcess::finish`].
#[derive(Debug)]
pub(crate) struct Drained {
    pub(crate) bytes: Vec<u8>,
    /// Set when the output may be incomplete.
    pub(crate) error: Option<io::Error>,
}

impl ShellProcess {
    /// Spawns `script` under [`SHELL`] in a new process group.
    pub(crate) fn spawn(script: &str) -> io::Result<Self> {
        let (reader, writer) = io::pipe()?;
        let mut command = std::process::Command::new(SHELL);
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer)
            .process_group(0);
        let spawned = command.spawn();
        // The builder owns the parent's write ends; EOF needs them closed.
        drop(command);
        let mut child = spawned?;

        let Ok(raw_pid) = i32::try_from(child.id()) else {
            abandon(&mut child);
            return Err(io::Error::other("process id out of range"));
        };

        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let (done, drained) = mpsc::channel();
        if let Err(error) = thread::Builder::new()
            .name(String::from("command-output"))
            .spawn(move || drop(done.send(collect_output(reader, &sink))))
        {
            abandon(&mut child);
            return Err(error);
        }

        Ok(Self {
            child,
            group: Pid::from_raw(raw_pid),
            output,
            drained,
        })
    }

    /// Process group led by the shell.
    pub(crate) const fn group(&self) -> Pid {
        self.group
    }

    /// Polls for exit without blocking.
    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Kills the whole process group and reaps the shell.
    pub(crate) fn kill(&mut self) -> io::Result<ExitStatus> {
        signal_group(self.group, Signal::SIGKILL).map_err(io::Error::from)?;
        self.child.wait()
    }

    /// Kills descendants the exited shell left behind in its group.
    ///
    /// Background jobs inherit the output pipe, so the reader only sees EOF
    /// once they are gone.
    pub(crate) fn reap_group(&self) -> nix::Result<()> {
        signal_group(self.group, Signal::SIGKILL)
    }

    /// Waits until `deadline` at the latest for the output pipe to close and
    /// returns what was collected.
    ///
    /// A process that left the group can keep the pipe open; the output read
    /// so far is returned with a [`io::ErrorKind::TimedOut`] error.
    pub(crate) fn finish(self, deadline: Instant) -> Drained {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let error = match self.drained.recv_timeout(remaining) {
            Ok(result) => result.err(),
            Err(RecvTimeoutError::Timeout) => Some(io::Error::new(
                io::ErrorKind::TimedOut,
                "command output still open after the shell exited",
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Some(io::Error::other("output reader exited without a result"))
            }
        };
        let bytes = std::mem::take(&mut *lock_output(&self.output));
        Drained { bytes, error }
    }
}

/// Sends `signal` to a process group; a group that is already gone is not an
/// error.
pub(crate) fn signal_group(group: Pid, signal: Signal) -> nix::Result<()> {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno),
    }
}

/// Exit code reported for a finished shell: its status, or `128 + signal`
/// when it was killed.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

fn abandon(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

fn lock_output(output: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    output.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collect_output(mut reader: impl Read, sink: &Mutex<Vec<u8>>) -> io::Result<()> {
    let mut chunk = [0_u8; READ_CHUNK_BYTES];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        let mut collected = lock_output(sink);
        let room = MAX_OUTPUT_BYTES.saturating_sub(collected.len());
        if let Some(kept) = chunk.get(..read.min(room)) {
            collected.extend_from_slice(kept);
        }
    }
}
