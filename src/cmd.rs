//! Subprocess running utilities.
//!
//! Used by the packager to invoke the exported tree's build entry point when
//! regenerating per-target project descriptors.

use std::ffi::OsStr;
use std::io;
use std::process::{self, Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

/// Error when trying to execute a command.
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    /// The command failed to start.
    #[error("command '{0}' failed to start")]
    NoRun(String, #[source] io::Error),
    /// The command exited unsucessfully (with non-zero exit status).
    #[error("command '{0}' exited with non-zero status code {1}")]
    Unsuccessful(String, i32),
    /// The command was terminated unexpectedly.
    #[error("command '{0}' was terminated unexpectedly")]
    Terminated(String),
    /// The command did not finish within the allotted time and was killed.
    #[error("command '{0}' timed out after {1:?}")]
    Timeout(String, Duration),
}

impl CmdError {
    fn no_run(cmd: &process::Command, error: io::Error) -> Self {
        CmdError::NoRun(format!("{:?}", cmd), error)
    }

    fn status_into_result(status: ExitStatus, cmd: &process::Command) -> Result<(), Self> {
        if status.success() {
            Ok(())
        } else if let Some(code) = status.code() {
            Err(CmdError::Unsuccessful(format!("{:?}", cmd), code))
        } else {
            Err(CmdError::Terminated(format!("{:?}", cmd)))
        }
    }
}

/// A wrapper over a [`std::process::Command`] that knows how to bound its
/// runtime.
#[derive(Debug)]
pub struct Cmd {
    /// The actual [`std::process::Command`] wrapped.
    pub cmd: process::Command,
}

impl std::ops::Deref for Cmd {
    type Target = process::Command;

    fn deref(&self) -> &Self::Target {
        &self.cmd
    }
}

impl std::ops::DerefMut for Cmd {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.cmd
    }
}

impl Cmd {
    /// Construct a new [`Cmd`] for launching `program`.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            cmd: Command::new(program),
        }
    }

    /// Run the command to completion.
    pub fn run(&mut self) -> Result<(), CmdError> {
        self.cmd
            .status()
            .map_err(|e| CmdError::no_run(&self.cmd, e))
            .and_then(|status| CmdError::status_into_result(status, &self.cmd))
    }

    /// Run the command to completion, killing it when it exceeds `timeout`.
    ///
    /// A hung external tool must not stall the whole packaging run, so the
    /// child is polled and killed once the deadline passes.
    pub fn run_with_timeout(&mut self, timeout: Duration) -> Result<(), CmdError> {
        let mut child = self
            .cmd
            .spawn()
            .map_err(|e| CmdError::no_run(&self.cmd, e))?;

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return CmdError::status_into_result(status, &self.cmd),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        child.kill().ok();
                        child.wait().ok();
                        return Err(CmdError::Timeout(format!("{:?}", self.cmd), timeout));
                    }
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(CmdError::no_run(&self.cmd, e)),
            }
        }
    }
}
