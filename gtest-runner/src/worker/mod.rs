// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pools: the executors that actually run GoogleTest invocations.
//!
//! The runner only ever talks to a pool through the [`WorkerPool`] trait. A call to
//! [`WorkerPool::run`] returns a future standing in for a handle to the submitted command; the
//! runner keeps these futures in a completion queue and processes them in the order they finish.
//!
//! Two implementations are provided: [`LocalPool`], which runs commands as child processes, and
//! [`ContainerPool`], which runs each command inside a throwaway Docker container.

mod container;
mod local;

pub use container::*;
pub use local::*;

use crate::errors::WorkerError;
use futures::future::BoxFuture;
use std::{fmt, process::ExitStatus, time::Duration};

/// An executor for commands.
pub trait WorkerPool: fmt::Debug + Send + Sync {
    /// Returns the number of commands this pool can run at the same time.
    fn worker_count(&self) -> usize;

    /// Submits a command to the pool.
    ///
    /// `argv[0]` is the program. The command is run with the pool's working directory as its
    /// current directory, and is stopped once `timeout` has elapsed.
    fn run(
        &self,
        argv: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<CommandOutput, WorkerError>>;
}

/// How a command finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    /// The process exited with this code.
    Exited(i32),

    /// The process was terminated by this signal.
    Signaled(i32),

    /// The process was stopped because it exceeded its timeout.
    TimedOut,
}

impl CommandStatus {
    /// Converts a process exit status.
    pub fn from_exit_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        // Neither a code nor a signal: treat it as an abnormal exit.
        Self::Exited(-1)
    }

    /// Returns true if the process exited with code 0.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Returns true if the process was stopped because of its timeout.
    pub fn is_timeout(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit code {code}"),
            Self::Signaled(signal) => write!(f, "signal {signal}"),
            Self::TimedOut => write!(f, "timeout"),
        }
    }
}

/// The result of running a command in a worker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// How the command finished.
    pub status: CommandStatus,

    /// Captured standard output. On timeout this is whatever was written before the command was
    /// stopped.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns stdout followed by stderr, for use in logs.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}
