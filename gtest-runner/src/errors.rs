// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gtest-runner.

use crate::{signal::ShutdownEvent, worker::CommandStatus};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse gtest-parallel config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error that occurred inside a worker pool while running a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerError {
    /// An empty command line was submitted.
    #[error("cannot run an empty command")]
    EmptyCommand,

    /// The command could not be started.
    #[error("failed to spawn `{command}`")]
    Spawn {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Waiting for the command to exit failed.
    #[error("failed to wait for `{command}` to exit")]
    Wait {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The pool was shut down while the command was queued.
    #[error("worker pool closed")]
    PoolClosed,
}

/// An error that occurred while preparing the files for a GoogleTest invocation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchCommandError {
    /// A temporary file could not be created.
    #[error("failed to create temporary file in `{dir}`")]
    CreateTempFile {
        /// The directory the file was to be created in.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A flag file could not be written.
    #[error("failed to write flag file `{path}`")]
    WriteFlagFile {
        /// The path to the flag file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while listing the tests in a GoogleTest binary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CreateTestListError {
    /// The listing command could not be prepared.
    #[error("failed to prepare test listing command")]
    PrepareCommand(#[source] BatchCommandError),

    /// The listing command could not be run.
    #[error("failed to run `{command}`")]
    Worker {
        /// The command line.
        command: String,

        /// The underlying error.
        #[source]
        error: WorkerError,
    },

    /// The listing command didn't succeed.
    #[error("`{command}` failed to list tests ({status})\n--- output:\n{output}")]
    CommandFailed {
        /// The command line.
        command: String,

        /// How the command finished.
        status: CommandStatus,

        /// Its combined stdout and stderr.
        output: String,
    },
}

/// An error that occurred while writing the filter file.
///
/// A filter file that is missing or can't be parsed is not an error: it's treated as empty.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilterFileError {
    /// The directory containing the filter file couldn't be created.
    #[error("failed to create directory `{path}` for filter file")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The filter file couldn't be serialized.
    #[error("failed to serialize filter file `{path}`")]
    Serialize {
        /// The filter file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The filter file couldn't be written.
    #[error("failed to write filter file `{path}`")]
    Write {
        /// The filter file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },
}

/// An error that occurred while appending to a per-test log.
#[derive(Debug, Error)]
#[error("failed to write test log `{path}`")]
pub struct TestLogWriteError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl TestLogWriteError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while writing run output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] io::Error),
}

/// An error that occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] io::Error);

/// An error that occurred while setting up a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// The temporary directory for the run couldn't be created.
    #[error("failed to create temporary directory in `{work_dir}`")]
    TempDir {
        /// The working directory.
        work_dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The signal handler couldn't be set up.
    #[error(transparent)]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),
}

/// An error that stopped a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The run was interrupted by a signal.
    #[error("run interrupted by {0}")]
    Interrupted(ShutdownEvent),

    /// The worker pool failed to run the same batch several times in a row.
    #[error("worker pool failed {attempts} times in a row running a batch of {test_count} tests")]
    WorkerFailedRepeatedly {
        /// The number of consecutive failed attempts.
        attempts: usize,

        /// The number of tests in the batch.
        test_count: usize,

        /// The last error.
        #[source]
        error: WorkerError,
    },

    /// The worker pool failed while deep-verifying a test.
    #[error("worker pool failed while verifying `{test_name}`")]
    DeepVerify {
        /// The test being verified.
        test_name: String,

        /// The underlying error.
        #[source]
        error: WorkerError,
    },

    /// Listing tests failed.
    #[error(transparent)]
    CreateTestList(#[from] CreateTestListError),

    /// Writing the filter file failed.
    #[error(transparent)]
    FilterFile(#[from] FilterFileError),

    /// Preparing a batch failed.
    #[error(transparent)]
    BatchCommand(#[from] BatchCommandError),

    /// Writing a test log failed.
    #[error(transparent)]
    TestLogWrite(#[from] TestLogWriteError),

    /// Writing run output failed.
    #[error(transparent)]
    WriteEvent(#[from] WriteEventError),
}
