// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use gtest_parallel_metadata::GtestParallelExitCode;
use gtest_runner::errors::{ConfigParseError, RunError, TestRunnerBuildError};
use owo_colors::OwoColorize;
use std::{error::Error, path::PathBuf};
use thiserror::Error;
use tracing::error;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that `gtest-parallel` knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed {
        #[source]
        error: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 { path: PathBuf },
    #[error("test binary not found")]
    BinaryNotFound {
        binary: Utf8PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to create async runtime")]
    RuntimeCreateFailed {
        #[source]
        error: std::io::Error,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("test run error")]
    RunError {
        #[from]
        err: RunError,
    },
    #[error("failed to write test list")]
    WriteTestListError {
        #[source]
        error: std::io::Error,
    },
    #[error("stability target not reached")]
    StabilityNotReached {
        consecutive_flake_free: usize,
        filter_file: Utf8PathBuf,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::BinaryNotFound { .. }
            | Self::ConfigParseError { .. }
            | Self::RuntimeCreateFailed { .. }
            | Self::TestRunnerBuildError { .. }
            | Self::RunError { .. }
            | Self::WriteTestListError { .. }
            | Self::StabilityNotReached { .. } => GtestParallelExitCode::FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { error } => {
                error!("could not determine current directory");
                Some(error as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::BinaryNotFound { binary, error } => {
                error!("test binary `{}` not found", binary.style(styles.bold));
                Some(error as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::RuntimeCreateFailed { error } => {
                error!("failed to create async runtime");
                Some(error as &dyn Error)
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to set up test runner");
                Some(err as &dyn Error)
            }
            Self::RunError { err } => {
                match err {
                    RunError::Interrupted(event) => {
                        error!(
                            "run interrupted by {}, partial results were not saved",
                            event.style(styles.bold)
                        );
                        None
                    }
                    _ => {
                        error!("{err}");
                        err.source()
                    }
                }
            }
            Self::WriteTestListError { error } => {
                error!("failed to write test list to stdout");
                Some(error as &dyn Error)
            }
            Self::StabilityNotReached {
                consecutive_flake_free,
                filter_file,
            } => {
                error!(
                    "did not reach {} consecutive clean {}",
                    consecutive_flake_free.style(styles.bold),
                    if *consecutive_flake_free == 1 {
                        "pass"
                    } else {
                        "passes"
                    },
                );
                error!(
                    target: NO_HEADING_TARGET,
                    "{}: failing tests were written to `{}`",
                    "hint".style(styles.warning_text),
                    filter_file.style(styles.bold),
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
