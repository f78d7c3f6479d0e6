// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test log files under `test_logs/`.

use crate::{
    errors::TestLogWriteError,
    helpers::{relative_to_work_dir, safe_log_name},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs::OpenOptions, io::Write};

/// The directory, relative to the working directory, that per-test logs are written to.
pub const TEST_LOGS_DIR: &str = "test_logs";

/// Appends output to per-test log files.
///
/// Each test gets one file, `test_logs/<safe name>.log`, which accumulates output from every
/// failure of that test during the invocation.
#[derive(Clone, Debug)]
pub struct TestLogWriter {
    work_dir: Utf8PathBuf,
    log_dir: Utf8PathBuf,
}

impl TestLogWriter {
    /// Creates a writer for logs under `work_dir`.
    pub fn new(work_dir: impl Into<Utf8PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let log_dir = work_dir.join(TEST_LOGS_DIR);
        Self { work_dir, log_dir }
    }

    /// Returns the log directory.
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }

    /// Appends `contents` to the log for `test_name`, returning the log's path relative to the
    /// working directory.
    pub fn append(&self, test_name: &str, contents: &str) -> Result<Utf8PathBuf, TestLogWriteError> {
        std::fs::create_dir_all(&self.log_dir)
            .map_err(|error| TestLogWriteError::new(self.log_dir.clone(), error))?;
        let path = self.log_dir.join(format!("{}.log", safe_log_name(test_name)));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|error| TestLogWriteError::new(path.clone(), error))?;
        let mut entry = format!("===== {test_name} =====\n{contents}");
        if !entry.ends_with('\n') {
            entry.push('\n');
        }
        file.write_all(entry.as_bytes())
            .map_err(|error| TestLogWriteError::new(path.clone(), error))?;

        Ok(relative_to_work_dir(&self.work_dir, &path))
    }
}
