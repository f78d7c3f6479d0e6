// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TestEnumeration;
use crate::{errors::CreateTestListError, gtest::GtestCommandBuilder, worker::WorkerPool};
use std::{collections::BTreeSet, time::Duration};
use tracing::debug;

impl TestEnumeration {
    /// Lists the tests in a binary, skipping every test matched by `filter_entries`.
    ///
    /// The negative filter is passed through a flag file, which is removed once the binary has
    /// exited.
    pub async fn from_binary(
        pool: &dyn WorkerPool,
        commands: &GtestCommandBuilder,
        filter_entries: &BTreeSet<String>,
        timeout: Duration,
    ) -> Result<Self, CreateTestListError> {
        let command = commands
            .list_command(filter_entries)
            .map_err(CreateTestListError::PrepareCommand)?;
        let command_str = shell_words::join(&command.argv);
        debug!("listing tests with `{command_str}`");

        let output = pool
            .run(command.argv.clone(), timeout)
            .await
            .map_err(|error| CreateTestListError::Worker {
                command: command_str.clone(),
                error,
            })?;
        drop(command);

        if !output.status.is_success() {
            return Err(CreateTestListError::CommandFailed {
                command: command_str,
                status: output.status,
                output: output.combined(),
            });
        }

        Ok(Self::parse(&output.stdout))
    }

    /// Parses the output of `--gtest_list_tests`.
    ///
    /// A non-indented line ending in `.` opens a suite, and the indented lines after it are its
    /// cases. Everything after a `#` is a comment. Other lines, such as warnings the binary prints
    /// before listing, are skipped.
    pub fn parse(output: &str) -> Self {
        let mut enumeration = Self::new();
        let mut suite_key: Option<&str> = None;

        for line in output.lines() {
            let line = match line.find('#') {
                Some(index) => &line[..index],
                None => line,
            }
            .trim_end();
            if line.trim_start().is_empty() {
                continue;
            }

            if line.starts_with([' ', '\t']) {
                if let Some(suite_key) = suite_key {
                    enumeration.push(suite_key, line.trim_start());
                }
            } else if line.ends_with('.') && !line.contains(char::is_whitespace) {
                suite_key = Some(line);
            } else {
                suite_key = None;
            }
        }

        enumeration
    }
}
