// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::BatchCommandError,
    helpers::{program_path, relative_to_work_dir},
    list::Batch,
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempPath;
use indexmap::IndexSet;
use itertools::Itertools;
use std::{collections::BTreeSet, io::Write};

/// Builds command lines for a GoogleTest binary.
///
/// Every path handed to the binary is relative to the working directory, so commands stay valid
/// when the working directory is mounted at the same location inside a container.
#[derive(Clone, Debug)]
pub struct GtestCommandBuilder {
    binary: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    temp_dir: Utf8PathBuf,
    extra_args: Vec<String>,
}

impl GtestCommandBuilder {
    /// Creates a new builder.
    ///
    /// `temp_dir` is where flag files and XML result files are created; it must be inside
    /// `work_dir`. `extra_args` are appended to every invocation.
    pub fn new(
        binary: impl Into<Utf8PathBuf>,
        work_dir: impl Into<Utf8PathBuf>,
        temp_dir: impl Into<Utf8PathBuf>,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            temp_dir: temp_dir.into(),
            extra_args,
        }
    }

    /// Returns the program as passed to the worker pool.
    pub fn program(&self) -> String {
        program_path(&self.work_dir, &self.binary)
    }

    /// Prepares the command that runs a batch.
    pub fn batch_command(&self, batch: &Batch) -> Result<BatchCommand, BatchCommandError> {
        let expected: IndexSet<String> = batch.test_names().collect();
        let filter = expected.iter().join(":");
        let flag_file = self.write_flag_file(&format!("--gtest_filter={filter}\n"))?;
        let xml_file = self.create_temp_path("results-", ".xml")?;

        let mut argv = vec![
            self.program(),
            format!("--gtest_flagfile={}", self.relative(&flag_file)),
            "--single-process-tests".to_owned(),
            format!("--gtest_output=xml:{}", self.relative(&xml_file)),
        ];
        argv.extend(self.extra_args.iter().cloned());

        Ok(BatchCommand {
            argv,
            expected,
            flag_file,
            xml_file,
        })
    }

    /// Prepares the command that lists tests, skipping everything matched by `filter_entries`.
    pub fn list_command(
        &self,
        filter_entries: &BTreeSet<String>,
    ) -> Result<PreparedCommand, BatchCommandError> {
        let mut argv = vec![self.program(), "--gtest_list_tests".to_owned()];
        let flag_file = match negative_filter(filter_entries) {
            Some(filter) => {
                let flag_file = self.write_flag_file(&format!("--gtest_filter={filter}\n"))?;
                argv.push(format!("--gtest_flagfile={}", self.relative(&flag_file)));
                Some(flag_file)
            }
            None => None,
        };
        argv.extend(self.extra_args.iter().cloned());
        Ok(PreparedCommand { argv, flag_file })
    }

    /// Returns the command that runs a single test `repeat` times, stopping at the first failure.
    pub fn deep_verify_command(&self, test_name: &str, repeat: usize) -> Vec<String> {
        let mut argv = vec![
            self.program(),
            format!("--gtest_filter={test_name}"),
            format!("--gtest_repeat={repeat}"),
            "--gtest_break_on_failure".to_owned(),
        ];
        argv.extend(self.extra_args.iter().cloned());
        argv
    }

    fn relative(&self, path: &Utf8Path) -> Utf8PathBuf {
        relative_to_work_dir(&self.work_dir, path)
    }

    fn create_temp_path(&self, prefix: &str, suffix: &str) -> Result<Utf8TempPath, BatchCommandError> {
        camino_tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.temp_dir)
            .map(|file| file.into_temp_path())
            .map_err(|error| BatchCommandError::CreateTempFile {
                dir: self.temp_dir.clone(),
                error,
            })
    }

    fn write_flag_file(&self, contents: &str) -> Result<Utf8TempPath, BatchCommandError> {
        let mut file = camino_tempfile::Builder::new()
            .prefix("flags-")
            .suffix(".txt")
            .tempfile_in(&self.temp_dir)
            .map_err(|error| BatchCommandError::CreateTempFile {
                dir: self.temp_dir.clone(),
                error,
            })?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|error| BatchCommandError::WriteFlagFile {
                path: file.path().to_owned(),
                error,
            })?;
        Ok(file.into_temp_path())
    }
}

/// A command along with the temporary files it refers to.
///
/// The files are deleted when this is dropped.
#[derive(Debug)]
pub struct PreparedCommand {
    /// The command line.
    pub argv: Vec<String>,
    flag_file: Option<Utf8TempPath>,
}

impl PreparedCommand {
    /// Returns the flag file passed to the binary, if any.
    pub fn flag_file(&self) -> Option<&Utf8Path> {
        self.flag_file.as_deref()
    }
}

/// The command that runs a batch, along with its temporary files.
///
/// The flag file and the XML result file are deleted when this is dropped, regardless of how the
/// batch went.
#[derive(Debug)]
pub struct BatchCommand {
    /// The command line.
    pub argv: Vec<String>,

    /// The tests the batch is expected to run, in order.
    pub expected: IndexSet<String>,

    flag_file: Utf8TempPath,
    xml_file: Utf8TempPath,
}

impl BatchCommand {
    /// Returns the path of the flag file.
    pub fn flag_file(&self) -> &Utf8Path {
        &self.flag_file
    }

    /// Returns the path the binary writes its XML report to.
    pub fn xml_file(&self) -> &Utf8Path {
        &self.xml_file
    }
}

/// Builds a negative `--gtest_filter` value that skips every entry: `-A:B:C`.
///
/// Returns `None` if there are no entries.
pub fn negative_filter(entries: &BTreeSet<String>) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    Some(format!("-{}", entries.iter().join(":")))
}
