// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistent list of consistently failing tests.

use crate::{errors::FilterFileError, helpers::plural};
use camino::{Utf8Path, Utf8PathBuf};
use gtest_parallel_metadata::FilterFileSummary;
use std::{collections::BTreeSet, io::Write};
use tracing::{debug, warn};

/// How [`FilterFile::write_entries`] combines new entries with the stored ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterWriteMode {
    /// The stored entries are replaced.
    Replace,

    /// The new entries are added to the stored ones.
    Merge,
}

/// A JSON filter file on disk.
///
/// Only the `failing_tests` key is interpreted; every other key is written back unchanged.
#[derive(Clone, Debug)]
pub struct FilterFile {
    path: Utf8PathBuf,
}

impl FilterFile {
    /// Creates a handle to the filter file at `path`. The file doesn't need to exist.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the filter file used for `binary` when none is given explicitly:
    /// `<binary name>.<platform>.filter.json` beside the binary.
    pub fn default_path_for(binary: &Utf8Path) -> Utf8PathBuf {
        let file_name = binary.file_name().unwrap_or("gtest");
        binary.with_file_name(format!(
            "{file_name}.{}.filter.json",
            host_platform_name()
        ))
    }

    /// Returns the path to the filter file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Loads the filter entries.
    ///
    /// A missing file has no entries. A file that can't be read or parsed is reported and treated
    /// as having no entries.
    pub fn load_entries(&self) -> BTreeSet<String> {
        self.load_summary().failing_tests
    }

    fn load_summary(&self) -> FilterFileSummary {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("filter file {} doesn't exist, treating as empty", self.path);
                return FilterFileSummary::default();
            }
            Err(error) => {
                warn!(
                    "failed to read filter file {}, treating as empty: {error}",
                    self.path
                );
                return FilterFileSummary::default();
            }
        };
        match FilterFileSummary::parse_json(&contents) {
            Ok(summary) => summary,
            Err(error) => {
                warn!(
                    "failed to parse filter file {}, treating as empty: {error}",
                    self.path
                );
                FilterFileSummary::default()
            }
        }
    }

    /// Writes filter entries, returning true if the file changed.
    ///
    /// Nothing is written if the resulting entries are the same as the stored ones.
    pub fn write_entries(
        &self,
        entries: impl IntoIterator<Item = String>,
        mode: FilterWriteMode,
    ) -> Result<bool, FilterFileError> {
        let mut summary = self.load_summary();
        let entries: BTreeSet<String> = match mode {
            FilterWriteMode::Replace => entries.into_iter().collect(),
            FilterWriteMode::Merge => summary
                .failing_tests
                .iter()
                .cloned()
                .chain(entries)
                .collect(),
        };
        if entries == summary.failing_tests {
            debug!("filter file {} is up to date", self.path);
            return Ok(false);
        }
        let count = entries.len();
        summary.failing_tests = entries;

        let json = summary
            .to_json_pretty()
            .map_err(|error| FilterFileError::Serialize {
                path: self.path.clone(),
                error,
            })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|error| FilterFileError::CreateDir {
                    path: parent.to_owned(),
                    error,
                })?;
            }
        }

        atomicwrites::AtomicFile::new(&self.path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| FilterFileError::Write {
                path: self.path.clone(),
                error,
            })?;
        debug!(
            "wrote {count} {} to filter file {}",
            plural::entries_str(count),
            self.path
        );
        Ok(true)
    }
}

/// Returns the platform name used in auto-detected filter file names.
pub fn host_platform_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "mac",
        "windows" => "win",
        other => other,
    }
}
