// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for gtest-runner.

use camino::{Utf8Path, Utf8PathBuf};

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "batch" if `count` is 1, otherwise "batches".
    pub fn batches_str(count: usize) -> &'static str {
        if count == 1 { "batch" } else { "batches" }
    }

    /// Returns "pass" if `count` is 1, otherwise "passes".
    pub fn passes_str(count: usize) -> &'static str {
        if count == 1 { "pass" } else { "passes" }
    }

    /// Returns "entry" if `count` is 1, otherwise "entries".
    pub fn entries_str(count: usize) -> &'static str {
        if count == 1 { "entry" } else { "entries" }
    }

    /// Returns "failure" if `count` is 1, otherwise "failures".
    pub fn failures_str(count: usize) -> &'static str {
        if count == 1 { "failure" } else { "failures" }
    }

    /// Returns "flake" if `count` is 1, otherwise "flakes".
    pub fn flakes_str(count: usize) -> &'static str {
        if count == 1 { "flake" } else { "flakes" }
    }
}

/// Expresses `path` relative to `work_dir`, so that it stays valid when the working directory is
/// mounted at the same location inside a container.
///
/// Paths that can't be expressed relative to `work_dir` are returned unchanged.
pub(crate) fn relative_to_work_dir(work_dir: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_relative() {
        return path.to_owned();
    }
    match pathdiff::diff_utf8_paths(path, work_dir) {
        Some(relative) if !relative.as_str().is_empty() => relative,
        _ => path.to_owned(),
    }
}

/// Like [`relative_to_work_dir`], but ensures the result can be executed directly: a bare file name
/// gets a `./` prefix so it isn't looked up on `PATH`.
pub(crate) fn program_path(work_dir: &Utf8Path, binary: &Utf8Path) -> String {
    let relative = relative_to_work_dir(work_dir, binary);
    if relative.is_relative() && relative.components().count() == 1 {
        format!("./{relative}")
    } else {
        relative.into_string()
    }
}

/// Returns a file name for a test's log: every character outside `[A-Za-z0-9._-]` becomes `_`.
pub(crate) fn safe_log_name(test_name: &str) -> String {
    test_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Decodes process output. GoogleTest output is nearly always UTF-8, but a crashing test can emit
/// anything.
pub(crate) fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
