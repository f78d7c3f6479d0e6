// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `gtest-parallel`.
///
/// Unlike richer test runners, `gtest-parallel` only distinguishes between success and failure:
/// callers are expected to read the filter file for details about what failed.
pub enum GtestParallelExitCode {}

impl GtestParallelExitCode {
    /// The required number of consecutive clean passes was observed.
    pub const OK: i32 = 0;

    /// The run failed, was aborted, or could not be set up.
    ///
    /// Failures discovered during the run have been persisted to the filter file by the time this
    /// code is returned.
    pub const FAILED: i32 = 1;
}
