// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category a failing test is recorded under.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The test ran to completion and reported a failure.
    Fail,

    /// The test was expected to run but did not complete.
    Crash,

    /// The worker pool reported that the batch containing the test timed out.
    Timeout,
}

impl FailureKind {
    /// All failure kinds, in display order.
    pub const ALL: [FailureKind; 3] = [Self::Fail, Self::Crash, Self::Timeout];

    /// Returns the uppercase label used in console output and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "FAIL",
            Self::Crash => "CRASH",
            Self::Timeout => "TIMEOUT",
        }
    }

    /// Returns true if this kind should be double-checked by running the test on its own before
    /// being persisted.
    ///
    /// Timeouts are treated like crashes for this purpose.
    pub fn needs_isolation(self) -> bool {
        match self {
            Self::Fail => false,
            Self::Crash | Self::Timeout => true,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
