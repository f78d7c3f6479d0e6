// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The JSON document stored in a filter file.
///
/// A filter file looks like:
///
/// ```json
/// {
///   "comment": "Tests that fail on this platform.",
///   "failing_tests": ["Suite.Case", "Suite.Prefix*"]
/// }
/// ```
///
/// Only `failing_tests` is interpreted. Every other key is carried through unchanged when the
/// document is rewritten.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct FilterFileSummary {
    /// Filter entries: literal `Suite.Case` names or `Suite.Prefix*` patterns.
    ///
    /// Stored as a set so the serialized list is always sorted and unique.
    #[serde(default)]
    pub failing_tests: BTreeSet<String>,

    /// Keys other than `failing_tests`, preserved verbatim.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl FilterFileSummary {
    /// Parses a filter file from its JSON text.
    pub fn parse_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes this document as pretty-printed JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }
}
