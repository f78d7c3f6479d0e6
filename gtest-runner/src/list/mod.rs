// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for obtaining and working with the tests in a GoogleTest binary.
//!
//! The main structure in this module is [`TestEnumeration`], a snapshot of the suites and cases
//! that a binary reports through `--gtest_list_tests`. Runs are carved out of an enumeration as
//! [`Batch`]es, each of which is executed in a single invocation of the binary.

mod batch;
mod test_list;

pub use batch::*;
pub use test_list::*;

/// Splits a test name of the form `Suite.Case` into its suite key (`Suite.`, including the trailing
/// dot) and case name.
///
/// Returns `None` if the name has no dot.
pub fn split_test_name(test_name: &str) -> Option<(&str, &str)> {
    let dot = test_name.find('.')?;
    Some(test_name.split_at(dot + 1))
}

/// Joins a suite key and a case name into a full test name.
pub fn join_test_name(suite_key: &str, case: &str) -> String {
    let mut name = String::with_capacity(suite_key.len() + case.len());
    name.push_str(suite_key);
    name.push_str(case);
    name
}
