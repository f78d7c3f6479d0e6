// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [gtest-parallel](https://crates.io/crates/gtest-parallel), a runner that
//! executes the tests in a GoogleTest binary in parallel batches, isolates crashing tests, and
//! maintains a filter file of consistently failing tests.
//!
//! For the overall flow, start at [`runner::TestRunner`].

pub mod condense;
pub mod config;
pub mod errors;
pub mod filter_file;
pub mod gtest;
pub mod helpers;
pub mod list;
pub mod reporter;
pub mod runner;
pub mod scheduler;
pub mod signal;
pub mod split;
pub mod test_logs;
pub mod worker;
