// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the data formats that `gtest-parallel` reads and writes.
//!
//! This crate is meant to be depended on by tools that consume filter files or interpret the exit
//! codes of a `gtest-parallel` invocation, without pulling in the runner itself.

mod exit_codes;
mod failure;
mod filter_file;

pub use exit_codes::*;
pub use failure::*;
pub use filter_file::*;
