// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a GoogleTest binary's tests in parallel batches until they pass a configured number of
//! times in a row.
//!
//! Tests that fail, crash or time out are written to a JSON filter file next to the binary, and
//! skipped on later runs. Crashing batches are split until the crashing test is isolated.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
