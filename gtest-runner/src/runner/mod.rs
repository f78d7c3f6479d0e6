// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The run controller.
//!
//! A run is a series of passes over the binary's tests. Each pass lists the tests (skipping those
//! in the filter file), runs them in adaptively sized batches, splits batches that crash, and
//! finally re-runs suspected crashes alone to tell real crashes from flakes. A pass with failures
//! rewrites the filter file; the run succeeds once enough consecutive passes are clean.

mod deep_verify;
mod imp;

pub use imp::*;
