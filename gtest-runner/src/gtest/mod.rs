// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building GoogleTest command lines and interpreting what the binary reports back.

mod command;
mod result;

pub use command::*;
pub use result::*;
