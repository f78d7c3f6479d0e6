// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Detecting batches that crashed partway through, and splitting them to isolate the culprit.

use crate::{gtest::BatchOutcome, list::Batch};
use gtest_parallel_metadata::FailureKind;

/// A multi-test batch that stopped before running all of its tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchCrash {
    /// The test that was running when the batch died, if the binary announced one.
    pub culprit: Option<String>,
}

/// Decides whether a batch crashed, as opposed to running all of its tests.
///
/// Only batches with more than one test can crash in this sense. A singleton that dies is recorded
/// as a CRASH or TIMEOUT failure by the result parser instead.
pub fn detect_batch_crash(batch: &Batch, outcome: &BatchOutcome) -> Option<BatchCrash> {
    if batch.len() <= 1 {
        return None;
    }
    let missing = batch
        .test_names()
        .any(|test_name| !outcome.executed.contains(&test_name));
    let unexplained = !outcome.passed && !outcome.has_failures_of(FailureKind::Fail);
    (missing || unexplained).then(|| BatchCrash {
        culprit: outcome.last_running_test.clone(),
    })
}

/// How a crashed batch is divided.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SplitStrategy<'a> {
    /// Isolate a known culprit: everything before it stays together, it runs alone, later tests
    /// from its suite run alone, and later tests from other suites stay together.
    AroundCulprit(&'a str),

    /// Divide the batch into this many nearly equal parts.
    EvenPartition {
        /// The number of parts.
        parts: usize,
    },
}

impl<'a> SplitStrategy<'a> {
    /// Chooses a strategy for a batch: around the culprit if it's part of the batch, otherwise an
    /// even partition into `max(2, worker_count / 4)` parts.
    pub fn choose(batch: &Batch, culprit: Option<&'a str>, worker_count: usize) -> Self {
        match culprit {
            Some(culprit) if batch.test_names().any(|test_name| test_name == culprit) => {
                Self::AroundCulprit(culprit)
            }
            _ => Self::EvenPartition {
                parts: (worker_count / 4).max(2),
            },
        }
    }
}

/// Splits a crashed batch into sub-batches, in the order they should run.
///
/// The sub-batches always contain exactly the tests of the original batch.
pub fn split_batch(batch: &Batch, culprit: Option<&str>, worker_count: usize) -> Vec<Batch> {
    match SplitStrategy::choose(batch, culprit, worker_count) {
        SplitStrategy::AroundCulprit(culprit) => split_around(batch, culprit),
        SplitStrategy::EvenPartition { parts } => partition(batch, parts),
    }
}

fn split_around(batch: &Batch, culprit: &str) -> Vec<Batch> {
    let tests: Vec<(&str, &str)> = batch.iter_tests().collect();
    let Some(index) = tests
        .iter()
        .position(|(suite_key, case)| is_test(suite_key, case, culprit))
    else {
        return vec![batch.clone()];
    };
    let culprit_suite = tests[index].0;

    let mut out = Vec::new();
    if index > 0 {
        out.push(Batch::from_tests(tests[..index].iter().copied()));
    }
    out.push(Batch::singleton(tests[index].0, tests[index].1));

    let mut post = Vec::new();
    for &(suite_key, case) in &tests[index + 1..] {
        if suite_key == culprit_suite {
            out.push(Batch::singleton(suite_key, case));
        } else {
            post.push((suite_key, case));
        }
    }
    if !post.is_empty() {
        out.push(Batch::from_tests(post));
    }
    out
}

fn partition(batch: &Batch, parts: usize) -> Vec<Batch> {
    let tests: Vec<(&str, &str)> = batch.iter_tests().collect();
    let parts = parts.clamp(1, tests.len().max(1));
    let base = tests.len() / parts;
    let extra = tests.len() % parts;

    let mut out = Vec::with_capacity(parts);
    let mut start = 0;
    for part in 0..parts {
        let size = base + usize::from(part < extra);
        if size > 0 {
            out.push(Batch::from_tests(tests[start..start + size].iter().copied()));
        }
        start += size;
    }
    out
}

fn is_test(suite_key: &str, case: &str, test_name: &str) -> bool {
    test_name
        .strip_prefix(suite_key)
        .is_some_and(|rest| rest == case)
}
