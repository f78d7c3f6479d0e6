// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive batch sizing.
//!
//! Batches start large, so that process startup is amortized, and shrink as the queue drains so
//! that every worker stays busy until the end. Crashes shrink them further: each crash costs a
//! re-run of part of its batch, so the more often batches crash, the smaller they get.

use crate::list::{Batch, TestEnumeration};
use std::collections::VecDeque;

/// Below this crash rate, batches are never smaller than [`MIN_BATCH_SIZE`].
const LOW_CRASH_RATE: f64 = 0.05;

/// The smallest batch handed out while the crash rate is low.
const MIN_BATCH_SIZE: usize = 10;

/// Hands out batches of tests for one pass.
#[derive(Clone, Debug)]
pub struct Scheduler {
    queue: VecDeque<(String, String)>,
    priority: VecDeque<Batch>,
    worker_count: usize,
    max_batch_size: Option<usize>,
    tests_finished: usize,
    crashes: usize,
}

impl Scheduler {
    /// Creates a scheduler that hands out every test in `enumeration`, in order.
    ///
    /// `max_batch_size`, if set, caps the size of batches assembled from the queue.
    pub fn new(
        enumeration: &TestEnumeration,
        worker_count: usize,
        max_batch_size: Option<usize>,
    ) -> Self {
        Self {
            queue: enumeration
                .iter_tests()
                .map(|(suite_key, case)| (suite_key.to_owned(), case.to_owned()))
                .collect(),
            priority: VecDeque::new(),
            worker_count: worker_count.max(1),
            max_batch_size,
            tests_finished: 0,
            crashes: 0,
        }
    }

    /// Returns the next batch to run, or `None` once everything has been handed out.
    ///
    /// Priority batches come first.
    pub fn next_batch(&mut self) -> Option<Batch> {
        if let Some(batch) = self.priority.pop_front() {
            return Some(batch);
        }
        if self.queue.is_empty() {
            return None;
        }
        let size = self.next_batch_size().min(self.queue.len());
        Some(Batch::from_tests(self.queue.drain(..size)))
    }

    /// Returns the size of the next batch assembled from the queue.
    pub fn next_batch_size(&self) -> usize {
        let remaining = self.queue.len();
        let load_target = (remaining / (self.worker_count * 4)).max(1);
        let crash_rate = self.crash_rate();
        let crash_target = if self.crashes == 0 {
            usize::MAX
        } else {
            ((0.5 / crash_rate).floor() as usize).max(1)
        };

        let mut size = load_target.min(crash_target).min(remaining).max(1);
        if crash_rate < LOW_CRASH_RATE {
            size = size.max(MIN_BATCH_SIZE);
        }
        if let Some(max_batch_size) = self.max_batch_size {
            size = size.min(max_batch_size.max(1));
        }
        size
    }

    /// Adds batches to the front of the line. They come out in the order given, before any
    /// batches added earlier.
    pub fn add_priority_batches(&mut self, batches: Vec<Batch>) {
        for batch in batches.into_iter().rev() {
            self.priority.push_front(batch);
        }
    }

    /// Records the result of a batch: `crash_count` crashes over `test_count` finished tests.
    pub fn report_result(&mut self, crash_count: usize, test_count: usize) {
        self.crashes += crash_count;
        self.tests_finished += test_count;
    }

    /// Returns the fraction of finished tests that crashed.
    pub fn crash_rate(&self) -> f64 {
        if self.tests_finished == 0 {
            if self.crashes == 0 { 0.0 } else { 1.0 }
        } else {
            self.crashes as f64 / self.tests_finished as f64
        }
    }

    /// Returns the number of tests finished so far.
    pub fn tests_finished(&self) -> usize {
        self.tests_finished
    }

    /// Returns the number of tests not yet handed out, including those in priority batches.
    pub fn remaining(&self) -> usize {
        self.queue.len() + self.priority.iter().map(Batch::len).sum::<usize>()
    }

    /// Returns true if there's nothing left to hand out.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.priority.is_empty()
    }
}
