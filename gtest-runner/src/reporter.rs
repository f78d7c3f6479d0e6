// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints run progress and results to the console.
//!
//! The main structure in this module is [`RunReporter`], which turns [`RunEvent`]s into the
//! bracket-tagged lines users see while a run is going.

use crate::{
    errors::WriteEventError,
    helpers::plural,
};
use camino::Utf8Path;
use gtest_parallel_metadata::FailureKind;
use owo_colors::{OwoColorize, Style};
use std::{
    collections::BTreeMap,
    io::{BufWriter, Write},
};
use swrite::{SWrite, swrite};

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Counts for one pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PassStats {
    /// The number of tests listed for the pass.
    pub tests_listed: usize,

    /// The number of tests that finished, according to the scheduler.
    pub tests_finished: usize,

    /// The number of batches that completed.
    pub batches_completed: usize,

    /// Persisted failures by category.
    pub failures: BTreeMap<FailureKind, usize>,

    /// Tests that crashed in a batch but survived deep verification.
    pub runtime_flakes: usize,
}

impl PassStats {
    /// Returns the total number of failures.
    pub fn failure_count(&self) -> usize {
        self.failures.values().sum()
    }

    /// Returns true if the pass had no failures and no runtime flakes.
    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0 && self.runtime_flakes == 0
    }
}

/// Something that happened during a run.
#[derive(Clone, Debug)]
pub enum RunEvent<'e> {
    /// A pass is about to start.
    PassStarted {
        /// The pass number, starting from 1.
        pass: usize,

        /// The maximum number of passes.
        max_passes: usize,

        /// The number of tests that will run.
        test_count: usize,

        /// The number of tests excluded at runtime.
        runtime_excluded: usize,
    },

    /// A test failed.
    TestFailed {
        /// The test.
        test_name: &'e str,

        /// How it failed.
        kind: FailureKind,

        /// Where its log was written, relative to the working directory.
        log_path: &'e Utf8Path,
    },

    /// A multi-test batch crashed partway through.
    BatchCrashed {
        /// The number of tests in the batch.
        test_count: usize,

        /// The test that was running when it crashed.
        culprit: Option<&'e str>,

        /// The number of batches it was split into.
        split_into: usize,

        /// Where the batch output was logged.
        log_path: Option<&'e Utf8Path>,
    },

    /// Periodic progress.
    Progress {
        /// Batches completed so far.
        batches_completed: usize,

        /// Tests finished so far.
        tests_finished: usize,

        /// Tests that failed so far, including suspected crashes.
        failures: usize,

        /// The scheduler's crash rate.
        crash_rate: f64,

        /// Tests not yet handed out.
        remaining: usize,
    },

    /// Deep verification of suspected crashes is starting.
    DeepVerifyStarted {
        /// The number of tests to verify.
        test_count: usize,

        /// How many times each test is run.
        repeat: usize,
    },

    /// A suspected crash survived deep verification.
    RuntimeFlake {
        /// The test.
        test_name: &'e str,

        /// How many solo runs it survived.
        repeat: usize,
    },

    /// A pass finished.
    PassFinished {
        /// The pass number, starting from 1.
        pass: usize,

        /// Counts for the pass.
        stats: &'e PassStats,

        /// Consecutive clean passes so far, including this one.
        consecutive_successes: usize,

        /// The number of consecutive clean passes required.
        target_successes: usize,
    },

    /// The filter file was rewritten.
    FilterUpdated {
        /// The filter file.
        path: &'e Utf8Path,

        /// The number of entries now in it.
        entry_count: usize,
    },

    /// The required number of consecutive clean passes was reached.
    Success,
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    info: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.info = Style::new().blue().bold();
    }
}

/// Writes [`RunEvent`]s to the console.
pub struct RunReporter<'a> {
    stderr: ReporterStderr<'a>,
    styles: Styles,
}

impl<'a> RunReporter<'a> {
    /// Creates a new reporter.
    pub fn new(stderr: ReporterStderr<'a>, should_colorize: bool) -> Self {
        let mut styles = Styles::default();
        if should_colorize {
            styles.colorize();
        }
        Self { stderr, styles }
    }

    /// Reports an event.
    pub fn report(&mut self, event: RunEvent<'_>) -> Result<(), WriteEventError> {
        let mut line = self.format_event(&event);
        line.push('\n');
        match &mut self.stderr {
            ReporterStderr::Terminal => {
                let mut writer = BufWriter::new(std::io::stderr());
                writer
                    .write_all(line.as_bytes())
                    .map_err(WriteEventError::Io)?;
                writer.flush().map_err(WriteEventError::Io)
            }
            ReporterStderr::Buffer(buf) => {
                buf.extend_from_slice(line.as_bytes());
                Ok(())
            }
        }
    }

    fn format_event(&self, event: &RunEvent<'_>) -> String {
        let styles = &self.styles;
        let mut out = String::new();
        match event {
            RunEvent::PassStarted {
                pass,
                max_passes,
                test_count,
                runtime_excluded,
            } => {
                swrite!(
                    out,
                    "{} running {} {}",
                    format!("[PASS {pass}/{max_passes}]").style(styles.info),
                    test_count.style(styles.count),
                    plural::tests_str(*test_count),
                );
                if *runtime_excluded > 0 {
                    swrite!(
                        out,
                        " ({} excluded at runtime)",
                        runtime_excluded.style(styles.count)
                    );
                }
            }
            RunEvent::TestFailed {
                test_name,
                kind,
                log_path,
            } => {
                swrite!(
                    out,
                    "{} {test_name} ({}) log: {log_path}",
                    "[FAILURE]".style(styles.fail),
                    kind.style(styles.fail),
                );
            }
            RunEvent::BatchCrashed {
                test_count,
                culprit,
                split_into,
                log_path,
            } => {
                swrite!(
                    out,
                    "{} batch of {} {} crashed",
                    "[BATCH CRASH]".style(styles.fail),
                    test_count.style(styles.count),
                    plural::tests_str(*test_count),
                );
                match culprit {
                    Some(culprit) => swrite!(out, " while running {culprit}"),
                    None => swrite!(out, " before running any test"),
                }
                swrite!(
                    out,
                    ", split into {} {}",
                    split_into.style(styles.count),
                    plural::batches_str(*split_into)
                );
                if let Some(log_path) = log_path {
                    swrite!(out, " log: {log_path}");
                }
            }
            RunEvent::Progress {
                batches_completed,
                tests_finished,
                failures,
                crash_rate,
                remaining,
            } => {
                swrite!(
                    out,
                    "{} {} {} completed, {} {} finished, {} {}, crash rate {:.1}%, {} queued",
                    "[PROGRESS]".style(styles.info),
                    batches_completed.style(styles.count),
                    plural::batches_str(*batches_completed),
                    tests_finished.style(styles.count),
                    plural::tests_str(*tests_finished),
                    failures.style(styles.count),
                    plural::failures_str(*failures),
                    crash_rate * 100.0,
                    remaining.style(styles.count),
                );
            }
            RunEvent::DeepVerifyStarted { test_count, repeat } => {
                swrite!(
                    out,
                    "{} running {} suspected {} alone, {} times each",
                    "[VERIFY]".style(styles.info),
                    test_count.style(styles.count),
                    if *test_count == 1 { "crash" } else { "crashes" },
                    repeat.style(styles.count),
                );
            }
            RunEvent::RuntimeFlake { test_name, repeat } => {
                swrite!(
                    out,
                    "{} {test_name} passed {repeat} solo runs, excluding it for the rest of this run",
                    "[FLAKE]".style(styles.skip),
                );
            }
            RunEvent::PassFinished {
                pass,
                stats,
                consecutive_successes,
                target_successes,
            } => {
                let failures = stats.failure_count();
                let tag = format!("[PASS {pass}]");
                let tag_style = if stats.is_clean() {
                    styles.pass
                } else {
                    styles.fail
                };
                swrite!(
                    out,
                    "{} {} {} listed, {} {}",
                    tag.style(tag_style),
                    stats.tests_listed.style(styles.count),
                    plural::tests_str(stats.tests_listed),
                    failures.style(styles.count),
                    plural::failures_str(failures),
                );
                if failures > 0 {
                    let by_kind: Vec<String> = stats
                        .failures
                        .iter()
                        .filter(|(_, count)| **count > 0)
                        .map(|(kind, count)| format!("{count} {kind}"))
                        .collect();
                    swrite!(out, " ({})", by_kind.join(", "));
                }
                swrite!(
                    out,
                    ", {} {}; {}/{} consecutive clean passes",
                    stats.runtime_flakes.style(styles.count),
                    plural::flakes_str(stats.runtime_flakes),
                    consecutive_successes,
                    target_successes,
                );
            }
            RunEvent::FilterUpdated { path, entry_count } => {
                swrite!(
                    out,
                    "{} updated {path} ({} {})",
                    "[FILTER]".style(styles.skip),
                    entry_count.style(styles.count),
                    plural::entries_str(*entry_count),
                );
            }
            RunEvent::Success => {
                swrite!(out, "{}", "SUCCESS".style(styles.pass));
            }
        }
        out
    }
}
