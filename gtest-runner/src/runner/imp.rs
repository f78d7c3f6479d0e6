// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    condense::condense_failures,
    config::RunnerConfig,
    errors::{RunError, TestRunnerBuildError, WorkerError},
    filter_file::{FilterFile, FilterWriteMode},
    gtest::{BatchCommand, GtestCommandBuilder, parse_batch_output},
    helpers::plural,
    list::{Batch, TestEnumeration},
    reporter::{PassStats, RunEvent, RunReporter},
    scheduler::Scheduler,
    signal::{SignalHandler, SignalHandlerKind},
    split::{detect_batch_crash, split_batch},
    test_logs::TestLogWriter,
    worker::{CommandOutput, WorkerPool},
};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use debug_ignore::DebugIgnore;
use futures::{FutureExt, StreamExt, future::BoxFuture, stream::FuturesUnordered};
use gtest_parallel_metadata::FailureKind;
use indexmap::IndexSet;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    future::Future,
    sync::Arc,
};
use tracing::{debug, info, warn};

/// The number of times in a row the pool may fail to run the same batch before the run is
/// abandoned.
pub const MAX_WORKER_ATTEMPTS: usize = 3;

/// Test runner options.
#[derive(Debug)]
pub struct TestRunnerBuilder {
    binary: Utf8PathBuf,
    work_dir: Utf8PathBuf,
    config: RunnerConfig,
    filter_file: Option<Utf8PathBuf>,
    extra_args: Vec<String>,
}

impl TestRunnerBuilder {
    /// Creates a new builder for running `binary` in `work_dir`.
    pub fn new(
        binary: impl Into<Utf8PathBuf>,
        work_dir: impl Into<Utf8PathBuf>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            config,
            filter_file: None,
            extra_args: Vec::new(),
        }
    }

    /// Sets the filter file. By default, it's auto-detected from the binary's path.
    pub fn set_filter_file(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.filter_file = Some(path.into());
        self
    }

    /// Sets arguments passed through to every invocation of the binary.
    pub fn set_extra_args(&mut self, extra_args: Vec<String>) -> &mut Self {
        self.extra_args = extra_args;
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(
        self,
        pool: Arc<dyn WorkerPool>,
        signal_handler: SignalHandlerKind,
        reporter: RunReporter<'a>,
    ) -> Result<TestRunner<'a>, TestRunnerBuildError> {
        let signal_handler = signal_handler.build()?;
        let temp_dir = camino_tempfile::Builder::new()
            .prefix(".gtest-parallel-")
            .tempdir_in(&self.work_dir)
            .map_err(|error| TestRunnerBuildError::TempDir {
                work_dir: self.work_dir.clone(),
                error,
            })?;

        let filter_file = FilterFile::new(
            self.filter_file
                .unwrap_or_else(|| FilterFile::default_path_for(&self.binary)),
        );
        let commands = GtestCommandBuilder::new(
            self.binary,
            self.work_dir.clone(),
            temp_dir.path(),
            self.extra_args,
        );

        Ok(TestRunner {
            pool,
            commands,
            filter_file,
            logs: TestLogWriter::new(self.work_dir),
            config: self.config,
            reporter: DebugIgnore(reporter),
            signal_handler,
            runtime_excluded: BTreeSet::new(),
            _temp_dir: temp_dir,
        })
    }
}

/// How a run ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunFinalStatus {
    /// The required number of consecutive clean passes was reached.
    Success,

    /// The pass limit was reached first.
    Failed,
}

/// Context for running GoogleTest batches across a worker pool.
///
/// Created with [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    pub(super) pool: Arc<dyn WorkerPool>,
    pub(super) commands: GtestCommandBuilder,
    pub(super) filter_file: FilterFile,
    pub(super) logs: TestLogWriter,
    pub(super) config: RunnerConfig,
    pub(super) reporter: DebugIgnore<RunReporter<'a>>,
    pub(super) signal_handler: SignalHandler,
    pub(super) runtime_excluded: BTreeSet<String>,
    // Removed, along with any leftover flag and XML files, when the runner is dropped.
    _temp_dir: Utf8TempDir,
}

/// The state of one pass.
#[derive(Debug)]
pub(super) struct PassState {
    pub(super) scheduler: Scheduler,
    pub(super) stats: PassStats,

    /// Failures that will be persisted.
    pub(super) failures: BTreeMap<FailureKind, BTreeSet<String>>,

    /// Every failure seen so far, including suspected crashes.
    pub(super) seen_failures: BTreeSet<String>,

    /// Suspected crashes, in the order they were seen.
    pub(super) deep_verify: IndexSet<String>,

    /// Worker errors by batch.
    worker_attempts: HashMap<Vec<String>, usize>,
}

impl PassState {
    fn new(enumeration: &TestEnumeration, worker_count: usize, config: &RunnerConfig) -> Self {
        Self {
            scheduler: Scheduler::new(enumeration, worker_count, config.batch_size),
            stats: PassStats {
                tests_listed: enumeration.test_count(),
                ..PassStats::default()
            },
            failures: BTreeMap::new(),
            seen_failures: BTreeSet::new(),
            deep_verify: IndexSet::new(),
            worker_attempts: HashMap::new(),
        }
    }

    pub(super) fn record_failure(&mut self, kind: FailureKind, test_name: &str) {
        self.failures
            .entry(kind)
            .or_default()
            .insert(test_name.to_owned());
        self.seen_failures.insert(test_name.to_owned());
    }

    fn sync_stats(&mut self) {
        self.stats.tests_finished = self.scheduler.tests_finished();
        self.stats.failures = self
            .failures
            .iter()
            .map(|(kind, tests)| (*kind, tests.len()))
            .collect();
    }

    fn failed_tests(&self) -> BTreeSet<String> {
        self.failures.values().flatten().cloned().collect()
    }
}

/// The result of one pass.
#[derive(Clone, Debug)]
pub struct PassOutcome {
    /// Counts for the pass.
    pub stats: PassStats,

    /// Every test with a persisted failure.
    pub failed: BTreeSet<String>,
}

struct InFlightBatch {
    batch: Batch,
    // Holds the flag and XML files until the batch has been parsed.
    command: BatchCommand,
}

type BatchFuture = BoxFuture<'static, (usize, Result<CommandOutput, WorkerError>)>;

impl<'a> TestRunner<'a> {
    /// Returns the tests excluded at runtime after surviving deep verification.
    pub fn runtime_excluded(&self) -> &BTreeSet<String> {
        &self.runtime_excluded
    }

    /// Returns the filter file in use.
    pub fn filter_file(&self) -> &Utf8Path {
        self.filter_file.path()
    }

    /// Lists the tests that a pass would run, honoring the filter file.
    pub async fn list_tests(&mut self) -> Result<TestEnumeration, RunError> {
        let entries = self.filter_file.load_entries();
        self.list_with_filter(&entries).await
    }

    /// Runs passes until the required number of consecutive clean passes is reached or can no
    /// longer be reached.
    pub async fn execute(&mut self) -> Result<RunFinalStatus, RunError> {
        let target = self.config.consecutive_flake_free.max(1);
        let max_passes = self.config.effective_max_passes().max(target);
        let mut consecutive_successes = 0;
        let mut pass = 0;

        while consecutive_successes < target {
            let needed = target - consecutive_successes;
            if pass + needed > max_passes {
                info!(
                    "stopping after {pass} {}: {needed} more clean {} needed but at most {max_passes} allowed",
                    plural::passes_str(pass),
                    plural::passes_str(needed),
                );
                break;
            }
            pass += 1;

            let entries = self.filter_file.load_entries();
            let listed = self.list_with_filter(&entries).await?;
            let enumeration = listed.without(&self.runtime_excluded);
            self.reporter.report(RunEvent::PassStarted {
                pass,
                max_passes,
                test_count: enumeration.test_count(),
                runtime_excluded: listed.test_count() - enumeration.test_count(),
            })?;

            let outcome = self.run_pass(&enumeration).await?;
            if outcome.stats.is_clean() {
                consecutive_successes += 1;
            } else {
                consecutive_successes = 0;
                // Runtime-excluded tests are in `listed`, so the new entries never cover them.
                let condensed = condense_failures(&outcome.failed, &listed, &entries);
                let entry_count = condensed.len();
                if self
                    .filter_file
                    .write_entries(condensed, FilterWriteMode::Replace)?
                {
                    self.reporter.report(RunEvent::FilterUpdated {
                        path: self.filter_file.path(),
                        entry_count,
                    })?;
                }
            }

            self.reporter.report(RunEvent::PassFinished {
                pass,
                stats: &outcome.stats,
                consecutive_successes,
                target_successes: target,
            })?;
        }

        if consecutive_successes >= target {
            self.reporter.report(RunEvent::Success)?;
            Ok(RunFinalStatus::Success)
        } else {
            Ok(RunFinalStatus::Failed)
        }
    }

    /// Runs a single pass over `enumeration`.
    pub async fn run_pass(&mut self, enumeration: &TestEnumeration) -> Result<PassOutcome, RunError> {
        let worker_count = self.pool.worker_count().max(1);
        let mut state = PassState::new(enumeration, worker_count, &self.config);

        let mut futures: FuturesUnordered<BatchFuture> = FuturesUnordered::new();
        let mut future_to_batch: HashMap<usize, InFlightBatch> = HashMap::new();
        let mut next_id = 0;

        loop {
            while futures.len() < worker_count * 2 {
                let Some(batch) = state.scheduler.next_batch() else {
                    break;
                };
                let command = self.commands.batch_command(&batch)?;
                debug!(
                    "dispatching batch {next_id} with {} {}",
                    batch.len(),
                    plural::tests_str(batch.len())
                );
                let id = next_id;
                next_id += 1;
                futures.push(
                    self.pool
                        .run(command.argv.clone(), self.config.timeout)
                        .map(move |result| (id, result))
                        .boxed(),
                );
                future_to_batch.insert(id, InFlightBatch { batch, command });
            }

            let (id, result) = tokio::select! {
                next = futures.next() => match next {
                    Some(next) => next,
                    None => break,
                },
                Some(event) = self.signal_handler.recv() => {
                    return Err(RunError::Interrupted(event));
                }
            };
            let Some(in_flight) = future_to_batch.remove(&id) else {
                continue;
            };
            self.handle_batch_result(&mut state, in_flight, result)?;
        }

        self.deep_verify(&mut state).await?;

        state.sync_stats();
        Ok(PassOutcome {
            failed: state.failed_tests(),
            stats: state.stats,
        })
    }

    fn handle_batch_result(
        &mut self,
        state: &mut PassState,
        in_flight: InFlightBatch,
        result: Result<CommandOutput, WorkerError>,
    ) -> Result<(), RunError> {
        let InFlightBatch { batch, command } = in_flight;

        let output = match result {
            Ok(output) => output,
            Err(error) => {
                let attempts = state
                    .worker_attempts
                    .entry(batch.test_names().collect())
                    .or_default();
                *attempts += 1;
                if *attempts >= MAX_WORKER_ATTEMPTS {
                    return Err(RunError::WorkerFailedRepeatedly {
                        attempts: *attempts,
                        test_count: batch.len(),
                        error,
                    });
                }
                warn!(
                    "worker failed to run a batch of {} {} (attempt {}/{MAX_WORKER_ATTEMPTS}), requeueing: {error}",
                    batch.len(),
                    plural::tests_str(batch.len()),
                    *attempts,
                );
                state.scheduler.add_priority_batches(vec![batch]);
                return Ok(());
            }
        };

        let outcome = parse_batch_output(&output, command.xml_file(), &command.expected);
        drop(command);
        state.stats.batches_completed += 1;

        for (kind, tests) in &outcome.failures {
            for test_name in tests {
                let log = outcome.logs.get(test_name).map_or("", String::as_str);
                let log_path = self.logs.append(test_name, log)?;
                self.reporter.report(RunEvent::TestFailed {
                    test_name,
                    kind: *kind,
                    log_path: &log_path,
                })?;
                state.seen_failures.insert(test_name.clone());
                if kind.needs_isolation() {
                    state.deep_verify.insert(test_name.clone());
                } else {
                    state.record_failure(*kind, test_name);
                }
            }
        }

        match detect_batch_crash(&batch, &outcome) {
            Some(crash) => {
                state.scheduler.report_result(1, outcome.executed.len());
                let sub_batches = split_batch(
                    &batch,
                    crash.culprit.as_deref(),
                    self.pool.worker_count().max(1),
                );
                let log_path = match &crash.culprit {
                    Some(culprit) => Some(self.logs.append(culprit, &output.combined())?),
                    None => None,
                };
                self.reporter.report(RunEvent::BatchCrashed {
                    test_count: batch.len(),
                    culprit: crash.culprit.as_deref(),
                    split_into: sub_batches.len(),
                    log_path: log_path.as_deref(),
                })?;

                if sub_batches.len() < 2 {
                    for test_name in batch.test_names() {
                        if !outcome.executed.contains(&test_name) {
                            state.seen_failures.insert(test_name.clone());
                            state.deep_verify.insert(test_name);
                        }
                    }
                } else {
                    state.scheduler.add_priority_batches(sub_batches);
                }
            }
            None => {
                state
                    .scheduler
                    .report_result(outcome.crash_count(), batch.len());
            }
        }

        if state.stats.batches_completed % self.config.progress_interval == 0 {
            self.reporter.report(RunEvent::Progress {
                batches_completed: state.stats.batches_completed,
                tests_finished: state.scheduler.tests_finished(),
                failures: state.seen_failures.len(),
                crash_rate: state.scheduler.crash_rate(),
                remaining: state.scheduler.remaining(),
            })?;
        }

        Ok(())
    }

    async fn list_with_filter(
        &mut self,
        entries: &BTreeSet<String>,
    ) -> Result<TestEnumeration, RunError> {
        let listing = TestEnumeration::from_binary(
            &*self.pool,
            &self.commands,
            entries,
            self.config.timeout,
        );
        let enumeration = interruptible(&mut self.signal_handler, listing).await??;
        debug!(
            "listed {} {} ({} filter {})",
            enumeration.test_count(),
            plural::tests_str(enumeration.test_count()),
            entries.len(),
            plural::entries_str(entries.len()),
        );
        Ok(enumeration)
    }
}

/// Waits for `fut`, unless a shutdown signal arrives first.
pub(super) async fn interruptible<T>(
    signal_handler: &mut SignalHandler,
    fut: impl Future<Output = T>,
) -> Result<T, RunError> {
    tokio::select! {
        out = fut => Ok(out),
        Some(event) = signal_handler.recv() => Err(RunError::Interrupted(event)),
    }
}
