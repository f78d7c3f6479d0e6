// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A scripted stand-in for a GoogleTest binary, implemented as a worker pool.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use futures::{FutureExt, future::BoxFuture};
use gtest_runner::{
    condense::entry_matches,
    config::RunnerConfig,
    errors::{RunError, WorkerError},
    filter_file::FilterFile,
    reporter::{ReporterStderr, RunReporter},
    runner::{RunFinalStatus, TestRunnerBuilder},
    signal::SignalHandlerKind,
    worker::{CommandOutput, CommandStatus, WorkerPool},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
    sync::{Arc, Mutex},
    time::Duration,
};

/// How a fake test behaves.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Behavior {
    Pass,
    Fail,
    /// Kills the process every time it runs.
    Crash,
    /// Kills the process when run as part of a batch, but passes repeated solo runs.
    CrashInBatch,
    /// Hangs until the worker's timeout expires.
    Timeout,
    /// Passes the first `n - 1` times it runs, then fails.
    FailFromRun(usize),
    /// Listed, but reported as not run, like GoogleTest's `DISABLED_` tests.
    Disabled,
    /// Never finishes. The fake sends itself SIGHUP when this test is dispatched.
    Hang,
}

/// One invocation of the fake binary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Invocation {
    List { negative_filter: Vec<String> },
    Batch { tests: Vec<String> },
    /// The pool failed before the batch could run.
    WorkerError { tests: Vec<String> },
    DeepVerify {
        test_name: String,
        repeat: usize,
        timeout: Duration,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    runs: BTreeMap<String, usize>,
    worker_errors: usize,
    invocations: Vec<Invocation>,
}

#[derive(Clone, Debug)]
pub(crate) struct FakeGtest {
    work_dir: Utf8PathBuf,
    workers: usize,
    suites: Vec<(String, Vec<(String, Behavior)>)>,
    list_fails: bool,
    /// The number of batch commands the pool fails before it starts running them.
    worker_failures: usize,
    state: Arc<Mutex<FakeState>>,
}

impl FakeGtest {
    pub(crate) fn new(work_dir: &Utf8Path) -> Self {
        Self {
            work_dir: work_dir.to_owned(),
            workers: 2,
            suites: Vec::new(),
            list_fails: false,
            worker_failures: 0,
            state: Arc::default(),
        }
    }

    pub(crate) fn suite(mut self, suite_key: &str, cases: &[(&str, Behavior)]) -> Self {
        self.suites.push((
            suite_key.to_owned(),
            cases
                .iter()
                .map(|(case, behavior)| ((*case).to_owned(), *behavior))
                .collect(),
        ));
        self
    }

    pub(crate) fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub(crate) fn with_list_failure(mut self) -> Self {
        self.list_fails = true;
        self
    }

    /// Makes the pool fail every batch command.
    pub(crate) fn with_worker_failure(self) -> Self {
        self.with_worker_failures(usize::MAX)
    }

    /// Makes the pool fail the first `count` batch commands.
    pub(crate) fn with_worker_failures(mut self, count: usize) -> Self {
        self.worker_failures = count;
        self
    }

    pub(crate) fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub(crate) fn batches(&self) -> Vec<Vec<String>> {
        self.invocations()
            .into_iter()
            .filter_map(|invocation| match invocation {
                Invocation::Batch { tests } => Some(tests),
                _ => None,
            })
            .collect()
    }

    /// The `(repeat, timeout)` of every deep verification command for `test_name`.
    pub(crate) fn deep_verifies(&self, test_name: &str) -> Vec<(usize, Duration)> {
        self.invocations()
            .into_iter()
            .filter_map(|invocation| match invocation {
                Invocation::DeepVerify {
                    test_name: name,
                    repeat,
                    timeout,
                } if name == test_name => Some((repeat, timeout)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn list_count(&self) -> usize {
        self.invocations()
            .iter()
            .filter(|invocation| matches!(invocation, Invocation::List { .. }))
            .count()
    }

    fn behavior(&self, test_name: &str) -> Option<Behavior> {
        self.suites.iter().find_map(|(suite_key, cases)| {
            let case = test_name.strip_prefix(suite_key.as_str())?;
            cases
                .iter()
                .find(|(name, _)| name == case)
                .map(|(_, behavior)| *behavior)
        })
    }

    fn flag_filter(&self, argv: &[String]) -> Option<String> {
        let flag_file = argv
            .iter()
            .find_map(|arg| arg.strip_prefix("--gtest_flagfile="))?;
        let contents = std::fs::read_to_string(self.work_dir.join(flag_file)).unwrap();
        contents
            .trim()
            .strip_prefix("--gtest_filter=")
            .map(str::to_owned)
    }

    fn batch_tests(&self, argv: &[String]) -> Option<Vec<String>> {
        if argv.iter().any(|arg| arg == "--gtest_list_tests") {
            return None;
        }
        let filter = self.flag_filter(argv)?;
        Some(filter.split(':').map(str::to_owned).collect())
    }

    fn hangs(&self, argv: &[String]) -> bool {
        self.batch_tests(argv).is_some_and(|tests| {
            tests
                .iter()
                .any(|test_name| self.behavior(test_name) == Some(Behavior::Hang))
        })
    }

    fn execute(&self, argv: &[String], timeout: Duration) -> Result<CommandOutput, WorkerError> {
        if argv.iter().any(|arg| arg == "--gtest_list_tests") {
            return Ok(self.list(argv));
        }
        if let Some(repeat) = argv
            .iter()
            .find_map(|arg| arg.strip_prefix("--gtest_repeat="))
        {
            let test_name = argv
                .iter()
                .find_map(|arg| arg.strip_prefix("--gtest_filter="))
                .unwrap()
                .to_owned();
            return Ok(self.deep_verify(test_name, repeat.parse().unwrap(), timeout));
        }
        self.batch(argv)
    }

    fn list(&self, argv: &[String]) -> CommandOutput {
        let negative_filter: Vec<String> = self
            .flag_filter(argv)
            .map(|filter| {
                filter
                    .strip_prefix('-')
                    .unwrap()
                    .split(':')
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .invocations
            .push(Invocation::List {
                negative_filter: negative_filter.clone(),
            });

        if self.list_fails {
            return output(CommandStatus::Exited(1), "error: can't load libfoo.so\n".to_owned());
        }

        let mut stdout = String::new();
        for (suite_key, cases) in &self.suites {
            let cases: Vec<&str> = cases
                .iter()
                .map(|(case, _)| case.as_str())
                .filter(|case| {
                    let test_name = format!("{suite_key}{case}");
                    !negative_filter
                        .iter()
                        .any(|entry| entry_matches(entry, &test_name))
                })
                .collect();
            if cases.is_empty() {
                continue;
            }
            writeln!(stdout, "{suite_key}").unwrap();
            for case in cases {
                writeln!(stdout, "  {case}").unwrap();
            }
        }
        output(CommandStatus::Exited(0), stdout)
    }

    fn deep_verify(&self, test_name: String, repeat: usize, timeout: Duration) -> CommandOutput {
        self.state
            .lock()
            .unwrap()
            .invocations
            .push(Invocation::DeepVerify {
                test_name: test_name.clone(),
                repeat,
                timeout,
            });
        let status = match self.behavior(&test_name) {
            Some(Behavior::Crash) => CommandStatus::Signaled(11),
            Some(Behavior::Timeout) => CommandStatus::TimedOut,
            Some(Behavior::Fail) => CommandStatus::Exited(1),
            _ => CommandStatus::Exited(0),
        };
        output(status, format!("[ RUN      ] {test_name}\n"))
    }

    fn batch(&self, argv: &[String]) -> Result<CommandOutput, WorkerError> {
        let tests = self.batch_tests(argv).unwrap();
        let xml_path = argv
            .iter()
            .find_map(|arg| arg.strip_prefix("--gtest_output=xml:"))
            .map(|path| self.work_dir.join(path))
            .unwrap();

        let mut state = self.state.lock().unwrap();
        if state.worker_errors < self.worker_failures {
            state.worker_errors += 1;
            state.invocations.push(Invocation::WorkerError { tests });
            return Err(WorkerError::PoolClosed);
        }
        state.invocations.push(Invocation::Batch {
            tests: tests.clone(),
        });

        let mut stdout = String::new();
        // `None` marks a test that wasn't run.
        let mut results: Vec<(String, Option<bool>)> = Vec::new();
        for test_name in &tests {
            let behavior = self.behavior(test_name).unwrap();
            if behavior == Behavior::Disabled {
                results.push((test_name.clone(), None));
                continue;
            }
            writeln!(stdout, "[ RUN      ] {test_name}").unwrap();
            let runs = state.runs.entry(test_name.clone()).or_default();
            *runs += 1;
            let passed = match behavior {
                Behavior::Pass => true,
                Behavior::Fail => false,
                Behavior::FailFromRun(n) => *runs < n,
                Behavior::Crash | Behavior::CrashInBatch => {
                    writeln!(stdout, "Segmentation fault").unwrap();
                    return Ok(output(CommandStatus::Signaled(11), stdout));
                }
                Behavior::Timeout => return Ok(output(CommandStatus::TimedOut, stdout)),
                Behavior::Disabled | Behavior::Hang => unreachable!("handled before running"),
            };
            if passed {
                writeln!(stdout, "[       OK ] {test_name} (0 ms)").unwrap();
            } else {
                writeln!(stdout, "[  FAILED  ] {test_name} (0 ms)").unwrap();
            }
            results.push((test_name.clone(), Some(passed)));
        }

        std::fs::write(&xml_path, xml_report(&results)).unwrap();
        let all_passed = results.iter().all(|(_, passed)| *passed != Some(false));
        Ok(output(
            CommandStatus::Exited(if all_passed { 0 } else { 1 }),
            stdout,
        ))
    }
}

impl WorkerPool for FakeGtest {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run(
        &self,
        argv: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<CommandOutput, WorkerError>> {
        if self.hangs(&argv) {
            send_hangup();
            return futures::future::pending().boxed();
        }
        futures::future::ready(self.execute(&argv, timeout)).boxed()
    }
}

fn send_hangup() {
    let status = std::process::Command::new("kill")
        .args(["-HUP", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success(), "kill -HUP failed: {status}");
}

fn output(status: CommandStatus, stdout: String) -> CommandOutput {
    CommandOutput {
        status,
        stdout,
        stderr: String::new(),
    }
}

fn xml_report(results: &[(String, Option<bool>)]) -> String {
    let mut by_suite: BTreeMap<&str, Vec<(&str, Option<bool>)>> = BTreeMap::new();
    for (test_name, passed) in results {
        let (suite, case) = test_name.split_once('.').unwrap();
        by_suite.entry(suite).or_default().push((case, *passed));
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
    for (suite, cases) in by_suite {
        writeln!(xml, "  <testsuite name=\"{suite}\">").unwrap();
        for (case, passed) in cases {
            match passed {
                None => writeln!(
                    xml,
                    "    <testcase name=\"{case}\" status=\"notrun\" classname=\"{suite}\" />"
                )
                .unwrap(),
                Some(true) => writeln!(
                    xml,
                    "    <testcase name=\"{case}\" status=\"run\" classname=\"{suite}\" />"
                )
                .unwrap(),
                Some(false) => writeln!(
                    xml,
                    "    <testcase name=\"{case}\" status=\"run\" classname=\"{suite}\">\n      \
                     <failure message=\"fake_test.cc:1&#x0A;Expected equality\" type=\"\" />\n    \
                     </testcase>"
                )
                .unwrap(),
            }
        }
        xml.push_str("  </testsuite>\n");
    }
    xml.push_str("</testsuites>\n");
    xml
}

/// A working directory with a fake binary path and filter file inside it.
pub(crate) struct TestEnv {
    pub(crate) work_dir: Utf8TempDir,
}

impl TestEnv {
    pub(crate) fn new() -> Self {
        Self {
            work_dir: camino_tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        self.work_dir.path()
    }

    pub(crate) fn binary(&self) -> Utf8PathBuf {
        self.path().join("out/fake_unittests")
    }

    pub(crate) fn filter_path(&self) -> Utf8PathBuf {
        self.path().join("fake_unittests.filter.json")
    }

    pub(crate) fn filter_entries(&self) -> BTreeSet<String> {
        FilterFile::new(self.filter_path()).load_entries()
    }

    pub(crate) fn write_filter(&self, contents: &str) {
        std::fs::write(self.filter_path(), contents).unwrap();
    }
}

pub(crate) fn config() -> RunnerConfig {
    RunnerConfig {
        jobs: 2,
        timeout: Duration::from_secs(30),
        batch_size: None,
        consecutive_flake_free: 1,
        crash_retry_count: 5,
        max_passes: None,
        progress_interval: 1,
        docker_image: "ubuntu:24.04".to_owned(),
        use_docker: false,
    }
}

/// The result of running the controller against a fake binary.
#[derive(Debug)]
pub(crate) struct RunResult {
    pub(crate) status: Result<RunFinalStatus, RunError>,
    pub(crate) output: String,
    pub(crate) runtime_excluded: BTreeSet<String>,
}

pub(crate) async fn execute(env: &TestEnv, fake: &FakeGtest, config: RunnerConfig) -> RunResult {
    execute_with(env, fake, config, SignalHandlerKind::Noop).await
}

pub(crate) async fn execute_with(
    env: &TestEnv,
    fake: &FakeGtest,
    config: RunnerConfig,
    signal_handler: SignalHandlerKind,
) -> RunResult {
    let mut buf = Vec::new();
    let (status, runtime_excluded) = {
        let reporter = RunReporter::new(ReporterStderr::Buffer(&mut buf), false);
        let mut builder = TestRunnerBuilder::new(env.binary(), env.path(), config);
        builder
            .set_filter_file(env.filter_path())
            .set_extra_args(vec!["--fake-flag".to_owned()]);
        let mut runner = builder
            .build(Arc::new(fake.clone()), signal_handler, reporter)
            .unwrap();
        let status = runner.execute().await;
        (status, runner.runtime_excluded().clone())
    };
    RunResult {
        status,
        output: String::from_utf8(buf).unwrap(),
        runtime_excluded,
    }
}
