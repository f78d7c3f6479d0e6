// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use gtest_runner::{
    errors::RunError,
    reporter::{ReporterStderr, RunReporter},
    runner::{RunFinalStatus, TestRunnerBuilder},
    signal::{ShutdownEvent, SignalHandlerKind},
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, sync::Arc};

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[tokio::test]
async fn all_pass_leaves_no_filter_file() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("SuiteA.", &[("Alpha", Behavior::Pass), ("Beta", Behavior::Pass)])
        .suite("SuiteB.", &[("Gamma", Behavior::Pass)]);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert!(!env.filter_path().exists(), "no filter file written");
    assert!(result.output.contains("SUCCESS"), "output: {}", result.output);
    assert_eq!(fake.list_count(), 1);
    assert_eq!(
        fake.batches(),
        vec![names(&["SuiteA.Alpha", "SuiteA.Beta", "SuiteB.Gamma"])]
    );
}

#[tokio::test]
async fn failures_are_written_to_filter_file() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "SuiteA.",
        &[
            ("Alpha", Behavior::Fail),
            ("Beta", Behavior::Fail),
            ("Gamma", Behavior::Pass),
        ],
    );

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(
        env.filter_entries(),
        ["SuiteA.Alpha", "SuiteA.Beta"]
            .into_iter()
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
    );
    assert!(
        result.output.contains("[FAILURE] SuiteA.Alpha (FAIL)"),
        "output: {}",
        result.output
    );
    assert!(
        env.path().join("test_logs/SuiteA.Alpha.log").exists(),
        "failure log written"
    );
    assert!(result.output.contains("[FILTER]"), "output: {}", result.output);
}

#[tokio::test]
async fn fully_failing_suite_collapses_to_wildcard() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("Broken.", &[("One", Behavior::Fail), ("Two", Behavior::Fail)])
        .suite("Fine.", &[("Case", Behavior::Pass)]);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        names(&["Broken.*"])
    );
}

#[tokio::test]
async fn crashing_batch_is_split_around_culprit() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[
            ("A", Behavior::Pass),
            ("B", Behavior::Crash),
            ("C", Behavior::Pass),
        ],
    );

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(
        fake.batches(),
        vec![
            names(&["S.A", "S.B", "S.C"]),
            names(&["S.A"]),
            names(&["S.B"]),
            names(&["S.C"]),
        ]
    );
    assert!(
        result
            .output
            .contains("[BATCH CRASH] batch of 3 tests crashed while running S.B, split into 3 batches"),
        "output: {}",
        result.output
    );
    assert_eq!(
        fake.deep_verifies("S.B"),
        vec![(5, config().timeout)],
        "crashing test was verified alone"
    );
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        names(&["S.B"])
    );
    assert!(result.runtime_excluded.is_empty());
}

#[tokio::test]
async fn timed_out_test_is_persisted() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("T.", &[("Fast", Behavior::Pass), ("Slow", Behavior::Timeout)]);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert!(
        result.output.contains("[FAILURE] T.Slow (TIMEOUT)"),
        "output: {}",
        result.output
    );
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        names(&["T.Slow"])
    );
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass)])
        .with_list_failure();

    let result = execute(&env, &fake, config()).await;

    assert!(
        matches!(result.status, Err(RunError::CreateTestList(_))),
        "unexpected status: {:?}",
        result.status
    );
    assert!(fake.batches().is_empty());
}

#[tokio::test]
async fn repeated_worker_failure_aborts_run() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass)])
        .with_worker_failure();

    let result = execute(&env, &fake, config()).await;

    match result.status {
        Err(RunError::WorkerFailedRepeatedly {
            attempts,
            test_count,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(test_count, 1);
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn disabled_tests_do_not_crash_the_batch() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[("A", Behavior::Pass), ("DISABLED_B", Behavior::Disabled)],
    );

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(fake.batches(), vec![names(&["S.A", "S.DISABLED_B"])]);
    assert!(
        !result.output.contains("[BATCH CRASH]"),
        "output: {}",
        result.output
    );
    assert!(fake.deep_verifies("S.DISABLED_B").is_empty());
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn worker_failure_redispatches_the_same_batch() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass), ("B", Behavior::Pass)])
        .with_worker_failures(1);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(
        fake.invocations(),
        vec![
            Invocation::List {
                negative_filter: Vec::new(),
            },
            Invocation::WorkerError {
                tests: names(&["S.A", "S.B"]),
            },
            Invocation::Batch {
                tests: names(&["S.A", "S.B"]),
            },
        ]
    );
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn zero_counts_still_run_a_pass() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass), ("B", Behavior::Crash)]);
    let zero_config = gtest_runner::config::RunnerConfig {
        consecutive_flake_free: 0,
        crash_retry_count: 0,
        max_passes: Some(0),
        ..config()
    };

    let result = execute(&env, &fake, zero_config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(fake.list_count(), 1);
    assert!(!fake.batches().is_empty());
    assert_eq!(fake.deep_verifies("S.B"), vec![(1, config().timeout)]);
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        names(&["S.B"])
    );
}

#[tokio::test]
async fn pool_without_workers_still_runs_tests() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass), ("B", Behavior::Pass)])
        .with_workers(0);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(fake.batches(), vec![names(&["S.A", "S.B"])]);
}

#[cfg(unix)]
#[tokio::test]
async fn hangup_interrupts_the_run_and_removes_temp_dir() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("S.", &[("A", Behavior::Pass), ("B", Behavior::Hang)]);

    let result = execute_with(&env, &fake, config(), SignalHandlerKind::Standard).await;

    assert!(
        matches!(
            result.status,
            Err(RunError::Interrupted(ShutdownEvent::Hangup))
        ),
        "unexpected status: {:?}",
        result.status
    );
    let leftover: Vec<String> = std::fs::read_dir(env.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".gtest-parallel-"))
        .collect();
    assert!(leftover.is_empty(), "temp dirs left behind: {leftover:?}");
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn list_tests_honors_filter_file() {
    let env = TestEnv::new();
    env.write_filter(r#"{ "failing_tests": ["S.B*"] }"#);
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[
            ("A", Behavior::Pass),
            ("B1", Behavior::Pass),
            ("B2", Behavior::Pass),
        ],
    );

    let mut buf = Vec::new();
    let enumeration = {
        let reporter = RunReporter::new(ReporterStderr::Buffer(&mut buf), false);
        let mut builder = TestRunnerBuilder::new(env.binary(), env.path(), config());
        builder.set_filter_file(env.filter_path());
        let mut runner = builder
            .build(Arc::new(fake.clone()), SignalHandlerKind::Noop, reporter)
            .unwrap();
        runner.list_tests().await.unwrap()
    };

    assert_eq!(enumeration.test_names().collect::<Vec<_>>(), names(&["S.A"]));
    assert_eq!(
        fake.invocations(),
        vec![Invocation::List {
            negative_filter: names(&["S.B*"]),
        }]
    );
}
