// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use gtest_runner::runner::RunFinalStatus;
use indoc::indoc;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn crash_only_in_batch_is_excluded_at_runtime() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[
            ("A", Behavior::Pass),
            ("B", Behavior::CrashInBatch),
            ("C", Behavior::Pass),
        ],
    );
    let mut config = config();
    config.max_passes = Some(2);

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(
        result.runtime_excluded.into_iter().collect::<Vec<_>>(),
        vec!["S.B".to_owned()]
    );
    assert!(!env.filter_path().exists(), "runtime flakes aren't persisted");
    assert!(result.output.contains("[FLAKE]"), "output: {}", result.output);

    // The second pass skips the flaky test.
    let batches = fake.batches();
    assert_eq!(
        batches.last().unwrap(),
        &vec!["S.A".to_owned(), "S.C".to_owned()]
    );
}

#[tokio::test]
async fn runtime_flake_makes_pass_unclean() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[("A", Behavior::Pass), ("B", Behavior::CrashInBatch)],
    );

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn deep_verification_runs_in_chunks_with_batch_timeout() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[("A", Behavior::Pass), ("B", Behavior::CrashInBatch)],
    );
    let mut config = config();
    config.crash_retry_count = 25;
    let timeout = config.timeout;

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(
        fake.deep_verifies("S.B"),
        vec![(10, timeout), (10, timeout), (5, timeout)]
    );
    assert!(result.runtime_excluded.contains("S.B"));
    assert!(!env.filter_path().exists());
}

#[tokio::test]
async fn hanging_suspect_stops_after_first_chunk() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path())
        .suite("T.", &[("Fast", Behavior::Pass), ("Slow", Behavior::Timeout)]);
    let mut config = config();
    config.crash_retry_count = 25;
    let timeout = config.timeout;

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(fake.deep_verifies("T.Slow"), vec![(10, timeout)]);
    assert!(result.runtime_excluded.is_empty());
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        vec!["T.Slow".to_owned()]
    );
}

#[tokio::test]
async fn obsolete_entries_are_untouched_on_clean_run() {
    let env = TestEnv::new();
    let contents = indoc! {r#"
        {
          "comment": "flaky on bots",
          "failing_tests": ["Obsolete.Test"]
        }
    "#};
    env.write_filter(contents);
    let fake = FakeGtest::new(env.path()).suite("Live.", &[("Case", Behavior::Pass)]);

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(
        std::fs::read_to_string(env.filter_path()).unwrap(),
        contents,
        "filter file is byte-identical"
    );
}

#[tokio::test]
async fn obsolete_entries_and_other_keys_survive_rewrite() {
    let env = TestEnv::new();
    env.write_filter(indoc! {r#"
        {
          "comment": "flaky on bots",
          "failing_tests": ["Obsolete.Test"]
        }
    "#});
    let fake = FakeGtest::new(env.path()).suite(
        "Live.",
        &[("Good", Behavior::Pass), ("Bad", Behavior::Fail)],
    );

    let result = execute(&env, &fake, config()).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(
        std::fs::read_to_string(env.filter_path()).unwrap(),
        indoc! {r#"
            {
              "failing_tests": [
                "Live.Bad",
                "Obsolete.Test"
              ],
              "comment": "flaky on bots"
            }
        "#}
    );
}

#[tokio::test]
async fn late_failure_breaks_consecutive_passes() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "X.",
        &[("Y", Behavior::FailFromRun(2)), ("Z", Behavior::Pass)],
    );
    let mut config = config();
    config.consecutive_flake_free = 2;

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Failed);
    assert_eq!(fake.list_count(), 2);
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        vec!["X.Y".to_owned()]
    );
}

#[tokio::test]
async fn consecutive_clean_passes_relist_each_time() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite("S.", &[("A", Behavior::Pass)]);
    let mut config = config();
    config.consecutive_flake_free = 2;

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(fake.list_count(), 2);
    assert_eq!(fake.batches().len(), 2);
}

#[tokio::test]
async fn failures_are_skipped_in_later_passes() {
    let env = TestEnv::new();
    let fake = FakeGtest::new(env.path()).suite(
        "S.",
        &[("A", Behavior::Pass), ("B", Behavior::Fail)],
    );
    let mut config = config();
    config.max_passes = Some(3);

    let result = execute(&env, &fake, config).await;

    assert_eq!(result.status.unwrap(), RunFinalStatus::Success);
    assert_eq!(
        fake.batches(),
        vec![
            vec!["S.A".to_owned(), "S.B".to_owned()],
            vec!["S.A".to_owned()],
        ]
    );
    assert_eq!(
        env.filter_entries().into_iter().collect::<Vec<_>>(),
        vec!["S.B".to_owned()]
    );
}
