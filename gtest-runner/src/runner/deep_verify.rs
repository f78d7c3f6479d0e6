// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::imp::{PassState, TestRunner, interruptible};
use crate::{errors::RunError, reporter::RunEvent};
use gtest_parallel_metadata::FailureKind;
use tracing::debug;

/// The most repetitions run in a single deep-verification command. Each command gets the
/// per-batch timeout, the same as a batch of this many tests would.
const DEEP_VERIFY_CHUNK: usize = 10;

impl TestRunner<'_> {
    /// Runs each suspected crash alone, `crash_retry_count` times.
    ///
    /// The repetitions are split into commands of at most [`DEEP_VERIFY_CHUNK`] runs, each bounded
    /// by the per-batch timeout. A test that survives every repetition only crashed because of the
    /// tests it was batched with: it's excluded for the rest of this invocation but not written to
    /// the filter file. A test that crashes, fails or times out is a persisted CRASH.
    pub(super) async fn deep_verify(&mut self, state: &mut PassState) -> Result<(), RunError> {
        if state.deep_verify.is_empty() {
            return Ok(());
        }
        let repeat = self.config.crash_retry_count.max(1);
        self.reporter.report(RunEvent::DeepVerifyStarted {
            test_count: state.deep_verify.len(),
            repeat,
        })?;

        for test_name in std::mem::take(&mut state.deep_verify) {
            debug!("verifying {test_name} with {repeat} solo runs");
            let mut completed = 0;
            let mut failure = None;
            for chunk in repeat_chunks(repeat) {
                let argv = self.commands.deep_verify_command(&test_name, chunk);
                let run = self.pool.run(argv, self.config.timeout);
                let output = interruptible(&mut self.signal_handler, run)
                    .await?
                    .map_err(|error| RunError::DeepVerify {
                        test_name: test_name.clone(),
                        error,
                    })?;
                if !output.status.is_success() {
                    failure = Some(output);
                    break;
                }
                completed += chunk;
            }

            match failure {
                None => {
                    self.runtime_excluded.insert(test_name.clone());
                    state.stats.runtime_flakes += 1;
                    self.reporter
                        .report(RunEvent::RuntimeFlake { test_name: &test_name, repeat })?;
                }
                Some(output) => {
                    let log = format!(
                        "deep verification failed ({}) after {completed} clean solo runs\n{}",
                        output.status,
                        output.combined()
                    );
                    let log_path = self.logs.append(&test_name, &log)?;
                    state.record_failure(FailureKind::Crash, &test_name);
                    self.reporter.report(RunEvent::TestFailed {
                        test_name: &test_name,
                        kind: FailureKind::Crash,
                        log_path: &log_path,
                    })?;
                }
            }
        }

        Ok(())
    }
}

/// Splits `repeat` runs into command-sized chunks.
fn repeat_chunks(repeat: usize) -> impl Iterator<Item = usize> {
    (0..repeat)
        .step_by(DEEP_VERIFY_CHUNK)
        .map(move |start| DEEP_VERIFY_CHUNK.min(repeat - start))
}
