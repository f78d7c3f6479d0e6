// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CommandOutput, CommandStatus, WorkerPool};
use crate::{errors::WorkerError, helpers::decode_output};
use camino::{Utf8Path, Utf8PathBuf};
use futures::{FutureExt, future::BoxFuture};
use std::{process::Stdio, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::Semaphore,
    task::JoinHandle,
};
use tracing::debug;

/// How long to keep draining a killed process's pipes. A grandchild that inherited the pipes can
/// keep them open indefinitely.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A pool that runs each command as a local child process.
#[derive(Clone, Debug)]
pub struct LocalPool {
    work_dir: Utf8PathBuf,
    jobs: usize,
    permits: Arc<Semaphore>,
}

impl LocalPool {
    /// Creates a new pool running at most `jobs` commands at once, in `work_dir`.
    pub fn new(work_dir: impl Into<Utf8PathBuf>, jobs: usize) -> Self {
        let jobs = jobs.max(1);
        Self {
            work_dir: work_dir.into(),
            jobs,
            permits: Arc::new(Semaphore::new(jobs)),
        }
    }

    /// Returns the directory commands are run in.
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    pub(super) async fn run_impl(
        &self,
        argv: Vec<String>,
        timeout: Duration,
    ) -> Result<CommandOutput, WorkerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| WorkerError::PoolClosed)?;

        let (program, args) = argv.split_first().ok_or(WorkerError::EmptyCommand)?;
        let command_str = shell_words::join(&argv);
        debug!("running `{command_str}` with timeout {timeout:?}");

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|error| WorkerError::Spawn {
            command: command_str.clone(),
            error,
        })?;

        let stdout_task = spawn_drain(child.stdout.take());
        let stderr_task = spawn_drain(child.stderr.take());

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => CommandStatus::from_exit_status(status),
            Ok(Err(error)) => {
                return Err(WorkerError::Wait {
                    command: command_str,
                    error,
                });
            }
            Err(_elapsed) => {
                debug!("`{command_str}` timed out after {timeout:?}, killing it");
                // The process may have exited in the meantime, in which case there's nothing to
                // kill.
                let _ = child.start_kill();
                let _ = child.wait().await;
                CommandStatus::TimedOut
            }
        };

        let stdout = collect_drain(stdout_task).await;
        let stderr = collect_drain(stderr_task).await;

        Ok(CommandOutput {
            status,
            stdout: decode_output(&stdout),
            stderr: decode_output(&stderr),
        })
    }
}

impl WorkerPool for LocalPool {
    fn worker_count(&self) -> usize {
        self.jobs
    }

    fn run(
        &self,
        argv: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<CommandOutput, WorkerError>> {
        let this = self.clone();
        async move { this.run_impl(argv, timeout).await }.boxed()
    }
}

fn spawn_drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error leaves whatever was read so far, which is the best we can do.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn collect_drain(mut task: JoinHandle<Vec<u8>>) -> Vec<u8> {
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(_join_error)) => Vec::new(),
        Err(_elapsed) => {
            task.abort();
            Vec::new()
        }
    }
}
