// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CommandOutput, LocalPool, WorkerPool};
use crate::errors::WorkerError;
use futures::{FutureExt, future::BoxFuture};
use std::{
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing::{debug, warn};

/// A pool that runs each command in its own Docker container.
///
/// The working directory is bind-mounted at the same path inside the container and used as the
/// container's working directory, so relative paths mean the same thing on both sides.
#[derive(Clone, Debug)]
pub struct ContainerPool {
    local: LocalPool,
    image: String,
    name_prefix: String,
    counter: Arc<AtomicUsize>,
}

impl ContainerPool {
    /// The container client that commands are passed through.
    pub const DOCKER: &'static str = "docker";

    /// Creates a new container pool on top of a local pool.
    pub fn new(local: LocalPool, image: impl Into<String>) -> Self {
        Self {
            local,
            image: image.into(),
            name_prefix: format!("gtest-parallel-{}", std::process::id()),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the image containers are started from.
    pub fn image(&self) -> &str {
        &self.image
    }

    fn container_argv(&self, name: &str, argv: Vec<String>) -> Vec<String> {
        let work_dir = self.local.work_dir().as_str();
        let mut out = vec![
            Self::DOCKER.to_owned(),
            "run".to_owned(),
            "--rm".to_owned(),
            "--init".to_owned(),
            "--name".to_owned(),
            name.to_owned(),
            "-v".to_owned(),
            format!("{work_dir}:{work_dir}"),
            "-w".to_owned(),
            work_dir.to_owned(),
            self.image.clone(),
        ];
        out.extend(argv);
        out
    }
}

impl WorkerPool for ContainerPool {
    fn worker_count(&self) -> usize {
        self.local.worker_count()
    }

    fn run(
        &self,
        argv: Vec<String>,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<CommandOutput, WorkerError>> {
        if argv.is_empty() {
            return futures::future::ready(Err(WorkerError::EmptyCommand)).boxed();
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{index}", self.name_prefix);
        let container_argv = self.container_argv(&name, argv);
        let local = self.local.clone();

        async move {
            let output = local.run_impl(container_argv, timeout).await?;
            if output.status.is_timeout() {
                // Killing the client doesn't stop the container.
                remove_container(&name).await;
            }
            Ok(output)
        }
        .boxed()
    }
}

async fn remove_container(name: &str) {
    debug!("removing timed-out container {name}");
    let status = tokio::process::Command::new(ContainerPool::DOCKER)
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("`docker rm -f {name}` exited with {status}"),
        Err(error) => warn!("failed to run `docker rm -f {name}`: {error}"),
    }
}
