// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use gtest_parallel_metadata::GtestParallelExitCode;
use gtest_runner::{
    config::RunnerConfig,
    helpers::plural,
    reporter::{ReporterStderr, RunReporter},
    runner::{RunFinalStatus, TestRunnerBuilder},
    signal::SignalHandlerKind,
    worker::{ContainerPool, LocalPool, WorkerPool},
};
use std::{
    io::{BufWriter, Write},
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};
use supports_color::Stream;
use tracing::{debug, info, warn};

type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// Runs the tests in a GoogleTest binary in parallel batches.
///
/// Tests that fail, crash or time out are recorded in a filter file and skipped on subsequent runs.
/// The run succeeds once a pass completes with no failures the configured number of times in a
/// row.
#[derive(Debug, Parser)]
#[command(version, name = "gtest-parallel", styles = clap_styles::style())]
pub struct GtestParallelApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(flatten)]
    runner_opts: RunnerOpts,

    /// Filter file [default: <BINARY>.<platform>.filter.json next to the binary]
    #[arg(long, value_name = "PATH")]
    filter_file: Option<Utf8PathBuf>,

    /// List the tests that would run, after applying the filter file, and exit
    #[arg(long)]
    list: bool,

    /// The GoogleTest binary to run
    #[arg(value_name = "BINARY")]
    binary: Utf8PathBuf,

    /// Arguments passed through to every invocation of the binary
    #[arg(
        value_name = "PASSTHROUGH",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    passthrough: Vec<String>,
}

impl GtestParallelApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let work_dir = current_work_dir()?;
        let binary = work_dir.join(&self.binary);
        let binary = binary
            .canonicalize_utf8()
            .map_err(|error| ExpectedError::BinaryNotFound { binary, error })?;

        let mut config = self.config_opts.make_config(&work_dir)?;
        self.runner_opts.apply(&mut config);
        debug!("resolved config: {config:?}");

        let pool = make_pool(&work_dir, &config);
        let consecutive_flake_free = config.consecutive_flake_free;

        // Signal handlers must be registered from within the runtime.
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|error| ExpectedError::RuntimeCreateFailed { error })?;
        let _guard = runtime.enter();

        let reporter = RunReporter::new(
            ReporterStderr::Terminal,
            output.color.should_colorize(Stream::Stderr),
        );
        let mut builder = TestRunnerBuilder::new(binary, &work_dir, config);
        if let Some(filter_file) = &self.filter_file {
            builder.set_filter_file(work_dir.join(filter_file));
        }
        builder.set_extra_args(self.passthrough);
        let mut runner = builder.build(pool, SignalHandlerKind::Standard, reporter)?;
        info!("using filter file `{}`", runner.filter_file());

        if self.list {
            let enumeration = runtime.block_on(runner.list_tests())?;
            let mut stdout = BufWriter::new(std::io::stdout());
            for test_name in enumeration.test_names() {
                writeln!(stdout, "{test_name}")
                    .map_err(|error| ExpectedError::WriteTestListError { error })?;
            }
            stdout
                .flush()
                .map_err(|error| ExpectedError::WriteTestListError { error })?;
            info!(
                "listed {} {}",
                enumeration.test_count(),
                plural::tests_str(enumeration.test_count())
            );
            return Ok(GtestParallelExitCode::OK);
        }

        match runtime.block_on(runner.execute())? {
            RunFinalStatus::Success => Ok(GtestParallelExitCode::OK),
            RunFinalStatus::Failed => Err(ExpectedError::StabilityNotReached {
                consecutive_flake_free,
                filter_file: runner.filter_file().to_owned(),
            }),
        }
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: .config/gtest-parallel.toml in the current directory]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, work_dir: &Utf8Path) -> Result<RunnerConfig> {
        let config_file = self
            .config_file
            .as_deref()
            .map(|config_file| work_dir.join(config_file));
        let config = RunnerConfig::from_sources(work_dir, config_file.as_deref(), |file, unknown| {
            for key in unknown {
                warn!("ignoring unknown configuration key `{key}` in {file}");
            }
        })?;
        Ok(config)
    }
}

/// Options that override the config file.
#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of batches to run simultaneously [default: logical CPU count]
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<NonZeroUsize>,

    /// Timeout for each batch, in seconds [default: 300]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Upper bound on the number of tests in a batch
    #[arg(long, value_name = "N")]
    batch_size: Option<NonZeroUsize>,

    /// Number of consecutive clean passes required [default: 1]
    #[arg(long, value_name = "N")]
    consecutive_flake_free: Option<NonZeroUsize>,

    /// Number of times a suspected crash is rerun on its own [default: 100]
    #[arg(long, value_name = "N")]
    crash_retry_count: Option<NonZeroUsize>,

    /// Maximum number of passes [default: --consecutive-flake-free]
    #[arg(long, value_name = "N")]
    max_passes: Option<NonZeroUsize>,

    /// Run tests as local processes rather than in Docker containers
    #[arg(long)]
    no_docker: bool,

    /// Docker image to run tests in [default: ubuntu:24.04]
    #[arg(long, value_name = "IMAGE", conflicts_with = "no_docker")]
    docker_image: Option<String>,
}

impl RunnerOpts {
    fn apply(&self, config: &mut RunnerConfig) {
        if let Some(jobs) = self.jobs {
            config.jobs = jobs.get();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = Some(batch_size.get());
        }
        if let Some(consecutive_flake_free) = self.consecutive_flake_free {
            config.consecutive_flake_free = consecutive_flake_free.get();
        }
        if let Some(crash_retry_count) = self.crash_retry_count {
            config.crash_retry_count = crash_retry_count.get();
        }
        if let Some(max_passes) = self.max_passes {
            config.max_passes = Some(max_passes.get());
        }
        if self.no_docker {
            config.use_docker = false;
        }
        if let Some(docker_image) = &self.docker_image {
            config.docker_image = docker_image.clone();
        }
    }
}

fn current_work_dir() -> Result<Utf8PathBuf> {
    let current_dir =
        std::env::current_dir().map_err(|error| ExpectedError::CurrentDirFailed { error })?;
    let current_dir = current_dir
        .canonicalize()
        .map_err(|error| ExpectedError::CurrentDirFailed { error })?;
    Utf8PathBuf::try_from(current_dir)
        .map_err(|error| ExpectedError::CurrentDirInvalidUtf8 { path: error.into_path_buf() })
}

fn make_pool(work_dir: &Utf8Path, config: &RunnerConfig) -> Arc<dyn WorkerPool> {
    let local = LocalPool::new(work_dir, config.jobs);
    if config.use_docker {
        let pool = ContainerPool::new(local, config.docker_image.clone());
        debug!("running tests in docker image {}", pool.image());
        Arc::new(pool)
    } else {
        Arc::new(local)
    }
}
