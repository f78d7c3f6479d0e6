// Copyright (c) The gtest-parallel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run configuration.
//!
//! Settings are layered: the defaults embedded in this crate, then the repository config file,
//! then whatever the caller overrides on the resulting [`RunnerConfig`] (typically command-line
//! flags).

use crate::errors::ConfigParseError;
use camino::Utf8Path;
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, sync::LazyLock, time::Duration};
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Resolved settings for a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunnerConfig {
    /// The number of commands run at once.
    pub jobs: usize,

    /// The timeout for each batch, and for each deep-verification run.
    pub timeout: Duration,

    /// An upper bound on batch size, if any.
    pub batch_size: Option<usize>,

    /// The number of consecutive clean passes required for success.
    pub consecutive_flake_free: usize,

    /// How many times a suspected crash is repeated during deep verification.
    pub crash_retry_count: usize,

    /// The maximum number of passes. `None` means [`Self::consecutive_flake_free`].
    pub max_passes: Option<usize>,

    /// Print a progress line after this many batches complete.
    pub progress_interval: usize,

    /// The image containers are started from.
    pub docker_image: String,

    /// Whether to run commands in containers.
    pub use_docker: bool,
}

impl Default for RunnerConfig {
    /// The same settings as the embedded default config.
    fn default() -> Self {
        Self {
            jobs: get_num_cpus(),
            timeout: Duration::from_secs(300),
            batch_size: None,
            consecutive_flake_free: 1,
            crash_retry_count: 100,
            max_passes: None,
            progress_interval: 25,
            docker_image: "ubuntu:24.04".to_owned(),
            use_docker: true,
        }
    }
}

impl RunnerConfig {
    /// The repository config file, relative to the working directory.
    pub const CONFIG_PATH: &'static str = ".config/gtest-parallel.toml";

    /// Contains the default config as a TOML file.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Reads the config.
    ///
    /// If `config_file` is given it must exist; otherwise [`Self::CONFIG_PATH`] under `work_dir` is
    /// read if present. Unknown keys are passed to `unknown_callback` along with the file they were
    /// found in.
    pub fn from_sources(
        work_dir: &Utf8Path,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = work_dir.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (config, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|error| ConfigParseError::new(&config_file, error))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }
        Ok(config.into_runner_config())
    }

    /// Returns the maximum number of passes, which is never below
    /// [`Self::consecutive_flake_free`].
    pub fn effective_max_passes(&self) -> usize {
        self.max_passes
            .unwrap_or(self.consecutive_flake_free)
            .max(self.consecutive_flake_free)
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(ConfigDeserialize, BTreeSet<String>), config::ConfigError> {
        let config = builder.build_cloned()?;

        let mut ignored = BTreeSet::new();
        let config: ConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                ignored.insert(path.to_string());
            })?;
        Ok((config, ignored))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigDeserialize {
    run: RunConfigDeserialize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunConfigDeserialize {
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    #[serde(default)]
    batch_size: Option<usize>,
    consecutive_flake_free: usize,
    crash_retry_count: usize,
    #[serde(default)]
    max_passes: Option<usize>,
    progress_interval: usize,
    docker_image: String,
    use_docker: bool,
}

impl ConfigDeserialize {
    fn into_runner_config(self) -> RunnerConfig {
        let run = self.run;
        RunnerConfig {
            jobs: run.jobs.unwrap_or_else(get_num_cpus).max(1),
            timeout: run.timeout,
            batch_size: run.batch_size,
            consecutive_flake_free: run.consecutive_flake_free.max(1),
            crash_retry_count: run.crash_retry_count.max(1),
            max_passes: run.max_passes,
            progress_interval: run.progress_interval.max(1),
            docker_image: run.docker_image,
            use_docker: run.use_docker,
        }
    }
}
