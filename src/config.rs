//! Layered application configuration.
//!
//! Settings are merged with `figment` in increasing priority:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config FILE`, else `config.toml` in the platform config dir)
//! 3. Environment variables prefixed with `DUPFIND_` (e.g. `DUPFIND_JOBS=8`)
//! 4. CLI flags
//!
//! Size keys accept either a byte count or a string such as `"4MiB"`.
//!
//! ```toml
//! min_size = "1MiB"
//! strategy = "fan-out"
//! jobs = 8
//! algorithm = "sha256"
//! progress = false
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::cli::{parse_size, Cli};
use crate::duplicates::{FinderConfig, Strategy, DEFAULT_QUEUE_CAPACITY};
use crate::output::OutputFormat;
use crate::scanner::{
    governor, HashAlgorithm, WalkerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MIN_SIZE, MIN_CHUNK_SIZE,
};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DUPFIND_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum file size to hash, in bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub min_size: u64,
    /// Concurrency bound; `None` means twice the CPU count.
    pub jobs: Option<usize>,
    /// Capacity of the bounded queues.
    pub queue_capacity: usize,
    /// Hashing read buffer size, in bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub chunk_size: u64,
    /// Scheduling strategy.
    pub strategy: Strategy,
    /// Content hash function.
    pub algorithm: HashAlgorithm,
    /// Report format.
    pub output: OutputFormat,
    /// Show the progress spinner.
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            jobs: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE as u64,
            strategy: Strategy::default(),
            algorithm: HashAlgorithm::default(),
            output: OutputFormat::default(),
            progress: true,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A source could not be parsed into a `Config`.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// A value parsed but is out of range.
    #[error("Invalid value for '{key}': {message}")]
    Invalid {
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl Config {
    /// Load defaults, file and environment.
    ///
    /// With `explicit = None` the platform config file is used if it exists.
    /// Ranges are not checked here; a bad file value may still be replaced
    /// by a CLI flag, so [`Config::merge_cli`] validates the final result.
    ///
    /// # Errors
    ///
    /// Fails if an explicit file is missing or a source does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) if !path.is_file() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        if let Some(ref path) = file {
            log::debug!("Reading config file {}", path.display());
        }

        Self::figment(file.as_deref())
            .extract()
            .map_err(|e| ConfigError::Parse(Box::new(e)))
    }

    /// The provider stack without CLI flags.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// `config.toml` in the platform-specific config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dupfind").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply CLI flags on top of the loaded values.
    ///
    /// # Errors
    ///
    /// Fails if the merged values are out of range.
    pub fn merge_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if let Some(min_size) = cli.min_size {
            self.min_size = min_size;
        }
        if let Some(jobs) = cli.jobs {
            self.jobs = Some(jobs);
        }
        if let Some(capacity) = cli.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(chunk_size) = cli.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(strategy) = cli.strategy {
            self.strategy = strategy;
        }
        if let Some(algorithm) = cli.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        if cli.no_progress || cli.quiet {
            self.progress = false;
        }
        self.validate()
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == Some(0) {
            return Err(ConfigError::Invalid {
                key: "jobs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "queue_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.chunk_size < MIN_CHUNK_SIZE as u64 || usize::try_from(self.chunk_size).is_err() {
            return Err(ConfigError::Invalid {
                key: "chunk_size",
                message: format!("must be at least {MIN_CHUNK_SIZE} bytes"),
            });
        }
        Ok(())
    }

    /// Effective concurrency bound.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.jobs.unwrap_or_else(governor::default_capacity)
    }

    /// Finder settings derived from this configuration.
    #[must_use]
    pub fn finder_config(&self) -> FinderConfig {
        FinderConfig::default()
            .with_strategy(self.strategy)
            .with_concurrency(self.concurrency())
            .with_queue_capacity(self.queue_capacity)
            .with_walker_config(WalkerConfig::default().with_min_size(self.min_size))
            .with_algorithm(self.algorithm)
            .with_chunk_size(usize::try_from(self.chunk_size).unwrap_or(DEFAULT_CHUNK_SIZE))
    }
}

/// Accept `1048576` as well as `"1MiB"`.
fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeValue {
        Bytes(u64),
        Text(String),
    }

    match SizeValue::deserialize(deserializer)? {
        SizeValue::Bytes(n) => Ok(n),
        SizeValue::Text(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}
