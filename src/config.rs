//! File configuration for downloader defaults.
//!
//! Settings resolve with the precedence CLI flag > config file > built-in
//! default. The file is optional; a missing default file is not an error, but
//! an explicitly named one is.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_OUTPUT_DIR, DEFAULT_RATE_LIMIT,
    EngineConfig, MAX_CONCURRENCY, MAX_RETRIES_LIMIT, MIN_CONCURRENCY, OverwritePolicy,
    RetryPolicy,
};

const CONFIG_DIR_NAME: &str = "bulk-downloader";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_BACKOFF_MS: u64 = 60_000;
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors loading or validating a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Offending key.
        field: &'static str,
        /// Rendered value.
        value: String,
        /// Accepted range.
        expected: &'static str,
    },
}

/// TOML-backed file configuration. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Default output directory.
    pub output_dir: Option<PathBuf>,
    /// Worker count (1..=100).
    pub concurrency: Option<usize>,
    /// Fetch starts per second; 0 disables limiting.
    pub rate_limit: Option<f64>,
    /// Retries after the first attempt (0..=10).
    pub max_retries: Option<u32>,
    /// Linear backoff step in milliseconds.
    pub backoff_ms: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP total request timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Keep destinations that already exist.
    pub skip_existing: Option<bool>,
}

impl FileConfig {
    /// Validates values against the same ranges the CLI enforces.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first invalid key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            return Err(out_of_range("concurrency", concurrency, "1..=100"));
        }

        if let Some(rate_limit) = self.rate_limit
            && (!rate_limit.is_finite() || rate_limit < 0.0)
        {
            return Err(out_of_range("rate_limit", rate_limit, "a finite number >= 0"));
        }

        if let Some(max_retries) = self.max_retries
            && max_retries > MAX_RETRIES_LIMIT
        {
            return Err(out_of_range("max_retries", max_retries, "0..=10"));
        }

        if let Some(backoff_ms) = self.backoff_ms
            && backoff_ms > MAX_BACKOFF_MS
        {
            return Err(out_of_range("backoff_ms", backoff_ms, "0..=60000"));
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
        return Err(out_of_range(field, value, "1..=3600"));
    }
    Ok(())
}

fn out_of_range(field: &'static str, value: impl ToString, expected: &'static str) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved config path, if one could be determined.
    pub path: Option<PathBuf>,
    /// Parsed file config when the file existed.
    pub config: Option<FileConfig>,
    /// Whether configuration came from disk.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulk-downloader/config.toml`
/// 2. `$HOME/.config/bulk-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if the file exists.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or validated.
pub fn load_default_file_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig::default());
    };

    if !path_ref.exists() {
        debug!(path = %path_ref.display(), "no config file");
        return Ok(LoadedConfig {
            path,
            config: None,
            loaded_from_file: false,
        });
    }

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
        loaded_from_file: true,
    })
}

/// Loads and validates an explicitly named config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config_str(&raw, path)?;
    debug!(path = %path.display(), ?config, "loaded config file");
    Ok(config)
}

fn parse_config_str(raw: &str, origin: &Path) -> Result<FileConfig, ConfigError> {
    let config: FileConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--output-dir`
    pub output_dir: Option<PathBuf>,
    /// `--concurrency`
    pub concurrency: Option<usize>,
    /// `--rate-limit`
    pub rate_limit: Option<f64>,
    /// `--max-retries`
    pub max_retries: Option<u32>,
    /// `--skip-existing`; absent means "not given".
    pub skip_existing: bool,
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Engine configuration.
    pub engine: EngineConfig,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP total request timeout.
    pub read_timeout: Duration,
}

/// Merges CLI flags over file values over built-in defaults.
#[must_use]
pub fn resolve_settings(file: Option<&FileConfig>, cli: &CliOverrides) -> Settings {
    let file = file.cloned().unwrap_or_default();

    let output_dir = cli
        .output_dir
        .clone()
        .or(file.output_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let concurrency = cli
        .concurrency
        .or(file.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    let rate_limit = cli
        .rate_limit
        .or(file.rate_limit)
        .unwrap_or(DEFAULT_RATE_LIMIT);
    let max_retries = cli
        .max_retries
        .or(file.max_retries)
        .unwrap_or(DEFAULT_MAX_RETRIES);

    let mut retry = RetryPolicy::new(max_retries);
    if let Some(backoff_ms) = file.backoff_ms {
        retry = retry.with_backoff_step(Duration::from_millis(backoff_ms));
    }

    let overwrite = if cli.skip_existing || file.skip_existing.unwrap_or(false) {
        OverwritePolicy::SkipExisting
    } else {
        OverwritePolicy::Overwrite
    };

    Settings {
        engine: EngineConfig {
            output_dir,
            concurrency,
            rate_limit,
            retry,
            overwrite,
        },
        connect_timeout: Duration::from_secs(
            file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        ),
        read_timeout: Duration::from_secs(file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)),
    }
}
