//! Configuration Loader
//!
//! Environment-aware loading of run options. Sources are merged in order,
//! later sources overriding earlier ones:
//!
//! 1. `<dir>/fanout.toml`
//! 2. `<dir>/fanout.<environment>.toml`
//! 3. `FANOUT_*` environment variables (e.g. `FANOUT_WORKER=4`)
//!
//! Missing files are skipped. Unknown keys are logged and ignored; known keys
//! are validated through [`RunOptions::apply`].

use super::error::{ConfigResult, ConfigurationError};
use super::{OptionKey, RunOption, RunOptions};
use crate::constants::config_sources;
use ::config::{Config, Environment, File, FileFormat};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variables under the `FANOUT_` prefix that are not run options
const NON_OPTION_KEYS: [&str; 3] = ["env", "log_format", "config_dir"];

/// Loads [`RunOption`]s from configuration files and environment variables
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
    env_source: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader for the default directory and the detected environment
    pub fn new() -> Self {
        Self {
            config_directory: Self::default_config_directory(),
            environment: Self::detect_environment(),
            env_source: None,
        }
    }

    /// Loader reading files from `dir`
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_directory: dir.into(),
            ..Self::new()
        }
    }

    /// Override the detected environment name
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Read `FANOUT_*` variables from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    pub fn environment_name(&self) -> &str {
        &self.environment
    }

    /// Detect the current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("FANOUT_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("FANOUT_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(config_sources::DEFAULT_CONFIG_DIR))
    }

    /// Merge all sources and return the recognised options, ordered by name
    pub fn load_options(&self) -> ConfigResult<Vec<RunOption>> {
        let base = self
            .config_directory
            .join(format!("{}.toml", config_sources::BASE_FILE_STEM));
        let overlay = self.config_directory.join(format!(
            "{}.{}.toml",
            config_sources::BASE_FILE_STEM,
            self.environment
        ));

        debug!(
            environment = %self.environment,
            config_directory = %self.config_directory.display(),
            "Loading run options"
        );

        let settings = Config::builder()
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(config_sources::ENV_PREFIX)
                    .try_parsing(true)
                    .source(self.env_source.clone()),
            )
            .build()
            .map_err(|e| ConfigurationError::LoadFailed {
                source_name: self.config_directory.display().to_string(),
                reason: e.to_string(),
            })?;

        let raw: BTreeMap<String, Value> =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::LoadFailed {
                    source_name: self.config_directory.display().to_string(),
                    reason: e.to_string(),
                })?;

        let mut options = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            if NON_OPTION_KEYS.contains(&name.as_str()) {
                continue;
            }
            match name.parse::<OptionKey>() {
                Ok(key) => options.push(RunOption { key, value }),
                Err(_) => warn!(field = %name, "Ignoring unknown run option"),
            }
        }
        Ok(options)
    }

    /// Load and validate options on top of [`RunOptions::default`]
    pub fn load(&self) -> ConfigResult<RunOptions> {
        let mut options = RunOptions::default();
        options.apply(&self.load_options()?)?;
        Ok(options)
    }
}
