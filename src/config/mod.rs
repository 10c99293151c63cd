//! # Runner Configuration
//!
//! Run options control how a [`StepRunner`](crate::StepRunner) schedules jobs:
//! the worker limit, fail-fast cancellation, batch chunk size, panic
//! containment and the per-job timeout.
//!
//! Options arrive as loosely typed `(name, value)` pairs, either from code via
//! [`RunOption`] constructors or from files/environment through
//! [`ConfigLoader`]. Both paths go through [`RunOptions::apply`], which
//! validates the whole batch before touching the active options.
//!
//! ## Usage
//!
//! ```rust
//! use fanout_core::config::{RunOption, RunOptions};
//!
//! let mut options = RunOptions::default();
//! options
//!     .apply(&[RunOption::worker(4), RunOption::batch_process(100)])
//!     .unwrap();
//! assert_eq!(options.effective_workers(), 4);
//! assert_eq!(options.batch_chunk_size(), Some(100));
//! ```

pub mod error;
pub mod loader;

use crate::constants::option_names;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Recognised option names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKey {
    /// Maximum number of jobs running at once
    Worker,
    /// Cancel the run on the first job failure
    BlockError,
    /// Chunk size for batch inputs
    BatchProcess,
    /// Convert panics inside a step into failures
    PanicAsError,
    /// Per-job timeout in milliseconds, 0 disables it
    StepTimeoutMs,
}

impl OptionKey {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionKey::Worker => option_names::WORKER,
            OptionKey::BlockError => option_names::BLOCK_ERROR,
            OptionKey::BatchProcess => option_names::BATCH_PROCESS,
            OptionKey::PanicAsError => option_names::PANIC_AS_ERROR,
            OptionKey::StepTimeoutMs => option_names::STEP_TIMEOUT_MS,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            option_names::WORKER => Ok(OptionKey::Worker),
            option_names::BLOCK_ERROR => Ok(OptionKey::BlockError),
            option_names::BATCH_PROCESS => Ok(OptionKey::BatchProcess),
            option_names::PANIC_AS_ERROR => Ok(OptionKey::PanicAsError),
            option_names::STEP_TIMEOUT_MS => Ok(OptionKey::StepTimeoutMs),
            _ => Err(ConfigurationError::UnknownField {
                field: s.to_string(),
            }),
        }
    }
}

/// A single option assignment; the value is validated when applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOption {
    pub key: OptionKey,
    pub value: Value,
}

impl RunOption {
    pub fn new(key: OptionKey, value: impl Into<Value>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn worker(count: impl Into<Value>) -> Self {
        Self::new(OptionKey::Worker, count)
    }

    pub fn block_error(enabled: bool) -> Self {
        Self::new(OptionKey::BlockError, enabled)
    }

    pub fn batch_process(chunk_size: impl Into<Value>) -> Self {
        Self::new(OptionKey::BatchProcess, chunk_size)
    }

    pub fn panic_as_error(enabled: bool) -> Self {
        Self::new(OptionKey::PanicAsError, enabled)
    }

    pub fn step_timeout_ms(millis: impl Into<Value>) -> Self {
        Self::new(OptionKey::StepTimeoutMs, millis)
    }
}

/// Active options for a runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Explicit worker limit; `None` means one worker per available CPU
    pub workers: Option<usize>,
    pub block_error: bool,
    /// Chunk size for batch inputs; `None` runs each batch as one job
    pub batch_size: Option<usize>,
    pub panic_as_error: bool,
    /// Per-job timeout, 0 means unlimited
    pub step_timeout_ms: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: None,
            block_error: false,
            batch_size: None,
            panic_as_error: true,
            step_timeout_ms: 0,
        }
    }
}

impl RunOptions {
    /// Worker limit used by the executor, never below 1
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(workers) if workers > 0 => workers,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    /// Chunk size if batch splitting is enabled
    pub fn batch_chunk_size(&self) -> Option<usize> {
        self.batch_size.filter(|size| *size > 0)
    }

    /// Per-job timeout if one is configured
    pub fn step_timeout(&self) -> Option<Duration> {
        (self.step_timeout_ms > 0).then(|| Duration::from_millis(self.step_timeout_ms))
    }

    /// Validate and apply a batch of options.
    ///
    /// The batch is applied atomically: every entry is checked against a
    /// staged copy, and `self` is only updated when all of them are valid.
    pub fn apply(&mut self, options: &[RunOption]) -> ConfigResult<()> {
        let mut staged = self.clone();
        for option in options {
            staged.apply_one(option)?;
        }
        *self = staged;
        Ok(())
    }

    fn apply_one(&mut self, option: &RunOption) -> ConfigResult<()> {
        let field = option.key.as_str();
        match option.key {
            OptionKey::Worker => {
                let workers = as_number(field, &option.value)?;
                if workers <= 0 {
                    return Err(ConfigurationError::invalid_value(
                        field,
                        &option.value,
                        "must be > 0",
                    ));
                }
                self.workers = Some(to_usize(field, workers)?);
            }
            OptionKey::BlockError => {
                self.block_error = as_bool(field, &option.value)?;
            }
            OptionKey::BatchProcess => {
                let size = as_number(field, &option.value)?;
                if size <= 0 {
                    return Err(ConfigurationError::invalid_value(
                        field,
                        &option.value,
                        "must be > 0",
                    ));
                }
                self.batch_size = Some(to_usize(field, size)?);
            }
            OptionKey::PanicAsError => {
                self.panic_as_error = as_bool(field, &option.value)?;
            }
            OptionKey::StepTimeoutMs => {
                let millis = as_number(field, &option.value)?;
                if millis < 0 {
                    return Err(ConfigurationError::invalid_value(
                        field,
                        &option.value,
                        "must be >= 0",
                    ));
                }
                self.step_timeout_ms = millis as u64;
            }
        }
        Ok(())
    }
}

/// Accept any JSON number; fractional values truncate toward zero
fn as_number(field: &str, value: &Value) -> ConfigResult<i64> {
    let Value::Number(number) = value else {
        return Err(ConfigurationError::type_mismatch(field, "number", value));
    };
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    if number.as_u64().is_some() {
        return Err(ConfigurationError::invalid_value(
            field,
            value,
            "exceeds the supported range",
        ));
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(ConfigurationError::invalid_value(
            field,
            value,
            "not a finite number",
        )),
    }
}

fn as_bool(field: &str, value: &Value) -> ConfigResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ConfigurationError::type_mismatch(field, "bool", value))
}

fn to_usize(field: &str, n: i64) -> ConfigResult<usize> {
    usize::try_from(n)
        .map_err(|_| ConfigurationError::invalid_value(field, n, "exceeds the supported range"))
}
