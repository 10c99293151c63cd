//! # Runner Constants
//!
//! Process-key naming and option names shared by the job builder, the result
//! processor and the configuration layer.

/// Separator between a step key and its chunk suffix in a process key
pub const BATCH_KEY_SEPARATOR: &str = "#batch_";

/// Chunk suffix used when a batch step runs unsplit
pub const BATCH_ALL_SUFFIX: &str = "all";

/// Option names accepted by `add_options` and the configuration loader
pub mod option_names {
    pub const WORKER: &str = "worker";
    pub const BLOCK_ERROR: &str = "block_error";
    pub const BATCH_PROCESS: &str = "batch_process";
    pub const PANIC_AS_ERROR: &str = "panic_as_error";
    pub const STEP_TIMEOUT_MS: &str = "step_timeout_ms";
}

/// Configuration file and environment naming
pub mod config_sources {
    /// Base file name (without extension) looked up in the config directory
    pub const BASE_FILE_STEM: &str = "fanout";
    /// Prefix for environment variable overrides, e.g. `FANOUT_WORKER=4`
    pub const ENV_PREFIX: &str = "FANOUT";
    /// Default directory searched for configuration files
    pub const DEFAULT_CONFIG_DIR: &str = "config";
}

/// Build the process key of chunk `ordinal` (1-based) of `step_key`
pub fn batch_process_key(step_key: &str, ordinal: usize) -> String {
    format!("{step_key}{BATCH_KEY_SEPARATOR}{ordinal}")
}

/// Build the process key of an unsplit batch step
pub fn batch_all_process_key(step_key: &str) -> String {
    format!("{step_key}{BATCH_KEY_SEPARATOR}{BATCH_ALL_SUFFIX}")
}

/// Split a chunk process key into `(step_key, ordinal)`.
///
/// `<step>#batch_<n>` yields `n` (must be > 0). Keys with no chunk suffix are `None`.
///
/// `<step>#batch_all` is not rejected: it yields ordinal 1, so an unsplit
/// batch lands in its step's chunk table and a collector receives it as a
/// one-element list instead of an empty one. The step part is everything
/// before the last separator, and collector cleanup matches on it exactly
/// rather than on the raw `<step>#batch_` prefix.
pub fn parse_batch_process_key(process_key: &str) -> Option<(&str, usize)> {
    let (step_key, suffix) = process_key.rsplit_once(BATCH_KEY_SEPARATOR)?;
    if suffix == BATCH_ALL_SUFFIX {
        return Some((step_key, 1));
    }
    match suffix.parse::<usize>() {
        Ok(ordinal) if ordinal > 0 => Some((step_key, ordinal)),
        _ => None,
    }
}
