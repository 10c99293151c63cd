#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Fanout Core
//!
//! A parallel step runner for tokio. Register named async steps with single or
//! batched inputs, run them under a bounded worker limit, and get back one
//! [`Response`] per process key.
//!
//! ## Features
//!
//! - **Bounded concurrency**: at most `worker` jobs run at once
//! - **Batch chunking**: batch inputs split into `key#batch_<n>` jobs, with an
//!   optional collector merging the chunks back under `key`
//! - **Fail-fast mode**: `block_error` cancels the run on the first failure
//! - **Panic containment**: `panic_as_error` turns step panics into failures
//! - **Per-job deadlines**: `step_timeout_ms` bounds each job's context
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Registry, job builder, executor, aggregation
//! - [`config`] - Run options and the file/environment loader
//! - [`error`] - Step and configuration errors
//! - [`logging`] - Structured logging setup
//! - [`constants`] - Process-key naming and option names
//!
//! ## Quick Start
//!
//! ```rust
//! use fanout_core::{RunOption, StepContext, StepInput, StepResult, StepRunner};
//! use serde_json::{json, Value};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn greet(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
//!     let name = input.as_single().and_then(Value::as_str).unwrap_or("nobody");
//!     Ok(json!(format!("Hello {name}")))
//! }
//!
//! # tokio_test::block_on(async {
//! let runner = StepRunner::with_options(&[RunOption::worker(4)]).unwrap();
//! runner.add_step("greet", greet);
//! runner.add_input("greet", "Andree");
//!
//! let results = runner.run(&CancellationToken::new()).await;
//! assert_eq!(results["greet"].output, json!("Hello Andree"));
//! assert!(runner.is_process_success());
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestration;

pub use config::{ConfigLoader, ConfigurationError, OptionKey, RunOption, RunOptions};
pub use error::{FanoutError, Result, StepError, StepResult};
pub use logging::init_structured_logging;
pub use orchestration::{
    ordered_outputs, BatchCollector, Response, RunStats, StepContext, StepFunction, StepInput,
    StepRunner,
};
