//! # Step Runner
//!
//! [`StepRunner`] is the public entry point: callers register steps, inputs,
//! collectors and options, then call [`StepRunner::run`] to execute them all.
//!
//! ## Locking
//!
//! Registry and per-run state live in one [`RunnerState`] behind a single
//! `parking_lot::Mutex`. Registration calls lock it briefly. A run clones the
//! registry up front, so the lock is never held while steps execute; jobs
//! re-acquire it only to record their response. Runs on the same runner are
//! serialized by a separate async guard, so per-run state always belongs to
//! exactly one run.
//!
//! ## Usage
//!
//! ```rust
//! use fanout_core::{RunOption, StepContext, StepInput, StepResult, StepRunner};
//! use serde_json::{json, Value};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn shout(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
//!     let words: Vec<Value> = input
//!         .as_batch()
//!         .unwrap_or_default()
//!         .iter()
//!         .map(|v| json!(v.as_str().unwrap_or_default().to_uppercase()))
//!         .collect();
//!     Ok(Value::Array(words))
//! }
//!
//! # tokio_test::block_on(async {
//! let runner = StepRunner::with_options(&[RunOption::worker(2), RunOption::batch_process(2)])
//!     .unwrap();
//! runner.add_step("shout", shout);
//! runner.add_batch_input("shout", json!(["one", "two", "three"]));
//!
//! let results = runner.run(&CancellationToken::new()).await;
//! assert_eq!(results["shout#batch_1"].output, json!(["ONE", "TWO"]));
//! assert_eq!(results["shout#batch_2"].output, json!(["THREE"]));
//! assert!(runner.is_process_success());
//! # });
//! ```

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{ConfigLoader, RunOption, RunOptions};
use crate::error::Result;
use crate::orchestration::batch_collector::apply_collectors;
use crate::orchestration::job_builder::build_jobs;
use crate::orchestration::registry::StepRegistry;
use crate::orchestration::result_processor::RunState;
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::step_handler::{BatchCollector, StepFunction};
use crate::orchestration::types::{Response, RunStats};

/// Registry plus the state of the current or most recent run
#[derive(Debug, Default)]
pub(crate) struct RunnerState {
    pub registry: StepRegistry,
    pub run: RunState,
    pub last_stats: Option<RunStats>,
}

pub(crate) type SharedState = Arc<Mutex<RunnerState>>;

/// Parallel step runner.
///
/// Cloning is cheap and yields a handle to the same registry and run state.
#[derive(Clone, Default)]
pub struct StepRunner {
    state: SharedState,
    run_guard: Arc<tokio::sync::Mutex<()>>,
}

impl StepRunner {
    /// Runner with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner with `options` applied on top of the defaults
    pub fn with_options(options: &[RunOption]) -> Result<Self> {
        let runner = Self::new();
        runner.add_options(options)?;
        Ok(runner)
    }

    /// Runner starting from already validated options
    pub fn from_run_options(options: RunOptions) -> Self {
        let runner = Self::new();
        runner.state.lock().registry = StepRegistry::with_options(options);
        runner
    }

    /// Runner configured from files and `FANOUT_*` environment variables
    pub fn from_config(loader: &ConfigLoader) -> Result<Self> {
        Ok(Self::from_run_options(loader.load()?))
    }

    /// Register `step` under `key`; an existing step with that key is replaced
    pub fn add_step<S>(&self, key: &str, step: S)
    where
        S: StepFunction + 'static,
    {
        self.state.lock().registry.add_step(key, Arc::new(step));
    }

    /// Bind a single input to `key`
    pub fn add_input(&self, key: &str, value: impl Into<Value>) {
        self.state.lock().registry.add_input(key, value.into());
    }

    /// Append batch items for `key`; arrays are flattened into items
    pub fn add_batch_input(&self, key: &str, value: impl Into<Value>) {
        self.state.lock().registry.add_batch_input(key, value.into());
    }

    /// Register the collector merging the chunks of batch step `key`
    pub fn add_collector<C>(&self, key: &str, collector: C)
    where
        C: BatchCollector + 'static,
    {
        self.state.lock().registry.add_collector(key, Arc::new(collector));
    }

    /// Validate and apply options. On error none of `options` is applied.
    pub fn add_options(&self, options: &[RunOption]) -> Result<()> {
        self.state.lock().registry.add_options(options)?;
        Ok(())
    }

    /// Copy of the active options
    pub fn options(&self) -> RunOptions {
        self.state.lock().registry.options().clone()
    }

    /// Process keys the next run would produce, in scheduling order
    pub fn planned_process_keys(&self) -> Vec<String> {
        let state = self.state.lock();
        build_jobs(&state.registry)
            .into_iter()
            .map(|job| job.process_key)
            .collect()
    }

    /// True if no job of the last run failed
    pub fn is_process_success(&self) -> bool {
        self.state.lock().run.is_success()
    }

    /// Process keys of executed jobs that failed in the last run
    pub fn failed_processes(&self) -> Vec<String> {
        self.state.lock().run.failed_processes()
    }

    /// Process keys of executed jobs that succeeded in the last run
    pub fn success_processes(&self) -> Vec<String> {
        self.state.lock().run.success_processes()
    }

    pub fn last_run_stats(&self) -> Option<RunStats> {
        self.state.lock().last_stats.clone()
    }

    /// Execute every registered step and return the responses by process key.
    ///
    /// `cancel` is the root cancellation source; cancelling it is visible to
    /// every running step. With block-on-error the run works on a child token,
    /// so a failing job never cancels `cancel` itself.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a step when panic-as-error is disabled.
    pub async fn run(&self, cancel: &CancellationToken) -> HashMap<String, Response> {
        let _run = self.run_guard.lock().await;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let registry = {
            let mut state = self.state.lock();
            state.run.reset();
            state.registry.clone()
        };
        let options = registry.options().clone();
        let jobs = build_jobs(&registry);
        let total_jobs = jobs.len();
        let run_token = if options.block_error {
            cancel.child_token()
        } else {
            cancel.clone()
        };
        let executor = StepExecutor::new(&options);

        async {
            info!(
                total_jobs,
                workers = executor.workers(),
                block_error = options.block_error,
                batch_size = ?options.batch_chunk_size(),
                "Starting run"
            );

            executor.execute(jobs, &run_token, &self.state).await;
            let collectors_applied = apply_collectors(
                registry.collectors(),
                &run_token,
                options.panic_as_error,
                &self.state,
            )
            .await;

            if options.block_error {
                run_token.cancel();
            }

            let mut state = self.state.lock();
            let stats = RunStats {
                run_id,
                started_at,
                total_jobs,
                succeeded: state.run.success_processes().len(),
                failed: state.run.failed_processes().len(),
                skipped: state.run.skipped_count(),
                collectors_applied,
                elapsed: started.elapsed(),
            };
            info!(
                succeeded = stats.succeeded,
                failed = stats.failed,
                skipped = stats.skipped,
                collectors_applied,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "Run finished"
            );
            state.last_stats = Some(stats);
            state.run.results()
        }
        .instrument(info_span!("run", run_id = %run_id))
        .await
    }
}

impl fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRunner")
            .field("state", &*self.state.lock())
            .finish()
    }
}
