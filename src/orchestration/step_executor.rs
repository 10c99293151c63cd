//! # Step Executor
//!
//! Runs a run's jobs on the tokio runtime under a counting semaphore sized to
//! the worker limit. Each admitted job is spawned into a [`JoinSet`] and holds
//! its permit until its response is recorded; the executor returns only after
//! every spawned job has finished (join-all barrier).
//!
//! Per job:
//!
//! - with block-on-error, a job whose run token is already cancelled is
//!   recorded as not executed without taking a permit
//! - the step receives a [`StepContext`] bound to the run token, with a
//!   deadline when a step timeout is configured
//! - a panic is caught and recorded as [`StepError::Panicked`] when
//!   panic-as-error is on; otherwise scheduling stops, in-flight jobs are
//!   aborted and the panic resumes on the caller
//! - with block-on-error, a failed response cancels the run token

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, warn, Instrument};

use crate::config::RunOptions;
use crate::error::StepError;
use crate::orchestration::context::StepContext;
use crate::orchestration::core::SharedState;
use crate::orchestration::types::{Job, Response};

type PanicPayload = Box<dyn Any + Send + 'static>;

/// How a spawned job ended
enum JobOutcome {
    /// A response was recorded for the job
    Recorded,
    /// The step panicked with panic-as-error disabled
    Fatal(PanicPayload),
}

/// Bounded-concurrency job executor for a single run
#[derive(Debug)]
pub(crate) struct StepExecutor {
    semaphore: Arc<Semaphore>,
    workers: usize,
    block_error: bool,
    panic_as_error: bool,
    step_timeout: Option<Duration>,
}

impl StepExecutor {
    pub fn new(options: &RunOptions) -> Self {
        let workers = options.effective_workers().min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            block_error: options.block_error,
            panic_as_error: options.panic_as_error,
            step_timeout: options.step_timeout(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job to completion, recording responses into `state`.
    ///
    /// `run_token` is the context shared by all jobs. It is cancelled on the
    /// first failure when block-on-error is on.
    pub async fn execute(&self, jobs: Vec<Job>, run_token: &CancellationToken, state: &SharedState) {
        let fatal = CancellationToken::new();
        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();

        for job in jobs {
            let Some(permit) = self.admit(&job, run_token, &fatal, state).await else {
                if fatal.is_cancelled() {
                    break;
                }
                continue;
            };
            self.spawn_job(&mut tasks, job, permit, run_token, &fatal, state);
        }

        let mut fatal_payload: Option<PanicPayload> = None;
        while let Some(joined) = tasks.join_next().await {
            let payload = match joined {
                Ok(JobOutcome::Recorded) => continue,
                Ok(JobOutcome::Fatal(payload)) => payload,
                Err(join_error) if join_error.is_panic() => join_error.into_panic(),
                Err(join_error) => {
                    debug!(error = %join_error, "Job task aborted");
                    continue;
                }
            };
            if fatal_payload.is_none() {
                tasks.abort_all();
                fatal_payload = Some(payload);
            }
        }

        if let Some(payload) = fatal_payload {
            error!("Step panicked with panic_as_error disabled, propagating");
            std::panic::resume_unwind(payload);
        }
    }

    /// Wait for a worker slot, or record the job as skipped.
    ///
    /// Returns `None` when the job was skipped or scheduling must stop.
    async fn admit(
        &self,
        job: &Job,
        run_token: &CancellationToken,
        fatal: &CancellationToken,
        state: &SharedState,
    ) -> Option<OwnedSemaphorePermit> {
        let acquired = if self.block_error {
            tokio::select! {
                biased;
                _ = fatal.cancelled() => return None,
                _ = run_token.cancelled() => {
                    debug!(process_key = %job.process_key, "Run cancelled, skipping job");
                    state
                        .lock()
                        .run
                        .record_response(&job.process_key, Response::not_executed(&job.process_key));
                    return None;
                }
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
            }
        } else {
            tokio::select! {
                biased;
                _ = fatal.cancelled() => return None,
                permit = Arc::clone(&self.semaphore).acquire_owned() => permit,
            }
        };

        match acquired {
            Ok(permit) => Some(permit),
            Err(_) => {
                // the semaphore is owned by this executor and never closed
                warn!(process_key = %job.process_key, "Worker semaphore closed, skipping job");
                state
                    .lock()
                    .run
                    .record_response(&job.process_key, Response::not_executed(&job.process_key));
                None
            }
        }
    }

    fn spawn_job(
        &self,
        tasks: &mut JoinSet<JobOutcome>,
        job: Job,
        permit: OwnedSemaphorePermit,
        run_token: &CancellationToken,
        fatal: &CancellationToken,
        state: &SharedState,
    ) {
        let Job {
            process_key,
            step_key,
            input,
            step,
        } = job;

        let mut ctx = StepContext::new(run_token.clone(), step_key.as_str(), process_key.as_str());
        if let Some(timeout) = self.step_timeout {
            ctx = ctx.with_timeout(timeout);
        }

        let span = debug_span!("job", step_key = %step_key, process_key = %process_key);
        let state = Arc::clone(state);
        let run_token = run_token.clone();
        let fatal = fatal.clone();
        let block_error = self.block_error;
        let panic_as_error = self.panic_as_error;

        tasks.spawn(
            async move {
                debug!("Job admitted");
                let started = Instant::now();

                let outcome = AssertUnwindSafe(async move { step.call(ctx, input).await })
                    .catch_unwind()
                    .await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let response = match outcome {
                    Ok(result) => Response::from_result(result),
                    Err(payload) if panic_as_error => {
                        let message = panic_message(payload.as_ref());
                        error!(panic_msg = %message, elapsed_ms, "Step panicked");
                        Response::failure(StepError::Panicked {
                            step_key,
                            process_key: process_key.clone(),
                            message,
                        })
                    }
                    Err(payload) => {
                        error!(
                            panic_msg = %panic_message(payload.as_ref()),
                            elapsed_ms,
                            "Step panicked, aborting run"
                        );
                        fatal.cancel();
                        drop(permit);
                        return JobOutcome::Fatal(payload);
                    }
                };

                match &response.error {
                    None => debug!(elapsed_ms, "Job succeeded"),
                    Some(err) => warn!(error = %err, elapsed_ms, "Job failed"),
                }

                let failed = response.is_failure();
                state.lock().run.record_response(&process_key, response);

                if failed && block_error && !run_token.is_cancelled() {
                    warn!("Cancelling run after job failure");
                    run_token.cancel();
                }

                drop(permit);
                JobOutcome::Recorded
            }
            .instrument(span),
        );
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
