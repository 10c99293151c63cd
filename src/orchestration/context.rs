//! # Step Execution Context
//!
//! [`StepContext`] is handed to every step function and collector. It carries
//! the run's cancellation token and, when a per-job timeout is configured, a
//! deadline. Cancellation is cooperative: the runner never interrupts a step,
//! so long-running steps should await [`StepContext::done`] (directly or via
//! [`StepContext::run_until_done`] / [`StepContext::sleep`]) at their
//! suspension points.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{StepError, StepResult};

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

/// Cancellable execution context for one job
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Cancelled with the run, and also at the deadline once one is set
    token: CancellationToken,
    /// The token the context was created with
    parent: CancellationToken,
    deadline: Option<Deadline>,
    /// Stops the deadline timer once every clone of the context is dropped
    _deadline_guard: Option<Arc<DropGuard>>,
    step_key: String,
    process_key: String,
}

impl StepContext {
    pub(crate) fn new(
        token: CancellationToken,
        step_key: impl Into<String>,
        process_key: impl Into<String>,
    ) -> Self {
        Self {
            parent: token.clone(),
            token,
            deadline: None,
            _deadline_guard: None,
            step_key: step_key.into(),
            process_key: process_key.into(),
        }
    }

    /// A standalone context that is never cancelled unless its token is.
    ///
    /// Useful for calling step functions directly, e.g. in unit tests.
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), "", "")
    }

    /// A standalone context driven by `token`
    pub fn with_token(token: CancellationToken) -> Self {
        Self::new(token, "", "")
    }

    /// Derive a context that also expires `timeout` from now.
    ///
    /// The derived [`cancellation_token`](Self::cancellation_token) is a child
    /// of the current one and is cancelled when the deadline passes. Outside a
    /// tokio runtime no timer is armed and only the deadline checks apply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        // an earlier deadline from the parent still applies
        if self.deadline.is_some_and(|existing| existing.at <= at) {
            return self;
        }

        let token = self.token.child_token();
        if let Ok(handle) = Handle::try_current() {
            let timer = token.clone();
            handle.spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => timer.cancel(),
                    _ = timer.cancelled() => {}
                }
            });
        }

        self._deadline_guard = Some(Arc::new(token.clone().drop_guard()));
        self.token = token;
        self.deadline = Some(Deadline { at, timeout });
        self
    }

    pub fn step_key(&self) -> &str {
        &self.step_key
    }

    pub fn process_key(&self) -> &str {
        &self.process_key
    }

    /// Token cancelled with the run or at the deadline, for handing to
    /// clients that accept one
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Time left before the deadline, `None` without a timeout
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.at.saturating_duration_since(Instant::now()))
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d.at)
    }

    /// True once the run was cancelled or the deadline passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<StepError> {
        if self.parent.is_cancelled() {
            return Some(StepError::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d.at => Some(StepError::DeadlineExceeded {
                timeout_ms: d.timeout.as_millis() as u64,
            }),
            _ if self.token.is_cancelled() => Some(StepError::Cancelled),
            _ => None,
        }
    }

    /// Resolves when the run is cancelled or the deadline passes
    pub async fn done(&self) {
        match self.deadline {
            Some(d) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(d.at) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Drive `fut` to completion unless the context finishes first
    pub async fn run_until_done<F>(&self, fut: F) -> StepResult<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.done() => Err(self.err().unwrap_or(StepError::Cancelled)),
            output = fut => Ok(output),
        }
    }

    /// Sleep for `duration`, returning early with the context error if done
    pub async fn sleep(&self, duration: Duration) -> StepResult<()> {
        self.run_until_done(tokio::time::sleep(duration)).await
    }
}
