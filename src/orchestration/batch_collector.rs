//! # Batch Collector Runner
//!
//! Runs after the executor barrier. Every registered collector is called once
//! with its step's ordered chunk responses (possibly empty) and the merged
//! response replaces the step's `#batch_` entries in the results map.
//! Collectors run sequentially on the caller's task.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::StepError;
use crate::orchestration::context::StepContext;
use crate::orchestration::core::SharedState;
use crate::orchestration::step_executor::panic_message;
use crate::orchestration::step_handler::BatchCollector;
use crate::orchestration::types::Response;

/// Apply `collectors` to the recorded chunk responses; returns how many ran
pub(crate) async fn apply_collectors(
    collectors: Vec<(String, Arc<dyn BatchCollector>)>,
    run_token: &CancellationToken,
    panic_as_error: bool,
    state: &SharedState,
) -> usize {
    let mut applied = 0;

    for (step_key, collector) in collectors {
        let chunks = state.lock().run.chunk_responses(&step_key);
        let chunk_count = chunks.len();
        let ctx = StepContext::new(run_token.clone(), step_key.as_str(), step_key.as_str());

        let merged = if panic_as_error {
            match AssertUnwindSafe(collector.collect(ctx, step_key.clone(), chunks))
                .catch_unwind()
                .await
            {
                Ok(result) => Response::from_result(result),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(step_key = %step_key, panic_msg = %message, "Collector panicked");
                    Response::failure(StepError::Panicked {
                        step_key: step_key.clone(),
                        process_key: step_key.clone(),
                        message,
                    })
                }
            }
        } else {
            Response::from_result(collector.collect(ctx, step_key.clone(), chunks).await)
        };

        match &merged.error {
            None => debug!(step_key = %step_key, chunk_count, "Collector merged chunks"),
            Some(err) => warn!(step_key = %step_key, chunk_count, error = %err, "Collector failed"),
        }

        state.lock().run.replace_with_merged(&step_key, merged);
        applied += 1;
    }

    applied
}
