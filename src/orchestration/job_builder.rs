//! # Job Builder
//!
//! Expands a registry snapshot into the flat list of jobs for one run. Per
//! step key, in order of precedence:
//!
//! 1. batch items: one job per chunk (`key#batch_<n>`), or a single
//!    `key#batch_all` job when chunking is disabled
//! 2. a single input: one job under the plain key
//! 3. nothing bound: one job under the plain key with [`StepInput::None`]
//!
//! Steps are visited in lexical key order; chunks follow item order.

use std::sync::Arc;
use tracing::debug;

use crate::constants::{batch_all_process_key, batch_process_key};
use crate::orchestration::registry::StepRegistry;
use crate::orchestration::types::{Job, StepInput};

/// Build every job for `registry`
pub(crate) fn build_jobs(registry: &StepRegistry) -> Vec<Job> {
    let chunk_size = registry.options().batch_chunk_size();
    let mut jobs = Vec::with_capacity(registry.step_count());

    for step_key in registry.step_keys() {
        let Some(step) = registry.step(step_key) else {
            continue;
        };

        if let Some(items) = registry.batch_items(step_key) {
            match chunk_size {
                Some(size) => {
                    for (index, chunk) in items.chunks(size).enumerate() {
                        jobs.push(Job {
                            process_key: batch_process_key(step_key, index + 1),
                            step_key: step_key.to_string(),
                            input: StepInput::Batch(chunk.to_vec()),
                            step: Arc::clone(step),
                        });
                    }
                }
                None => jobs.push(Job {
                    process_key: batch_all_process_key(step_key),
                    step_key: step_key.to_string(),
                    input: StepInput::Batch(items.to_vec()),
                    step: Arc::clone(step),
                }),
            }
            continue;
        }

        let input = registry
            .input(step_key)
            .cloned()
            .map(StepInput::Single)
            .unwrap_or_default();
        jobs.push(Job {
            process_key: step_key.to_string(),
            step_key: step_key.to_string(),
            input,
            step: Arc::clone(step),
        });
    }

    debug!(
        job_count = jobs.len(),
        step_count = registry.step_count(),
        chunk_size = ?chunk_size,
        "Built jobs"
    );
    jobs
}
