//! # Result Processor
//!
//! Per-run aggregation of job responses: the results map, the success and
//! failure lists and, for batch steps, the ordinal-indexed chunk table used by
//! collectors. A [`RunState`] is reset at the start of every run and only ever
//! mutated under the runner's mutex.

use std::collections::HashMap;

use crate::constants::parse_batch_process_key;
use crate::orchestration::types::Response;

/// Aggregated outcome of the current (or most recent) run
#[derive(Debug, Clone, Default)]
pub(crate) struct RunState {
    results: HashMap<String, Response>,
    success: Vec<String>,
    failed: Vec<String>,
    chunks: HashMap<String, Vec<Option<Response>>>,
    skipped: usize,
}

impl RunState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Store `response` under `process_key`.
    ///
    /// Recording the same key twice replaces the earlier response and its
    /// list membership. Chunk keys are also placed in the owning step's chunk
    /// table at `ordinal - 1`.
    pub fn record_response(&mut self, process_key: &str, response: Response) {
        if let Some(previous) = self.results.get(process_key) {
            if previous.is_skipped() {
                self.skipped -= 1;
            }
            self.success.retain(|key| key != process_key);
            self.failed.retain(|key| key != process_key);
        }

        if response.is_success() {
            self.success.push(process_key.to_string());
        } else if response.is_failure() {
            self.failed.push(process_key.to_string());
        } else {
            self.skipped += 1;
        }

        if let Some((step_key, ordinal)) = parse_batch_process_key(process_key) {
            let slots = self.chunks.entry(step_key.to_string()).or_default();
            if slots.len() < ordinal {
                slots.resize(ordinal, None);
            }
            slots[ordinal - 1] = Some(response.clone());
        }

        self.results.insert(process_key.to_string(), response);
    }

    /// Store a collector's merged response and drop the step's chunk entries.
    ///
    /// Only keys that parse to exactly `step_key` are dropped, so another
    /// step whose name starts with `<step_key>#batch_` keeps its entries.
    pub fn replace_with_merged(&mut self, step_key: &str, merged: Response) {
        let chunk_keys: Vec<String> = self
            .results
            .keys()
            .filter(|key| matches!(parse_batch_process_key(key), Some((step, _)) if step == step_key))
            .cloned()
            .collect();
        for key in &chunk_keys {
            self.results.remove(key);
        }

        self.results.insert(step_key.to_string(), merged);
    }

    /// Ordered chunk responses of `step_key`, empty if none were recorded
    pub fn chunk_responses(&self, step_key: &str) -> Vec<Option<Response>> {
        self.chunks.get(step_key).cloned().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_processes(&self) -> Vec<String> {
        self.failed.clone()
    }

    pub fn success_processes(&self) -> Vec<String> {
        self.success.clone()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn results(&self) -> HashMap<String, Response> {
        self.results.clone()
    }
}
