#![allow(dead_code)]

pub mod strategies;

use fanout_core::{
    ordered_outputs, Response, StepContext, StepError, StepFunction, StepInput, StepResult,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Long enough that a test only finishes quickly if the step was cancelled
pub const LONG_WAIT: Duration = Duration::from_secs(10);

pub fn ok(value: Value) -> StepResult<Value> {
    Ok(value)
}

pub fn fail(message: &str) -> StepResult<Value> {
    Err(StepError::failed(message))
}

/// Returns its input as a plain value
pub async fn echo(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
    ok(input.into_value())
}

/// Always fails
pub async fn always_fail(_ctx: StepContext, _input: StepInput) -> StepResult<Value> {
    fail("step failed on purpose")
}

/// Waits for the context, returning its error once cancelled or timed out
pub async fn wait_for_context(ctx: StepContext, _input: StepInput) -> StepResult<Value> {
    ctx.sleep(LONG_WAIT).await?;
    ok(json!("finished"))
}

/// Fails for any chunk containing the item "three"
pub async fn reject_three(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
    let items = input.as_batch().unwrap_or_default();
    if items.iter().any(|item| *item == "three") {
        return fail("bad item three");
    }
    ok(Value::Array(items.to_vec()))
}

/// Concatenates the chunk outputs in order, propagating the first failure
pub async fn concat_chunks(
    _ctx: StepContext,
    _step_key: String,
    chunks: Vec<Option<Response>>,
) -> StepResult<Value> {
    let mut merged = Vec::new();
    for output in ordered_outputs(&chunks)? {
        match output {
            Value::Array(items) => merged.extend(items),
            other => merged.push(other),
        }
    }
    ok(Value::Array(merged))
}

/// Reports, per chunk slot, whether a successful response was recorded
pub async fn chunk_report(
    _ctx: StepContext,
    _step_key: String,
    chunks: Vec<Option<Response>>,
) -> StepResult<Value> {
    let report: Vec<Value> = chunks
        .iter()
        .map(|slot| match slot {
            Some(response) if response.is_success() => json!("ok"),
            Some(response) => json!(response
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()),
            None => Value::Null,
        })
        .collect();
    ok(Value::Array(report))
}

/// Tracks how many steps run at once
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub async fn enter(&self, hold: Duration) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A step that holds a probe slot for `hold`
pub fn probe_step(probe: ConcurrencyProbe, hold: Duration) -> impl StepFunction {
    move |_ctx: StepContext, _input: StepInput| {
        let probe = probe.clone();
        async move {
            probe.enter(hold).await;
            ok(Value::Null)
        }
    }
}

/// A step counting its invocations and returning whether it got no input
pub fn counting_step(calls: Arc<AtomicUsize>) -> impl StepFunction {
    move |_ctx: StepContext, input: StepInput| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            ok(json!(input.is_none()))
        }
    }
}

/// Sorted keys of a results map
pub fn sorted_keys<V>(results: &std::collections::HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = results.keys().cloned().collect();
    keys.sort();
    keys
}
