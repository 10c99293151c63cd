//! # Step Handlers
//!
//! The two user-supplied seams of the runner:
//!
//! - [`StepFunction`]: the unit of work behind a step key. Receives the job's
//!   [`StepContext`] and [`StepInput`], returns an output value or a failure.
//! - [`BatchCollector`]: merges a batch step's per-chunk responses into one
//!   result stored under the plain step key.
//!
//! Both are implemented for plain async closures, so most callers never name
//! the traits:
//!
//! ```rust
//! use fanout_core::{StepContext, StepInput, StepResult, StepRunner};
//! use serde_json::{json, Value};
//!
//! async fn greet(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
//!     let name = input.as_single().and_then(Value::as_str).unwrap_or("nobody");
//!     Ok(json!(format!("Hello {name}")))
//! }
//!
//! let runner = StepRunner::new();
//! runner.add_step("greet", greet);
//! runner.add_input("greet", "Andree");
//! ```

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::error::StepResult;
use crate::orchestration::context::StepContext;
use crate::orchestration::types::{Response, StepInput};

/// Work executed for every job derived from a step
#[async_trait]
pub trait StepFunction: Send + Sync {
    async fn call(&self, ctx: StepContext, input: StepInput) -> StepResult<Value>;
}

#[async_trait]
impl<F, Fut> StepFunction for F
where
    F: Fn(StepContext, StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult<Value>> + Send + 'static,
{
    async fn call(&self, ctx: StepContext, input: StepInput) -> StepResult<Value> {
        (self)(ctx, input).await
    }
}

/// Merges the ordered chunk responses of a batch step.
///
/// `chunks[i]` holds the response of chunk `i + 1`, or `None` if that chunk
/// produced no response. The list is empty when no chunk ran.
#[async_trait]
pub trait BatchCollector: Send + Sync {
    async fn collect(
        &self,
        ctx: StepContext,
        step_key: String,
        chunks: Vec<Option<Response>>,
    ) -> StepResult<Value>;
}

#[async_trait]
impl<F, Fut> BatchCollector for F
where
    F: Fn(StepContext, String, Vec<Option<Response>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult<Value>> + Send + 'static,
{
    async fn collect(
        &self,
        ctx: StepContext,
        step_key: String,
        chunks: Vec<Option<Response>>,
    ) -> StepResult<Value> {
        (self)(ctx, step_key, chunks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::orchestration::types::ordered_outputs;
    use serde_json::json;

    struct Doubler;

    #[async_trait]
    impl StepFunction for Doubler {
        async fn call(&self, _ctx: StepContext, input: StepInput) -> StepResult<Value> {
            let n = input
                .as_single()
                .and_then(Value::as_i64)
                .ok_or_else(|| StepError::failed("expected an integer"))?;
            Ok(json!(n * 2))
        }
    }

    async fn echo(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
        Ok(input.into_value())
    }

    async fn join_all(
        _ctx: StepContext,
        _step_key: String,
        chunks: Vec<Option<Response>>,
    ) -> StepResult<Value> {
        Ok(Value::Array(ordered_outputs(&chunks)?))
    }

    #[tokio::test]
    async fn test_struct_step_function() {
        let out = Doubler
            .call(StepContext::background(), StepInput::Single(json!(21)))
            .await;
        assert_eq!(out, Ok(json!(42)));

        let err = Doubler
            .call(StepContext::background(), StepInput::None)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_fn_step_function() {
        let step: &dyn StepFunction = &echo;
        let out = step
            .call(StepContext::background(), StepInput::Batch(vec![json!(1)]))
            .await;
        assert_eq!(out, Ok(json!([1])));
    }

    #[tokio::test]
    async fn test_fn_collector() {
        let collector: &dyn BatchCollector = &join_all;
        let merged = collector
            .collect(
                StepContext::background(),
                "batch".to_string(),
                vec![
                    Some(Response::success(json!("a"))),
                    Some(Response::success(json!("b"))),
                ],
            )
            .await;
        assert_eq!(merged, Ok(json!(["a", "b"])));
    }
}
