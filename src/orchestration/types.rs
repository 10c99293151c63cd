//! # Orchestration Types
//!
//! Data shared by the job builder, the executor and the result processor:
//! job inputs, per-job responses, the internal [`Job`] unit and run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{StepError, StepResult};
use crate::orchestration::step_handler::StepFunction;

/// Input handed to a step function for one job
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepInput {
    /// The step had no bound input
    #[default]
    None,
    /// The step's single bound input
    Single(Value),
    /// One chunk of a batch step, items in input order
    Batch(Vec<Value>),
}

impl StepInput {
    pub fn is_none(&self) -> bool {
        matches!(self, StepInput::None)
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            StepInput::Single(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_batch(&self) -> Option<&[Value]> {
        match self {
            StepInput::Batch(items) => Some(items),
            _ => None,
        }
    }

    /// Collapse into a plain value: `None` becomes `Null`, a batch an array
    pub fn into_value(self) -> Value {
        match self {
            StepInput::None => Value::Null,
            StepInput::Single(value) => value,
            StepInput::Batch(items) => Value::Array(items),
        }
    }
}

/// Outcome of one job, or of a collector merge
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub output: Value,
    pub error: Option<StepError>,
    /// False when the job was skipped without running
    pub executed: bool,
}

impl Response {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
            executed: true,
        }
    }

    pub fn failure(error: StepError) -> Self {
        Self {
            output: Value::Null,
            error: Some(error),
            executed: true,
        }
    }

    /// Response for a job skipped because the run was already cancelled
    pub fn not_executed(process_key: &str) -> Self {
        Self {
            output: Value::Null,
            error: Some(StepError::NotExecuted {
                process_key: process_key.to_string(),
            }),
            executed: false,
        }
    }

    pub fn from_result(result: StepResult<Value>) -> Self {
        match result {
            Ok(output) => Self::success(output),
            Err(error) => Self::failure(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.executed && self.error.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.executed && self.error.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        !self.executed
    }
}

/// Outputs of a batch step's chunks in ordinal order.
///
/// Returns the first chunk failure as-is, or a failure naming the ordinal of
/// the first chunk with no recorded response.
pub fn ordered_outputs(chunks: &[Option<Response>]) -> StepResult<Vec<Value>> {
    let mut outputs = Vec::with_capacity(chunks.len());
    for (index, slot) in chunks.iter().enumerate() {
        let Some(response) = slot else {
            return Err(StepError::Failed(format!(
                "missing response for chunk {}",
                index + 1
            )));
        };
        if let Some(error) = &response.error {
            return Err(error.clone());
        }
        outputs.push(response.output.clone());
    }
    Ok(outputs)
}

/// One schedulable execution instance of a step
#[derive(Clone)]
pub(crate) struct Job {
    pub process_key: String,
    pub step_key: String,
    pub input: StepInput,
    pub step: Arc<dyn StepFunction>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("process_key", &self.process_key)
            .field("step_key", &self.step_key)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Summary of the most recent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total_jobs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub collectors_applied: usize,
    pub elapsed: Duration,
}
