//! # Step Registry
//!
//! Named steps, their input bindings, batch collectors and the active run
//! options. The registry itself is plain data; [`StepRunner`](crate::StepRunner)
//! keeps it behind its mutex and hands the executor a cloned snapshot at the
//! start of every run, so registrations made while a run is in flight only
//! affect later runs.
//!
//! Registration calls with an empty key (and batch inputs that are `null`) are
//! ignored with a warning rather than rejected.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ConfigResult, RunOption, RunOptions};
use crate::orchestration::step_handler::{BatchCollector, StepFunction};

/// Step, input, collector and option state for one runner
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn StepFunction>>,
    inputs: HashMap<String, Value>,
    batch_inputs: HashMap<String, Vec<Value>>,
    collectors: HashMap<String, Arc<dyn BatchCollector>>,
    options: RunOptions,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry starting from `options` instead of the defaults
    pub fn with_options(options: RunOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Register `step` under `key`, replacing any previous registration
    pub fn add_step(&mut self, key: &str, step: Arc<dyn StepFunction>) {
        if key.is_empty() {
            warn!("Ignoring step registration with an empty key");
            return;
        }
        if self.steps.insert(key.to_string(), step).is_some() {
            debug!(step_key = key, "Step already registered, replacing");
        } else {
            debug!(step_key = key, "Registered step");
        }
    }

    /// Bind a single input to `key`, replacing any previous one
    pub fn add_input(&mut self, key: &str, value: Value) {
        if key.is_empty() {
            warn!("Ignoring input with an empty step key");
            return;
        }
        self.inputs.insert(key.to_string(), value);
    }

    /// Append batch items for `key`.
    ///
    /// An array contributes each of its elements in order; any other value is
    /// appended as one item. `null` is treated as no value.
    pub fn add_batch_input(&mut self, key: &str, value: Value) {
        if key.is_empty() {
            warn!("Ignoring batch input with an empty step key");
            return;
        }
        let items = self.batch_inputs.entry(key.to_string()).or_default();
        match value {
            Value::Null => {
                debug!(step_key = key, "Ignoring null batch input");
            }
            Value::Array(values) => items.extend(values),
            other => items.push(other),
        }
    }

    /// Register the merge function for batch step `key`
    pub fn add_collector(&mut self, key: &str, collector: Arc<dyn BatchCollector>) {
        if key.is_empty() {
            warn!("Ignoring collector registration with an empty key");
            return;
        }
        self.collectors.insert(key.to_string(), collector);
    }

    /// Validate and apply options; nothing changes if any entry is invalid
    pub fn add_options(&mut self, options: &[RunOption]) -> ConfigResult<()> {
        self.options.apply(options)?;
        debug!(options = ?self.options, "Applied run options");
        Ok(())
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn step(&self, key: &str) -> Option<&Arc<dyn StepFunction>> {
        self.steps.get(key)
    }

    /// Registered step keys in lexical order
    pub fn step_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// Batch items for `key`; `None` when the step has no (non-empty) batch
    pub fn batch_items(&self, key: &str) -> Option<&[Value]> {
        self.batch_inputs
            .get(key)
            .filter(|items| !items.is_empty())
            .map(Vec::as_slice)
    }

    /// Registered collectors in lexical key order
    pub fn collectors(&self) -> Vec<(String, Arc<dyn BatchCollector>)> {
        let mut collectors: Vec<_> = self
            .collectors
            .iter()
            .map(|(key, collector)| (key.clone(), Arc::clone(collector)))
            .collect();
        collectors.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        collectors
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.len()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.step_keys())
            .field("inputs", &self.inputs)
            .field("batch_inputs", &self.batch_inputs)
            .field("collectors", &self.collectors.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}
