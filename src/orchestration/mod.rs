//! # Orchestration Engine
//!
//! The parallel step runner, layered as:
//!
//! - **registry**: named steps, inputs, collectors and run options
//! - **job_builder**: expands a registry snapshot into jobs, chunking batches
//! - **step_executor**: bounded-concurrency execution with fail-fast
//!   cancellation, panic containment and per-job deadlines
//! - **result_processor**: results map, success/failure lists, chunk tables
//! - **batch_collector**: merges chunk responses after the run barrier
//! - **core**: [`StepRunner`], the public entry point tying them together

pub mod batch_collector;
pub mod context;
pub mod core;
pub mod job_builder;
pub mod registry;
pub mod result_processor;
pub mod step_executor;
pub mod step_handler;
pub mod types;

pub use context::StepContext;
pub use core::StepRunner;
pub use registry::StepRegistry;
pub use step_handler::{BatchCollector, StepFunction};
pub use types::{ordered_outputs, Response, RunStats, StepInput};
