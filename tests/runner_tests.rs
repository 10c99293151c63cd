mod common;

use common::*;
use fanout_core::{RunOption, StepContext, StepInput, StepRunner};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_limit_bounds_running_jobs() {
    let probe = ConcurrencyProbe::default();
    let runner = StepRunner::with_options(&[RunOption::worker(3)]).unwrap();
    for i in 0..12 {
        runner.add_step(
            &format!("job_{i:02}"),
            probe_step(probe.clone(), Duration::from_millis(30)),
        );
    }

    let results = runner.run(&CancellationToken::new()).await;

    assert_eq!(results.len(), 12);
    assert_eq!(probe.calls(), 12);
    assert!(probe.peak() <= 3, "peak concurrency was {}", probe.peak());
    assert!(runner.is_process_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_runs_jobs_one_at_a_time() {
    let probe = ConcurrencyProbe::default();
    let runner = StepRunner::with_options(&[RunOption::worker(1)]).unwrap();
    for i in 0..5 {
        runner.add_step(
            &format!("job_{i}"),
            probe_step(probe.clone(), Duration::from_millis(5)),
        );
    }

    runner.run(&CancellationToken::new()).await;

    assert_eq!(probe.calls(), 5);
    assert_eq!(probe.peak(), 1);
}

#[tokio::test]
async fn test_step_without_input_runs_once_with_absent_input() {
    let calls = Arc::new(AtomicUsize::new(0));
    let runner = StepRunner::new();
    runner.add_step("tick", counting_step(Arc::clone(&calls)));

    let results = runner.run(&CancellationToken::new()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results["tick"].output, json!(true));
    assert!(results["tick"].executed);
    assert_eq!(runner.success_processes(), vec!["tick"]);
}

#[tokio::test]
async fn test_single_input_is_passed_through() {
    let runner = StepRunner::new();
    runner.add_step("greet", echo);
    runner.add_input("greet", "Andree");
    runner.add_step("config", echo);
    runner.add_input("config", json!({"retries": 3}));

    let results = runner.run(&CancellationToken::new()).await;

    assert_eq!(results["greet"].output, json!("Andree"));
    assert_eq!(results["config"].output, json!({"retries": 3}));
    assert_eq!(sorted_keys(&results), vec!["config", "greet"]);
}

#[tokio::test]
async fn test_failure_does_not_stop_siblings_without_block_error() {
    let runner = StepRunner::new();
    runner.add_step("a_fail", always_fail);
    runner.add_step("b_ok", echo);
    runner.add_input("b_ok", 1);
    runner.add_step("c_ok", echo);
    runner.add_input("c_ok", 2);

    let results = runner.run(&CancellationToken::new()).await;

    assert!(!runner.is_process_success());
    assert_eq!(runner.failed_processes(), vec!["a_fail"]);
    let mut success = runner.success_processes();
    success.sort();
    assert_eq!(success, vec!["b_ok", "c_ok"]);
    assert_eq!(results["b_ok"].output, json!(1));
    assert_eq!(results["c_ok"].output, json!(2));
    assert_eq!(
        results["a_fail"].error.as_ref().unwrap().to_string(),
        "step failed on purpose"
    );
}

#[tokio::test]
async fn test_success_and_failure_lists_are_disjoint() {
    let runner = StepRunner::with_options(&[
        RunOption::worker(1),
        RunOption::block_error(true),
        RunOption::batch_process(1),
    ])
    .unwrap();
    runner.add_step("a_ok", echo);
    runner.add_step("b_fail", always_fail);
    runner.add_step("c_never", echo);
    runner.add_batch_input("c_never", json!([1, 2, 3]));

    let results = runner.run(&CancellationToken::new()).await;

    let success: HashSet<String> = runner.success_processes().into_iter().collect();
    let failed: HashSet<String> = runner.failed_processes().into_iter().collect();
    assert!(success.is_disjoint(&failed));

    let executed: HashSet<String> = results
        .iter()
        .filter(|(_, response)| response.executed)
        .map(|(key, _)| key.clone())
        .collect();
    let accounted: HashSet<String> = success.union(&failed).cloned().collect();
    assert_eq!(executed, accounted);

    for (key, response) in &results {
        if !response.executed {
            assert!(!success.contains(key) && !failed.contains(key));
        }
    }
    assert!(results.values().any(|response| !response.executed));
}

#[tokio::test]
async fn test_rerun_resets_run_state() {
    let should_fail = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&should_fail);
    let runner = StepRunner::new();
    runner.add_step("flaky", move |_ctx: StepContext, _input: StepInput| {
        let fail_now = flag.load(Ordering::SeqCst);
        async move {
            if fail_now {
                fail("transient")
            } else {
                ok(json!("recovered"))
            }
        }
    });

    runner.run(&CancellationToken::new()).await;
    assert!(!runner.is_process_success());
    assert_eq!(runner.failed_processes(), vec!["flaky"]);

    should_fail.store(false, Ordering::SeqCst);
    let results = runner.run(&CancellationToken::new()).await;

    assert!(runner.is_process_success());
    assert!(runner.failed_processes().is_empty());
    assert_eq!(runner.success_processes(), vec!["flaky"]);
    assert_eq!(results["flaky"].output, json!("recovered"));
}

#[tokio::test]
async fn test_registration_during_run_only_affects_later_runs() {
    let runner = StepRunner::new();
    let handle = runner.clone();
    runner.add_step("register_late", move |_ctx: StepContext, _input: StepInput| {
        handle.add_step("late", echo);
        async move { ok(json!("registered")) }
    });

    let first = runner.run(&CancellationToken::new()).await;
    assert_eq!(sorted_keys(&first), vec!["register_late"]);
    assert_eq!(runner.planned_process_keys(), vec!["late", "register_late"]);

    let second = runner.run(&CancellationToken::new()).await;
    assert_eq!(sorted_keys(&second), vec!["late", "register_late"]);
}

#[tokio::test]
async fn test_empty_runner_returns_empty_results() {
    let runner = StepRunner::new();
    let results = runner.run(&CancellationToken::new()).await;

    assert!(results.is_empty());
    assert!(runner.is_process_success());
    let stats = runner.last_run_stats().unwrap();
    assert_eq!(stats.total_jobs, 0);
}

#[tokio::test]
async fn test_last_run_stats_summarize_run() {
    let runner = StepRunner::with_options(&[RunOption::batch_process(2)]).unwrap();
    runner.add_step("ok", echo);
    runner.add_step("bad", always_fail);
    runner.add_step("batch", echo);
    runner.add_batch_input("batch", json!([1, 2, 3]));

    assert!(runner.last_run_stats().is_none());
    runner.run(&CancellationToken::new()).await;

    let stats = runner.last_run_stats().unwrap();
    assert_eq!(stats.total_jobs, 4);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.collectors_applied, 0);
}

#[tokio::test]
async fn test_empty_step_key_is_ignored() {
    let runner = StepRunner::new();
    runner.add_step("", echo);
    runner.add_input("", 1);

    assert!(runner.planned_process_keys().is_empty());
    assert!(runner.run(&CancellationToken::new()).await.is_empty());
}
