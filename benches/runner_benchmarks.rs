use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fanout_core::{
    ordered_outputs, Response, RunOption, StepContext, StepInput, StepResult, StepRunner,
};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

async fn echo(_ctx: StepContext, input: StepInput) -> StepResult<Value> {
    Ok(input.into_value())
}

async fn concat(
    _ctx: StepContext,
    _step_key: String,
    chunks: Vec<Option<Response>>,
) -> StepResult<Value> {
    Ok(Value::Array(ordered_outputs(&chunks)?))
}

fn benchmark_independent_steps(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("independent_steps");

    for steps in [10usize, 100, 1_000] {
        let runner = StepRunner::with_options(&[RunOption::worker(8)]).unwrap();
        for i in 0..steps {
            let key = format!("step_{i}");
            runner.add_step(&key, echo);
            runner.add_input(&key, i as u64);
        }

        group.bench_with_input(BenchmarkId::from_parameter(steps), &runner, |b, runner| {
            b.iter(|| runtime.block_on(runner.run(black_box(&CancellationToken::new()))))
        });
    }
    group.finish();
}

fn benchmark_chunked_batch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunked_batch");
    let items: Vec<Value> = (0..10_000).map(|i| json!(i)).collect();

    for chunk_size in [10i64, 100, 1_000] {
        let runner = StepRunner::with_options(&[
            RunOption::worker(8),
            RunOption::batch_process(chunk_size),
        ])
        .unwrap();
        runner.add_step("batch", echo);
        runner.add_batch_input("batch", Value::Array(items.clone()));
        runner.add_collector("batch", concat);

        group.bench_with_input(
            BenchmarkId::from_parameter(chunk_size),
            &runner,
            |b, runner| b.iter(|| runtime.block_on(runner.run(black_box(&CancellationToken::new())))),
        );
    }
    group.finish();
}

fn benchmark_job_planning(c: &mut Criterion) {
    let runner = StepRunner::with_options(&[RunOption::batch_process(50)]).unwrap();
    runner.add_step("batch", echo);
    runner.add_batch_input("batch", Value::Array((0..5_000).map(|i| json!(i)).collect()));

    c.bench_function("job_planning", |b| b.iter(|| runner.planned_process_keys()));
}

criterion_group!(
    benches,
    benchmark_independent_steps,
    benchmark_chunked_batch,
    benchmark_job_planning
);
criterion_main!(benches);
