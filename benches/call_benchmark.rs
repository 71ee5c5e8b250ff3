/*!
 * Call Benchmarks
 * Round-trip cost of worker calls through the channel
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use subworker::protocol::Value;
use subworker::{Callable, Session, Worker, WorkerConfig};

fn started_worker() -> Worker {
    let worker = Worker::builder()
        .with_config(
            WorkerConfig::default()
                .with_buffer_size(4 * 1024 * 1024)
                .with_return_offset(3 * 1024 * 1024),
        )
        .build();
    worker.start().expect("worker start");
    worker
}

fn bench_builtin_call(c: &mut Criterion) {
    let worker = started_worker();
    let len = Callable::builtin("len");
    let mut group = c.benchmark_group("builtin_len");

    for size in [1usize, 100, 10_000] {
        let list = Value::from(vec![Value::from(1); size]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &list, |b, list| {
            b.iter(|| worker.run(&len, black_box(std::slice::from_ref(list))).unwrap());
        });
    }
    group.finish();
}

fn bench_session_function(c: &mut Criterion) {
    let session = Session::new();
    session
        .eval("def poly(x):\n    return 3 * x * x + 2 * x + 1")
        .expect("define poly");
    let poly = session.callable("poly").expect("poly callable");
    let worker = started_worker();
    // First call replicates; measure the cached path
    worker.run(&poly, &[Value::from(1)]).unwrap();

    c.bench_function("session_poly", |b| {
        b.iter(|| worker.run(&poly, black_box(&[Value::from(7)])).unwrap());
    });
}

fn bench_local_baseline(c: &mut Criterion) {
    let len = Callable::builtin("len");
    let list = [Value::from(vec![1, 2, 3])];
    c.bench_function("local_len", |b| {
        b.iter(|| len.call_local(black_box(&list), &Default::default()).unwrap());
    });
}

criterion_group!(
    benches,
    bench_builtin_call,
    bench_session_function,
    bench_local_baseline
);
criterion_main!(benches);
