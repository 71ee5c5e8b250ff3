/*!
 * Worker Tests
 * Start/close, synchronous and threaded calls over the channel
 */

use pretty_assertions::assert_eq;
use std::time::Duration;
use subworker::isolate::runtime::is_attached;
use subworker::protocol::Value;
use subworker::script::ErrorKind;
use subworker::{Callable, Kwargs, Worker, WorkerConfig, WorkerError, WorkerState};

fn small_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_buffer_size(256 * 1024)
        .with_return_offset(192 * 1024)
}

fn small_worker() -> Worker {
    let worker = Worker::builder().with_config(small_config()).build();
    worker.start().unwrap();
    worker
}

#[test]
fn test_len_of_list() {
    let worker = Worker::started().unwrap();
    let n = worker
        .run(&Callable::builtin("len"), &[Value::from(vec![1, 2, 3])])
        .unwrap();
    assert_eq!(n, Value::from(3));
    worker.close().unwrap();
}

#[test]
fn test_keyword_arguments() {
    let worker = small_worker();
    let mut kwargs = Kwargs::new();
    kwargs.insert("reverse".into(), Value::from(true));
    let sorted = worker
        .run_with(
            &Callable::builtin("sorted"),
            &[Value::from(vec![2, 3, 1])],
            &kwargs,
        )
        .unwrap();
    assert_eq!(sorted, Value::from(vec![3, 2, 1]));
}

#[test]
fn test_backing_dir_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let worker = Worker::builder()
        .with_config(small_config().with_backing_dir(dir.path()))
        .build();
    worker.start().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    let out = worker
        .run(&Callable::qualified("math", "sqrt"), &[Value::from(16.0)])
        .unwrap();
    assert_eq!(out, Value::from(4.0));

    worker.close().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_threaded_slow_call() {
    let worker = small_worker();
    worker
        .run_in_thread(&Callable::qualified("time", "sleep"), &[Value::from(0.3)])
        .unwrap();

    // Returns at once while the call sleeps
    assert!(!worker.done());
    assert_eq!(worker.state(), WorkerState::CallInFlight);
    assert!(matches!(worker.result(), Err(WorkerError::InvalidState(_))));

    let mut polls = 0;
    while !worker.done() {
        polls += 1;
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(polls > 0);
    assert_eq!(worker.result().unwrap(), Value::None);
    assert_eq!(worker.state(), WorkerState::Done);

    // The worker takes further calls
    let n = worker
        .run(&Callable::builtin("len"), &[Value::from("abcd")])
        .unwrap();
    assert_eq!(n, Value::from(4));
}

#[test]
fn test_payload_too_large_leaves_channel_alone() {
    let worker = small_worker();
    worker
        .run(&Callable::builtin("len"), &[Value::from("seed")])
        .unwrap();

    let huge = Value::from("x".repeat(200 * 1024));
    let err = worker
        .run(&Callable::builtin("len"), &[huge])
        .unwrap_err();
    match err {
        WorkerError::PayloadTooLarge { size, capacity } => {
            assert_eq!(capacity, 192 * 1024);
            assert!(size >= capacity);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Previous result still readable: flag untouched
    assert!(worker.done());
    assert_eq!(worker.result().unwrap(), Value::from(4));
}

#[test]
fn test_sequential_calls_do_not_mix() {
    let worker = small_worker();
    let long = "abcdefghij".repeat(100);
    let upper = worker
        .run(&Callable::qualified("text", "upper"), &[Value::from(long.as_str())])
        .unwrap();
    assert_eq!(upper, Value::from(long.to_uppercase()));

    let short = worker
        .run(&Callable::qualified("text", "upper"), &[Value::from("ok")])
        .unwrap();
    assert_eq!(short, Value::from("OK"));
}

#[test]
fn test_remote_error_kind() {
    let worker = small_worker();
    let err = worker
        .run(&Callable::qualified("math", "sqrt"), &[Value::from(-1.0)])
        .unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Remote {
            kind: ErrorKind::ValueError,
            ..
        }
    ));
    // The worker survives a raised error
    assert_eq!(
        worker
            .run(&Callable::qualified("math", "sqrt"), &[Value::from(9.0)])
            .unwrap(),
        Value::from(3.0)
    );
}

#[test]
fn test_missing_callable_is_trigger_failure() {
    let worker = small_worker();
    let err = worker
        .run(&Callable::qualified("math", "nope"), &[])
        .unwrap_err();
    assert!(matches!(err, WorkerError::RemoteExecution { .. }));
    assert!(worker.done());
    assert!(matches!(
        worker.result(),
        Err(WorkerError::RemoteExecution { .. })
    ));
}

#[test]
fn test_isolate_unsafe_module_refused() {
    let worker = small_worker();
    let err = worker
        .run(&Callable::qualified("terminal", "width"), &[])
        .unwrap_err();
    assert!(matches!(err, WorkerError::RemoteExecution { .. }));
}

#[test]
fn test_close_with_call_in_flight() {
    let worker = small_worker();
    worker
        .run_in_thread(&Callable::qualified("time", "sleep"), &[Value::from(0.3)])
        .unwrap();
    assert!(matches!(
        worker.close(),
        Err(WorkerError::ContextRunning(_))
    ));

    worker.wait(Duration::from_millis(5)).unwrap();
    worker.close().unwrap();
    assert_eq!(worker.state(), WorkerState::Closed);
    assert!(!worker.done());
}

#[test]
fn test_channel_detached_on_close() {
    let worker = small_worker();
    let id = worker.id().unwrap();
    assert!(is_attached(id));

    worker.close().unwrap();
    assert!(!is_attached(id));
    assert_eq!(worker.id(), None);
}

#[test]
fn test_double_close() {
    let worker = small_worker();
    worker.close().unwrap();
    worker.close().unwrap();
    assert!(matches!(
        worker.run(&Callable::builtin("len"), &[Value::from("a")]),
        Err(WorkerError::Closed(_))
    ));
}

#[test]
fn test_drop_waits_for_threaded_call() {
    let worker = small_worker();
    worker
        .run_in_thread(&Callable::qualified("time", "sleep"), &[Value::from(0.1)])
        .unwrap();
    drop(worker);
}

#[test]
fn test_run_string() {
    let worker = small_worker();
    worker.run_string("import math\nx = math.floor(2.7)").unwrap();
    let err = worker.run_string("undefined_name").unwrap_err();
    assert!(matches!(err, WorkerError::Isolate(_)));
}
