/*!
 * Fidelity Tests
 * Worker results match local evaluation of the same callable
 */

use parking_lot::{Mutex, MutexGuard};
use proptest::prelude::*;
use std::sync::OnceLock;
use subworker::protocol::Value;
use subworker::{Callable, Kwargs, Session, Worker, WorkerConfig, WorkerError};

/// One shared worker; test threads take turns
fn worker() -> MutexGuard<'static, Worker> {
    static WORKER: OnceLock<Mutex<Worker>> = OnceLock::new();
    WORKER
        .get_or_init(|| {
            let worker = Worker::builder()
                .with_config(
                    WorkerConfig::default()
                        .with_buffer_size(1024 * 1024)
                        .with_return_offset(768 * 1024),
                )
                .build();
            worker.start().unwrap();
            Mutex::new(worker)
        })
        .lock()
}

fn session() -> &'static Session {
    static SESSION: OnceLock<Session> = OnceLock::new();
    SESSION.get_or_init(|| {
        let session = Session::new();
        session
            .eval(
                "def mix(a, b, s):\n    return [a + b, a * b, s + s, len(s) > a]\n\
                 def safe_div(a, b):\n    return a // b if b != 0 else None",
            )
            .unwrap();
        session
    })
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        (-1e6f64..1e6).prop_map(Value::from),
        "[a-z0-9 ]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Value::from)
    })
}

/// Both sides agree, including on which error kind is raised
fn assert_same(callable: &Callable, args: &[Value]) {
    let local = callable.call_local(args, &Kwargs::new());
    let remote = worker().run(callable, args);
    match (local, remote) {
        (Ok(l), Ok(r)) => assert_eq!(l, r),
        (Err(l), Err(WorkerError::Remote { kind, .. })) => assert_eq!(l.kind, kind),
        (l, r) => panic!("local {l:?} differs from remote {r:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_repr_round_trips(value in value_strategy()) {
        assert_same(&Callable::builtin("repr"), &[value]);
    }

    #[test]
    fn prop_len_of_lists(items in prop::collection::vec(any::<i64>(), 0..64)) {
        let list = Value::from(items.clone());
        let n = worker().run(&Callable::builtin("len"), &[list]).unwrap();
        prop_assert_eq!(n, Value::from(items.len() as i64));
    }

    #[test]
    fn prop_session_function(a in -1000i32..1000, b in -1000i32..1000, s in "[a-z]{0,8}") {
        let mix = session().callable("mix").unwrap();
        assert_same(&mix, &[Value::from(a), Value::from(b), Value::from(s)]);
    }

    #[test]
    fn prop_floor_division(a in any::<i32>(), b in -5i32..5) {
        let div = session().callable("safe_div").unwrap();
        assert_same(&div, &[Value::from(a), Value::from(b)]);
    }

    #[test]
    fn prop_sorted(items in prop::collection::vec(any::<i32>(), 0..32)) {
        assert_same(&Callable::builtin("sorted"), &[Value::from(items)]);
    }
}
