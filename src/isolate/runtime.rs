/*!
 * Receiving Routine
 * Intrinsics installed into every local context
 *
 * - `_attach(fd, size, ret)` maps the controller's channel
 * - `_call(offset)` decodes a request, runs it and publishes the outcome
 * - `_exit()` drops the mapping
 *
 * A failure inside `_call` before the callable runs (no channel, corrupt
 * request, unresolvable callable) fails the whole `run_code`, which the
 * controller reports as a trigger failure. Errors raised by the callable
 * itself are written back as a remote error marker.
 */

use crate::channel::SharedMapping;
use crate::core::types::ContextId;
use crate::modules::catalog;
use crate::protocol::{
    decode_request, encode_outcome, flag_for, CallableRef, Outcome, RemoteError, Value,
};
use crate::script::{
    call_with_values, Args, ErrorKind, Namespace, NativeFunction, Object, ScriptError,
    ScriptResult,
};
use ahash::RandomState;
use dashmap::DashMap;
use std::os::fd::BorrowedFd;
use std::sync::{Arc, LazyLock};
use tracing::{debug, trace};

/// Module name reported by the intrinsics
pub const RUNTIME_MODULE: &str = "_runtime";

/// A context's view of its channel
#[derive(Debug)]
struct Attachment {
    mapping: SharedMapping,
    return_offset: usize,
}

impl Attachment {
    fn outcome_capacity(&self) -> usize {
        self.mapping.len() - self.return_offset - 1
    }
}

static ATTACHMENTS: LazyLock<DashMap<ContextId, Arc<Attachment>, RandomState>> =
    LazyLock::new(|| DashMap::with_hasher(RandomState::new()));

/// Bind the intrinsics into a fresh context namespace
pub(crate) fn install(ns: &mut Namespace) {
    for (name, func) in [
        ("_attach", attach as fn(&Namespace, Args) -> ScriptResult<Value>),
        ("_call", call),
        ("_exit", exit),
    ] {
        ns.set(
            name,
            Object::Native(Arc::new(NativeFunction::new(RUNTIME_MODULE, name, func))),
        );
    }
}

/// Forget a destroyed context's mapping
pub(crate) fn detach(context: ContextId) {
    if ATTACHMENTS.remove(&context).is_some() {
        debug!(context, "channel detached");
    }
}

/// Whether `context` currently has a channel mapped
pub fn is_attached(context: ContextId) -> bool {
    ATTACHMENTS.contains_key(&context)
}

fn owning_context(ns: &Namespace) -> ScriptResult<ContextId> {
    ns.context()
        .ok_or_else(|| ScriptError::runtime("receiving routine used outside an execution context"))
}

fn non_negative(args: &Args, index: usize, what: &str) -> ScriptResult<usize> {
    let raw = args.int(index)?;
    usize::try_from(raw).map_err(|_| ScriptError::value(format!("{} must be non-negative", what)))
}

fn attach(ns: &Namespace, args: Args) -> ScriptResult<Value> {
    args.expect("_attach", 3)?;
    let context = owning_context(ns)?;
    let fd = i32::try_from(args.int(0)?)
        .ok()
        .filter(|fd| *fd >= 0)
        .ok_or_else(|| ScriptError::value("invalid file descriptor"))?;
    let size = non_negative(&args, 1, "size")?;
    let return_offset = non_negative(&args, 2, "return offset")?;
    if return_offset == 0 || return_offset >= size {
        return Err(ScriptError::value(format!(
            "return offset {} outside buffer of {} bytes",
            return_offset, size
        )));
    }

    // SAFETY: the controller keeps the descriptor open for the lifetime of
    // the worker; it is only borrowed for the duration of the mmap call.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mapping = SharedMapping::map_fd(borrowed, size)
        .map_err(|e| ScriptError::runtime(format!("cannot map channel: {}", e)))?;

    ATTACHMENTS.insert(
        context,
        Arc::new(Attachment {
            mapping,
            return_offset,
        }),
    );
    debug!(context, fd, size, return_offset, "channel attached");
    Ok(Value::None)
}

fn exit(ns: &Namespace, args: Args) -> ScriptResult<Value> {
    args.expect("_exit", 0)?;
    detach(owning_context(ns)?);
    Ok(Value::None)
}

fn resolve(ns: &Namespace, callable: &CallableRef) -> ScriptResult<Object> {
    let target = match callable {
        CallableRef::Qualified { module, name } => catalog()
            .import(module, ns.is_isolated())?
            .member(name)
            .ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::AttributeError,
                    format!("module '{}' has no attribute '{}'", module, name),
                )
            })?,
        CallableRef::Global { name } => ns
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::name(name))?,
    };
    match target {
        Object::Native(_) | Object::Function(_) => Ok(target),
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn call(ns: &Namespace, args: Args) -> ScriptResult<Value> {
    args.expect("_call", 1)?;
    let offset = non_negative(&args, 0, "offset")?;
    let context = owning_context(ns)?;
    // Clone the Arc so the table is not locked while user code runs
    let attachment = ATTACHMENTS
        .get(&context)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| ScriptError::runtime("no channel attached; call _attach first"))?;

    let ret = attachment.return_offset;
    if offset >= ret {
        return Err(ScriptError::value(format!(
            "request offset {} is inside the return region",
            offset
        )));
    }
    let cursor = attachment
        .mapping
        .cursor(offset, ret)
        .map_err(|e| ScriptError::runtime(e.to_string()))?;
    let request = decode_request(cursor, ret - offset)
        .map_err(|e| ScriptError::runtime(format!("cannot decode request: {}", e)))?;
    trace!(context, callable = %request.callable, args = request.args.len(), "request decoded");

    let target = resolve(ns, &request.callable)?;
    let outcome = match call_with_values(ns, &target, &request.args, &request.kwargs) {
        Ok(value) => Outcome::Return(value),
        Err(e) => Outcome::Raised(RemoteError {
            kind: e.kind,
            message: e.message,
        }),
    };

    let capacity = attachment.outcome_capacity();
    let (outcome, bytes) = match encode_outcome(&outcome, capacity) {
        Ok(bytes) => (outcome, bytes),
        Err(e) => {
            let replacement = Outcome::Raised(RemoteError {
                kind: ErrorKind::RuntimeError,
                message: format!("result could not be returned: {}", e),
            });
            let bytes = encode_outcome(&replacement, capacity)
                .map_err(|e| ScriptError::runtime(e.to_string()))?;
            (replacement, bytes)
        }
    };

    attachment
        .mapping
        .write_at(ret + 1, &bytes)
        .map_err(|e| ScriptError::runtime(e.to_string()))?;
    // Publish only after the outcome bytes are in place
    attachment
        .mapping
        .store_byte(ret, flag_for(&outcome).to_byte())
        .map_err(|e| ScriptError::runtime(e.to_string()))?;
    trace!(context, bytes = bytes.len(), "outcome published");
    Ok(Value::None)
}
