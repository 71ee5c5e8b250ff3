/*!
 * Call Dispatch
 *
 * Encodes a call into the payload region, triggers the receiving routine
 * in the worker's context and reads the outcome back from the return
 * region. Calls run either on the calling thread or on one named thread
 * per call; in both cases replication and encoding happen on the calling
 * thread so their errors surface synchronously.
 */

use super::lifecycle::{Slot, TriggerFailure, Worker};
use crate::callable::Callable;
use crate::channel::{Channel, CompletionFlag};
use crate::core::errors::{WorkerError, WorkerResult};
use crate::core::limits::{CALL_THREAD_STACK_SIZE, DEFAULT_POLL_INTERVAL};
use crate::core::types::{ContextId, WorkerId, WorkerState};
use crate::isolate::IsolationPrimitive;
use crate::monitoring::CallSpan;
use crate::protocol::{
    decode_outcome, encode_request, render_args, CallableRef, CodecError, Kwargs, Outcome, Value,
};
use crate::replicator;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// Code run in the context to serve the request at offset 0
const TRIGGER_CODE: &str = "_call(0)";

/// A call ready to be written into the channel
struct PreparedCall {
    label: String,
    args: String,
    payload: Vec<u8>,
}

/// Write the payload and run the trigger. Executes on whichever thread
/// carries the call.
fn dispatch(
    worker: WorkerId,
    backend: &dyn IsolationPrimitive,
    context: ContextId,
    channel: &Channel,
    call: &PreparedCall,
) -> Option<TriggerFailure> {
    let span = CallSpan::new(worker, &call.label);
    let _entered = span.enter();
    span.record_payload(call.payload.len());

    let triggered = channel
        .write(0, &call.payload)
        .map_err(|e| e.to_string())
        .and_then(|()| backend.run_code(context, TRIGGER_CODE).map_err(|e| e.to_string()));

    match triggered {
        Ok(()) => {
            let outcome = match channel.flag() {
                CompletionFlag::Value => "value",
                CompletionFlag::Raised => "raised",
                _ => "unknown",
            };
            span.record_outcome(outcome);
            None
        }
        Err(message) => {
            if let Err(e) = channel.set_flag(CompletionFlag::TriggerFailed) {
                error!(worker, error = %e, "cannot mark trigger failure in channel");
            }
            error!(
                worker,
                context,
                callable = %call.label,
                args = %call.args,
                error = %message,
                "remote execution failed"
            );
            span.record_outcome("trigger_failed");
            Some(TriggerFailure {
                callable: call.label.clone(),
                args: call.args.clone(),
                message,
            })
        }
    }
}

impl Worker {
    /// Slot of a worker able to take a call now; reaps a finished
    /// threaded call first
    fn ready_slot(&self, state: &mut WorkerState) -> WorkerResult<Slot> {
        let serial = self.inner.serial;
        let current = *state;
        match current {
            WorkerState::Unstarted => return Err(WorkerError::NotStarted(serial)),
            WorkerState::Closed => return Err(WorkerError::Closed(serial)),
            WorkerState::CallInFlight if !self.inner.reap(state, false) => {
                return Err(WorkerError::Busy(serial))
            }
            _ => {}
        }
        self.inner
            .slot()
            .ok_or_else(|| WorkerError::InvalidState(format!("worker {} has no context", serial)))
    }

    /// Encode and replicate without touching the channel
    fn prepare(&self, callable: &Callable, args: &[Value], kwargs: &Kwargs) -> WorkerResult<PreparedCall> {
        let slot = {
            let mut state = self.inner.state.lock();
            self.ready_slot(&mut state)?
        };

        let mut reference = callable.to_ref()?;
        if let Callable::Script { function, scope } = callable {
            reference = CallableRef::Global {
                name: replicator::target_binding(function, scope),
            };
        }
        let payload = encode_request(
            &reference,
            args,
            kwargs,
            slot.channel.payload_capacity(),
        )?;

        if let Callable::Script { function, scope } = callable {
            let mut cache = self.inner.cache.lock();
            let report = replicator::replicate(
                self.inner.backend.as_ref(),
                slot.id,
                &mut cache,
                function,
                scope,
            )?;
            if !report.is_empty() {
                debug!(worker = self.inner.serial, %report, "replicated session state");
            }
        }

        Ok(PreparedCall {
            label: reference.to_string(),
            args: render_args(args, kwargs),
            payload,
        })
    }

    /// Reset the flag and mark the call in flight
    fn begin(&self, call: &PreparedCall) -> WorkerResult<(Slot, WorkerState)> {
        let mut state = self.inner.state.lock();
        let slot = self.ready_slot(&mut state)?;
        let previous = *state;
        slot.channel.set_flag(CompletionFlag::Pending)?;
        *self.inner.failure.lock() = None;
        *self.inner.last_call.lock() = Some(call.label.clone());
        *state = WorkerState::CallInFlight;
        Ok((slot, previous))
    }

    fn finish(&self, failure: Option<TriggerFailure>) {
        let mut state = self.inner.state.lock();
        *self.inner.failure.lock() = failure;
        if *state == WorkerState::CallInFlight {
            *state = WorkerState::Done;
        }
    }

    /// Run a call on the calling thread without reading its result
    ///
    /// Fails with [`WorkerError::RemoteExecution`] when the trigger itself
    /// fails; errors raised by the callable are reported by [`result`].
    ///
    /// [`result`]: Worker::result
    pub fn execute(&self, callable: &Callable, args: &[Value], kwargs: &Kwargs) -> WorkerResult<()> {
        let call = self.prepare(callable, args, kwargs)?;
        let (slot, _) = self.begin(&call)?;
        let failure = dispatch(
            self.inner.serial,
            self.inner.backend.as_ref(),
            slot.id,
            &slot.channel,
            &call,
        );
        let error = failure.as_ref().map(TriggerFailure::to_error);
        self.finish(failure);
        match error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Run `callable(*args)` in the worker and return its result
    pub fn run(&self, callable: &Callable, args: &[Value]) -> WorkerResult<Value> {
        self.run_with(callable, args, &Kwargs::new())
    }

    pub fn run_with(&self, callable: &Callable, args: &[Value], kwargs: &Kwargs) -> WorkerResult<Value> {
        self.execute(callable, args, kwargs)?;
        self.result()
    }

    /// Start a call on its own thread and return at once
    ///
    /// Poll [`done`](Worker::done) and collect with [`result`](Worker::result).
    pub fn run_in_thread(&self, callable: &Callable, args: &[Value]) -> WorkerResult<()> {
        self.run_in_thread_with(callable, args, &Kwargs::new())
    }

    pub fn run_in_thread_with(
        &self,
        callable: &Callable,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> WorkerResult<()> {
        let call = self.prepare(callable, args, kwargs)?;
        let (slot, previous) = self.begin(&call)?;

        let serial = self.inner.serial;
        let backend = Arc::clone(&self.inner.backend);
        let spawned = thread::Builder::new()
            .name(format!("subworker-{}", serial))
            .stack_size(CALL_THREAD_STACK_SIZE)
            .spawn(move || dispatch(serial, backend.as_ref(), slot.id, &slot.channel, &call));

        match spawned {
            Ok(handle) => {
                *self.inner.thread.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                *self.inner.state.lock() = previous;
                Err(WorkerError::Thread(e.to_string()))
            }
        }
    }

    /// Whether the last call has written its completion flag
    pub fn done(&self) -> bool {
        self.inner
            .slot()
            .map(|slot| slot.channel.flag().is_set())
            .unwrap_or(false)
    }

    /// Result of the last call
    ///
    /// Fails with [`WorkerError::InvalidState`] while no result is
    /// available. May be read repeatedly until the next call.
    pub fn result(&self) -> WorkerResult<Value> {
        let slot = self.open_slot()?;
        let flag = slot.channel.flag();
        if !flag.is_set() {
            return Err(WorkerError::InvalidState(format!(
                "worker {} has no result: call still running or never made",
                self.inner.serial
            )));
        }

        // The flag is published before the trigger returns
        {
            let mut state = self.inner.state.lock();
            if *state == WorkerState::CallInFlight {
                self.inner.reap(&mut state, true);
            }
        }

        match flag {
            CompletionFlag::TriggerFailed => Err(self
                .inner
                .failure
                .lock()
                .as_ref()
                .map(TriggerFailure::to_error)
                .unwrap_or_else(|| WorkerError::RemoteExecution {
                    callable: self.last_call(),
                    args: String::new(),
                    message: "trigger failed".to_string(),
                })),
            CompletionFlag::Value | CompletionFlag::Raised => {
                let limit = slot.channel.size() - slot.channel.return_offset() - 1;
                match decode_outcome(slot.channel.outcome()?, limit)? {
                    Outcome::Return(value) if flag == CompletionFlag::Value => Ok(value),
                    Outcome::Raised(remote) if flag == CompletionFlag::Raised => Err(WorkerError::Remote {
                        callable: self.last_call(),
                        kind: remote.kind,
                        message: remote.message,
                    }),
                    _ => Err(CodecError::Corrupt(format!("outcome does not match flag {:?}", flag)).into()),
                }
            }
            CompletionFlag::Pending | CompletionFlag::Unknown(_) => Err(CodecError::Corrupt(
                format!("unexpected completion flag {}", flag.to_byte()),
            )
            .into()),
        }
    }

    fn last_call(&self) -> String {
        self.inner.last_call.lock().clone().unwrap_or_default()
    }

    /// Block until the last call completes, polling every `poll`
    pub fn wait(&self, poll: Duration) -> WorkerResult<Value> {
        while !self.done() {
            if self.state() != WorkerState::CallInFlight {
                break;
            }
            thread::sleep(poll);
        }
        self.result()
    }

    /// [`wait`](Worker::wait) with the default poll interval
    pub fn join(&self) -> WorkerResult<Value> {
        self.wait(DEFAULT_POLL_INTERVAL)
    }

    /// Await completion without blocking the runtime
    #[cfg(feature = "async")]
    pub async fn completion(&self, poll: Duration) -> WorkerResult<Value> {
        while !self.done() {
            if self.state() != WorkerState::CallInFlight {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        self.result()
    }
}
