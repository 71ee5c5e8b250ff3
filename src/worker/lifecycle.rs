/*!
 * Worker Lifecycle
 *
 * Owns the execution context and the channel of one worker and moves the
 * worker through its states:
 *
 * ```text
 * Unstarted --start--> Started --call--> CallInFlight --trigger returns--> Done
 *                         |                                                  |
 *                         +------------------close------------------------> Closed
 * ```
 *
 * Start and close are serialized by a reentrant lock. Closing with a call
 * in flight is refused rather than waited out.
 */

use super::registry;
use crate::channel::Channel;
use crate::config::WorkerConfig;
use crate::core::errors::{WorkerError, WorkerResult};
use crate::core::types::{ContextId, WorkerId, WorkerState};
use crate::isolate::{self, IsolationPrimitive};
use crate::replicator::ReplicationCache;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Code that tears down the receiving routine before destruction
const EXIT_CODE: &str = "_exit()";

/// Context plus channel, present while the worker is open
#[derive(Clone)]
pub(super) struct Slot {
    pub id: ContextId,
    pub channel: Arc<Channel>,
}

/// Why the last trigger failed; kept until the next call
#[derive(Debug, Clone)]
pub(super) struct TriggerFailure {
    pub callable: String,
    pub args: String,
    pub message: String,
}

impl TriggerFailure {
    pub fn to_error(&self) -> WorkerError {
        WorkerError::RemoteExecution {
            callable: self.callable.clone(),
            args: self.args.clone(),
            message: self.message.clone(),
        }
    }
}

/// A threaded call; yields the trigger failure, if any
pub(super) type CallThread = JoinHandle<Option<TriggerFailure>>;

pub(super) struct WorkerInner {
    pub serial: WorkerId,
    pub backend: Arc<dyn IsolationPrimitive>,
    pub config: WorkerConfig,
    pub lock: ReentrantMutex<()>,
    pub slot: RwLock<Option<Slot>>,
    pub state: Mutex<WorkerState>,
    pub thread: Mutex<Option<CallThread>>,
    pub failure: Mutex<Option<TriggerFailure>>,
    pub last_call: Mutex<Option<String>>,
    pub cache: Mutex<ReplicationCache>,
}

impl WorkerInner {
    pub fn slot(&self) -> Option<Slot> {
        self.slot.read().clone()
    }

    pub fn context_id(&self) -> Option<ContextId> {
        self.slot.read().as_ref().map(|s| s.id)
    }

    /// Join the call thread if it is finished, or unconditionally when
    /// `wait` is set. Returns whether no call remains in flight.
    ///
    /// Must be called with the state lock held.
    pub fn reap(&self, state: &mut WorkerState, wait: bool) -> bool {
        let mut slot = self.thread.lock();
        let Some(handle) = slot.take() else {
            // Synchronous calls hold CallInFlight for their whole duration
            return *state != WorkerState::CallInFlight;
        };
        if !wait && !handle.is_finished() {
            *slot = Some(handle);
            return false;
        }
        drop(slot);

        let failure = match handle.join() {
            Ok(failure) => failure,
            Err(_) => Some(TriggerFailure {
                callable: self.last_call.lock().clone().unwrap_or_default(),
                args: String::new(),
                message: "call thread panicked".to_string(),
            }),
        };
        if failure.is_some() {
            *self.failure.lock() = failure;
        }
        if *state == WorkerState::CallInFlight {
            *state = WorkerState::Done;
        }
        true
    }

    pub fn close(&self) -> WorkerResult<()> {
        let _guard = self.lock.lock();
        let mut state = self.state.lock();

        let current = *state;
        match current {
            WorkerState::Unstarted | WorkerState::Closed => return Ok(()),
            WorkerState::CallInFlight if !self.reap(&mut state, false) => {
                let id = self.context_id().unwrap_or_default();
                return Err(WorkerError::ContextRunning(id));
            }
            _ => {}
        }

        let Some(slot) = self.slot() else {
            return Err(WorkerError::InvalidState(format!(
                "worker {} is {} but holds no context",
                self.serial, *state
            )));
        };
        if self.backend.is_running(slot.id)? {
            return Err(WorkerError::ContextRunning(slot.id));
        }
        // A finished thread may still hold a channel reference
        self.reap(&mut state, true);

        if let Err(e) = self.backend.run_code(slot.id, EXIT_CODE) {
            warn!(worker = self.serial, context = slot.id, error = %e, "teardown code failed");
        }
        self.backend.destroy(slot.id)?;

        drop(slot);
        let taken = self.slot.write().take();
        *state = WorkerState::Closed;
        self.cache.lock().clear();
        registry::deregister(self.serial);
        info!(worker = self.serial, "worker closed");

        match taken.map(|slot| Arc::try_unwrap(slot.channel)) {
            Some(Ok(channel)) => channel.close()?,
            Some(Err(_shared)) => {
                warn!(worker = self.serial, "channel still referenced at close; unlinked on last drop")
            }
            None => {}
        }
        Ok(())
    }
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock();
            if *state == WorkerState::CallInFlight {
                debug!(worker = self.serial, "waiting for outstanding call before drop");
                self.reap(&mut state, true);
            }
        }
        if let Err(e) = self.close() {
            warn!(worker = self.serial, error = %e, "failed to close worker on drop");
        }
    }
}

/// Handle to one isolated worker
///
/// Clones share the same worker. The worker closes when the last clone is
/// dropped, after any outstanding threaded call finishes.
///
/// ```no_run
/// use subworker::{Callable, Worker};
/// use subworker::protocol::Value;
///
/// let worker = Worker::started()?;
/// let n = worker.run(&Callable::builtin("len"), &[Value::from(vec![1, 2, 3])])?;
/// assert_eq!(n, Value::from(3));
/// worker.close()?;
/// # Ok::<(), subworker::WorkerError>(())
/// ```
#[derive(Clone)]
pub struct Worker {
    pub(super) inner: Arc<WorkerInner>,
}

impl Worker {
    /// An unstarted worker on the process-wide local backend
    pub fn new() -> Self {
        WorkerBuilder::new().build()
    }

    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    /// Create and start in one step
    pub fn started() -> WorkerResult<Self> {
        let worker = Self::new();
        worker.start()?;
        Ok(worker)
    }

    pub(super) fn from_inner(inner: Arc<WorkerInner>) -> Self {
        Self { inner }
    }

    /// Allocate the channel and the context and arm the receiving routine
    pub fn start(&self) -> WorkerResult<()> {
        let inner = &self.inner;
        let _guard = inner.lock.lock();
        let mut state = inner.state.lock();
        if *state != WorkerState::Unstarted {
            return Err(WorkerError::AlreadyStarted {
                worker: inner.serial,
                state: *state,
            });
        }

        inner.config.validate()?;
        let channel = Channel::create(&inner.config)?;
        let id = inner.backend.create()?;

        let init = format!(
            "_attach({}, {}, {})",
            channel.raw_fd(),
            channel.size(),
            channel.return_offset()
        );
        if let Err(e) = inner.backend.run_code(id, &init) {
            if let Err(destroy_err) = inner.backend.destroy(id) {
                warn!(context = id, error = %destroy_err, "failed to destroy context after init failure");
            }
            if let Err(close_err) = channel.close() {
                warn!(error = %close_err, "failed to release channel after init failure");
            }
            return Err(e.into());
        }

        info!(
            worker = inner.serial,
            context = id,
            path = %channel.path().display(),
            "worker started"
        );
        *inner.slot.write() = Some(Slot {
            id,
            channel: Arc::new(channel),
        });
        *state = WorkerState::Started;
        registry::register(inner.serial, Arc::downgrade(inner));
        Ok(())
    }

    /// Release the context and the channel
    ///
    /// A no-op on unstarted or closed workers; fails with
    /// [`WorkerError::ContextRunning`] while a call is in flight.
    pub fn close(&self) -> WorkerResult<()> {
        self.inner.close()
    }

    /// Context id; `None` before start and after close
    pub fn id(&self) -> Option<ContextId> {
        self.inner.context_id()
    }

    /// Process-local serial number, stable for the worker's lifetime
    pub fn serial(&self) -> WorkerId {
        self.inner.serial
    }

    pub fn state(&self) -> WorkerState {
        *self.inner.state.lock()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Names currently tracked by the replication cache
    pub fn replicated(&self) -> Vec<String> {
        self.inner.cache.lock().names()
    }

    pub(super) fn open_slot(&self) -> WorkerResult<Slot> {
        match self.state() {
            WorkerState::Unstarted => Err(WorkerError::NotStarted(self.inner.serial)),
            WorkerState::Closed => Err(WorkerError::Closed(self.inner.serial)),
            _ => self.inner.slot().ok_or_else(|| {
                WorkerError::InvalidState(format!("worker {} has no context", self.inner.serial))
            }),
        }
    }

    /// Run code text in the worker's context
    pub fn run_string(&self, code: &str) -> WorkerResult<()> {
        let slot = self.open_slot()?;
        self.inner.backend.run_code(slot.id, code)?;
        Ok(())
    }

    /// Whether the context is executing code right now
    pub fn is_running(&self) -> WorkerResult<bool> {
        match self.inner.context_id() {
            Some(id) => Ok(self.inner.backend.is_running(id)?),
            None => Ok(false),
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "Worker <#{}>", id),
            None => write!(f, "Worker <#{}>", self.state()),
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("serial", &self.inner.serial)
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for [`Worker`]
#[must_use]
pub struct WorkerBuilder {
    backend: Option<Arc<dyn IsolationPrimitive>>,
    config: WorkerConfig,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn IsolationPrimitive>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Worker {
        let backend = self
            .backend
            .unwrap_or_else(|| isolate::global() as Arc<dyn IsolationPrimitive>);
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        Worker::from_inner(Arc::new(WorkerInner {
            serial,
            backend,
            config: self.config,
            lock: ReentrantMutex::new(()),
            slot: RwLock::new(None),
            state: Mutex::new(WorkerState::Unstarted),
            thread: Mutex::new(None),
            failure: Mutex::new(None),
            last_call: Mutex::new(None),
            cache: Mutex::new(ReplicationCache::new()),
        }))
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isolate::{IsolateError, MockIsolationPrimitive};
    use crate::script::ErrorKind;
    use pretty_assertions::assert_eq;

    fn small() -> WorkerConfig {
        WorkerConfig::default()
            .with_buffer_size(64 * 1024)
            .with_return_offset(48 * 1024)
    }

    fn mock_backend() -> MockIsolationPrimitive {
        let mut mock = MockIsolationPrimitive::new();
        mock.expect_create().returning(|| Ok(7));
        mock.expect_run_code().returning(|_, _| Ok(()));
        mock.expect_is_running().returning(|_| Ok(false));
        mock
    }

    #[test]
    fn test_start_then_close() {
        let worker = Worker::builder().with_config(small()).build();
        assert_eq!(worker.state(), WorkerState::Unstarted);
        assert_eq!(worker.id(), None);

        worker.start().unwrap();
        assert_eq!(worker.state(), WorkerState::Started);
        assert!(worker.id().is_some());
        assert!(worker.to_string().starts_with("Worker <#"));

        worker.close().unwrap();
        assert_eq!(worker.state(), WorkerState::Closed);
        assert_eq!(worker.id(), None);
    }

    #[test]
    fn test_start_twice() {
        let worker = Worker::builder().with_config(small()).build();
        worker.start().unwrap();
        assert!(matches!(
            worker.start(),
            Err(WorkerError::AlreadyStarted {
                state: WorkerState::Started,
                ..
            })
        ));
        worker.close().unwrap();
        assert!(matches!(
            worker.start(),
            Err(WorkerError::AlreadyStarted {
                state: WorkerState::Closed,
                ..
            })
        ));
    }

    #[test]
    fn test_close_unstarted_is_noop() {
        let worker = Worker::new();
        worker.close().unwrap();
        assert_eq!(worker.state(), WorkerState::Unstarted);
    }

    #[test]
    fn test_double_close_destroys_once() {
        let mut mock = mock_backend();
        mock.expect_destroy().times(1).returning(|_| Ok(()));
        let worker = Worker::builder()
            .with_backend(Arc::new(mock))
            .with_config(small())
            .build();

        worker.start().unwrap();
        worker.close().unwrap();
        worker.close().unwrap();
        drop(worker);
    }

    #[test]
    fn test_close_refused_while_context_running() {
        let mut mock = MockIsolationPrimitive::new();
        mock.expect_create().returning(|| Ok(3));
        mock.expect_run_code().returning(|_, _| Ok(()));
        mock.expect_is_running().returning(|_| Ok(true));
        mock.expect_destroy().times(0);
        let worker = Worker::builder()
            .with_backend(Arc::new(mock))
            .with_config(small())
            .build();

        worker.start().unwrap();
        assert!(matches!(
            worker.close(),
            Err(WorkerError::ContextRunning(3))
        ));
        assert_eq!(worker.state(), WorkerState::Started);
    }

    #[test]
    fn test_init_failure_releases_context() {
        let mut mock = MockIsolationPrimitive::new();
        mock.expect_create().returning(|| Ok(5));
        mock.expect_run_code().returning(|id, _| {
            Err(IsolateError::RunFailed {
                context: id,
                kind: ErrorKind::RuntimeError,
                message: "cannot map channel".into(),
            })
        });
        mock.expect_destroy().times(1).returning(|_| Ok(()));
        let worker = Worker::builder()
            .with_backend(Arc::new(mock))
            .with_config(small())
            .build();

        assert!(matches!(worker.start(), Err(WorkerError::Isolate(_))));
        assert_eq!(worker.state(), WorkerState::Unstarted);
        assert_eq!(worker.id(), None);
    }

    #[test]
    fn test_invalid_config_rejected_at_start() {
        let worker = Worker::builder()
            .with_config(WorkerConfig::default().with_buffer_size(8))
            .build();
        assert!(matches!(worker.start(), Err(WorkerError::Config(_))));
    }

    #[test]
    fn test_run_string_requires_start() {
        let worker = Worker::builder().with_config(small()).build();
        assert!(matches!(
            worker.run_string("1"),
            Err(WorkerError::NotStarted(_))
        ));
        worker.start().unwrap();
        worker.run_string("x = 40 + 2").unwrap();
        assert!(!worker.is_running().unwrap());
        worker.close().unwrap();
        assert!(matches!(worker.run_string("1"), Err(WorkerError::Closed(_))));
    }
}
