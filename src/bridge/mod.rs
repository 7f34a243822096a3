//! Completion bridges: async engine completions -> blocking waits.
//!
//! The engine resolves operations on its own threads. The foreign caller
//! expects a single blocking call. A bridge hands a producer token into the
//! async side and parks the calling thread on the consumer side with a
//! fixed deadline.

use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Deadline applied to every bridge wait (generation and apply alike).
pub const BRIDGE_TIMEOUT: Duration = Duration::from_secs(3);

/// Arming a bridge that is already armed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("bridge is already armed")]
pub struct AlreadyArmed;

/// Outcome of an abandoned or failed wait.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline elapsed before the completion fired. The in-flight
    /// operation is not cancelled; its late result is discarded.
    #[error("wait deadline elapsed")]
    TimedOut,
    /// The completion was resolved with the failure sentinel, or dropped
    /// without resolving.
    #[error("completion reported failure")]
    Failed,
}

/// Producer token for one bridge incarnation. Handed to the async engine
/// task; resolving it more than once is impossible (consumed on use), and
/// resolving it after the waiter gave up is harmless.
pub struct Completion<T> {
    tx: oneshot::Sender<Option<T>>,
}

impl<T> Completion<T> {
    /// Resolve the bridge with a value.
    pub fn succeed(self, value: T) {
        if self.tx.send(Some(value)).is_err() {
            debug!("late completion discarded (waiter already gone)");
        }
    }

    /// Resolve the bridge with the failure sentinel.
    pub fn fail(self) {
        if self.tx.send(None).is_err() {
            debug!("late failure discarded (waiter already gone)");
        }
    }
}

/// Consumer token for one bridge incarnation. Must be passed back to
/// [`CompletionBridge::wait`] on the same bridge that armed it.
pub struct Pending<T> {
    rx: oneshot::Receiver<Option<T>>,
}

/// Re-armable single-slot promise/future pair.
///
/// State machine: Idle -> Armed -> (Fulfilled | Abandoned) -> Idle.
/// At most one incarnation may be armed at a time; a concurrent `arm`
/// fails loudly instead of corrupting the slot. Each incarnation owns a
/// private channel, so a completion that fires after its wait was
/// abandoned can never resolve a later incarnation.
pub struct CompletionBridge<T> {
    handle: Handle,
    armed: Mutex<bool>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> CompletionBridge<T> {
    /// Create an idle bridge that parks waiters on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            armed: Mutex::new(false),
            _marker: std::marker::PhantomData,
        }
    }

    /// Arm the bridge, producing the token pair for one operation.
    pub fn arm(&self) -> Result<(Completion<T>, Pending<T>), AlreadyArmed> {
        let mut armed = self.armed.lock();
        if *armed {
            return Err(AlreadyArmed);
        }
        *armed = true;
        let (tx, rx) = oneshot::channel();
        Ok((Completion { tx }, Pending { rx }))
    }

    /// Block the calling thread until the completion fires or `deadline`
    /// elapses. Disarms the bridge in every outcome, so the next operation
    /// may re-arm it.
    pub fn wait(&self, pending: Pending<T>, deadline: Duration) -> Result<T, WaitError> {
        // Constructed inside the runtime context: `timeout` needs a reactor.
        let result = self
            .handle
            .block_on(async { timeout(deadline, pending.rx).await });
        *self.armed.lock() = false;
        match result {
            Ok(Ok(Some(value))) => Ok(value),
            Ok(Ok(None)) => Err(WaitError::Failed),
            // Producer dropped without resolving; treat as failure.
            Ok(Err(_)) => Err(WaitError::Failed),
            Err(_) => {
                warn!("bridge wait abandoned after {:?}", deadline);
                Err(WaitError::TimedOut)
            }
        }
    }
}

/// Producer half of a one-shot acknowledgement.
pub struct Ack {
    tx: oneshot::Sender<Result<(), String>>,
}

impl Ack {
    /// Resolve the acknowledgement. A late resolution is discarded.
    pub fn resolve(self, result: Result<(), String>) {
        if self.tx.send(result).is_err() {
            debug!("late acknowledgement discarded (waiter already gone)");
        }
    }
}

/// One-shot success/failure acknowledgement for description application.
/// Created fresh per call, consumed by `wait`.
pub struct AckBridge {
    handle: Handle,
    rx: oneshot::Receiver<Result<(), String>>,
}

/// Failure outcome of an acknowledgement wait.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AckError {
    #[error("{0}")]
    Failed(String),
    #[error("wait deadline elapsed")]
    TimedOut,
}

impl AckBridge {
    /// Create a fresh acknowledgement pair.
    pub fn new(handle: Handle) -> (Ack, AckBridge) {
        let (tx, rx) = oneshot::channel();
        (Ack { tx }, AckBridge { handle, rx })
    }

    /// Block until the acknowledgement resolves or `deadline` elapses.
    pub fn wait(self, deadline: Duration) -> Result<(), AckError> {
        match self.handle.block_on(async { timeout(deadline, self.rx).await }) {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(AckError::Failed(message)),
            Ok(Err(_)) => Err(AckError::Failed("acknowledgement dropped".to_string())),
            Err(_) => Err(AckError::TimedOut),
        }
    }
}
