use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::FusedFuture;

use crate::bridge::Signal;
use crate::error::BridgeError;
use crate::handle::{Handle, OwnedHandle};
use crate::notifier::{NotifierRegistry, Slot};

/// Outcome of a single call to a module's future poll export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollResult<T> {
    /// No value yet; the module will fire the slot when it is worth polling again.
    Pending,
    Ready(T),
    /// The operation finished abnormally. The message is already copied out
    /// of module memory.
    Failed(String),
}

/// One "poll once" call against a module-side future.
pub trait FuturePoller<T> {
    fn poll(&mut self, handle: Handle, slot: Slot) -> Result<PollResult<T>, BridgeError>;
}

impl<T, F> FuturePoller<T> for F
where
    F: FnMut(Handle, Slot) -> Result<PollResult<T>, BridgeError>,
{
    fn poll(&mut self, handle: Handle, slot: Slot) -> Result<PollResult<T>, BridgeError> {
        self(handle, slot)
    }
}

/// A module-side future exposed as a host [`Future`].
///
/// Construction reserves a notifier slot and polls the module once right
/// away, so a value that is already available costs no round trip. After
/// that the module is polled again only when its slot has fired.
///
/// On the terminal poll the slot is unregistered and the [`OwnedHandle`] is
/// dropped, before the value is handed out. Dropping the future early does
/// the same cleanup, so a late notification for its slot is ignored.
pub struct NativeFuture<T, P> {
    registry: Arc<NotifierRegistry>,
    slot: Slot,
    signal: Arc<Signal>,
    // `None` once the terminal poll has cleaned up.
    handle: Option<OwnedHandle>,
    poller: P,
    outcome: Option<Result<T, BridgeError>>,
}

impl<T, P: FuturePoller<T>> NativeFuture<T, P> {
    pub fn new(registry: Arc<NotifierRegistry>, handle: OwnedHandle, poller: P) -> Self {
        let signal = Signal::new();
        let slot = registry.reserve_slot();
        registry.register(slot, signal.next_notifier());

        let mut future = Self {
            registry,
            slot,
            signal,
            handle: Some(handle),
            poller,
            outcome: None,
        };
        future.poll_module();
        future
    }

    fn poll_module(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        let result = match handle.borrow() {
            Ok(raw) => self.poller.poll(raw, self.slot),
            Err(error) => Err(error),
        };
        match result {
            Ok(PollResult::Pending) => {
                tracing::trace!(slot = %self.slot, "future pending");
            }
            Ok(PollResult::Ready(value)) => self.finish(Ok(value)),
            Ok(PollResult::Failed(message)) => self.finish(Err(BridgeError::ModulePoll(message))),
            Err(error) => self.finish(Err(error)),
        }
    }

    fn finish(&mut self, outcome: Result<T, BridgeError>) {
        tracing::debug!(slot = %self.slot, ok = outcome.is_ok(), "future completed");
        self.release();
        self.outcome = Some(outcome);
    }
}

impl<T, P> NativeFuture<T, P> {
    /// Slot the module fires when this future should be polled again.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    fn release(&mut self) {
        self.registry.unregister(self.slot);
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.drop() {
                tracing::warn!(slot = %self.slot, %error, "failed to release module future");
            }
        }
    }
}

// Never pin-projected.
impl<T, P> Unpin for NativeFuture<T, P> {}

impl<T, P: FuturePoller<T>> Future for NativeFuture<T, P> {
    type Output = Result<T, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            if let Some(outcome) = this.outcome.take() {
                return Poll::Ready(outcome);
            }
            if this.handle.is_none() {
                return Poll::Pending;
            }
            // Register before checking the flag so a notification racing
            // with this poll still wakes the task.
            this.signal.register(cx.waker());
            if !this.signal.take_next() {
                return Poll::Pending;
            }
            this.poll_module();
        }
    }
}

impl<T, P: FuturePoller<T>> FusedFuture for NativeFuture<T, P> {
    fn is_terminated(&self) -> bool {
        self.handle.is_none() && self.outcome.is_none()
    }
}

impl<T, P> Drop for NativeFuture<T, P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::debug!(slot = %self.slot, "future dropped before completion");
            self.release();
        }
    }
}

impl<T, P> fmt::Debug for NativeFuture<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFuture")
            .field("slot", &self.slot)
            .field("handle", &self.handle)
            .field("completed", &self.handle.is_none())
            .finish()
    }
}
