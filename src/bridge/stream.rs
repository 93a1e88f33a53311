use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::FusedStream;

use crate::bridge::Signal;
use crate::error::BridgeError;
use crate::handle::{Handle, OwnedHandle};
use crate::notifier::{NotifierRegistry, Slot};

/// Outcome of a single call to a module's stream poll export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamPoll<T> {
    /// No item right now. The module fires the next slot when one is ready,
    /// or the done slot when the sequence is exhausted.
    Pending,
    Next(T),
    Done,
}

/// One "poll next" call against a module-side stream.
pub trait StreamPoller<T> {
    fn poll(&mut self, handle: Handle, next: Slot, done: Slot) -> Result<StreamPoll<T>, BridgeError>;
}

impl<T, F> StreamPoller<T> for F
where
    F: FnMut(Handle, Slot, Slot) -> Result<StreamPoll<T>, BridgeError>,
{
    fn poll(&mut self, handle: Handle, next: Slot, done: Slot) -> Result<StreamPoll<T>, BridgeError> {
        self(handle, next, done)
    }
}

/// A module-side stream exposed as a host [`Stream`].
///
/// Two slots are registered: one the module fires when another item may be
/// ready, one it fires when the sequence is exhausted. The module is polled
/// once on construction, and afterwards only while the consumer is pulling,
/// so items are never produced faster than they are drained.
///
/// The [`OwnedHandle`] is released when the module signals exhaustion, when
/// a poll fails, or when the stream is dropped. A stream cannot be replayed.
pub struct NativeStream<T, P> {
    registry: Arc<NotifierRegistry>,
    next_slot: Slot,
    done_slot: Slot,
    signal: Arc<Signal>,
    handle: Option<OwnedHandle>,
    poller: P,
    buffered: Option<T>,
    error: Option<BridgeError>,
}

impl<T, P: StreamPoller<T>> NativeStream<T, P> {
    pub fn new(registry: Arc<NotifierRegistry>, handle: OwnedHandle, poller: P) -> Self {
        let signal = Signal::new();
        let next_slot = registry.reserve_slot();
        let done_slot = registry.reserve_slot();
        registry.register(next_slot, signal.next_notifier());
        registry.register(done_slot, signal.done_notifier());

        let mut stream = Self {
            registry,
            next_slot,
            done_slot,
            signal,
            handle: Some(handle),
            poller,
            buffered: None,
            error: None,
        };
        stream.poll_module();
        stream
    }

    fn poll_module(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        let result = match handle.borrow() {
            Ok(raw) => self.poller.poll(raw, self.next_slot, self.done_slot),
            Err(error) => Err(error),
        };
        match result {
            Ok(StreamPoll::Pending) => {
                tracing::trace!(next = %self.next_slot, "stream pending");
            }
            Ok(StreamPoll::Next(item)) => {
                tracing::trace!(next = %self.next_slot, "stream produced item");
                self.buffered = Some(item);
            }
            Ok(StreamPoll::Done) => self.finish(),
            Err(error) => {
                self.finish();
                self.error = Some(error);
            }
        }
    }

    fn finish(&mut self) {
        tracing::debug!(next = %self.next_slot, done = %self.done_slot, "stream finished");
        self.release();
    }
}

impl<T, P> NativeStream<T, P> {
    /// The `(next, done)` slot pair registered for this stream.
    pub fn slots(&self) -> (Slot, Slot) {
        (self.next_slot, self.done_slot)
    }

    fn release(&mut self) {
        self.registry.unregister(self.next_slot);
        self.registry.unregister(self.done_slot);
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.drop() {
                tracing::warn!(next = %self.next_slot, %error, "failed to release module stream");
            }
        }
    }
}

impl<T, P> Unpin for NativeStream<T, P> {}

impl<T, P: StreamPoller<T>> Stream for NativeStream<T, P> {
    type Item = Result<T, BridgeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.buffered.take() {
                return Poll::Ready(Some(Ok(item)));
            }
            if let Some(error) = this.error.take() {
                return Poll::Ready(Some(Err(error)));
            }
            if this.handle.is_none() {
                return Poll::Ready(None);
            }
            this.signal.register(cx.waker());
            if this.signal.take_done() {
                this.finish();
                continue;
            }
            if !this.signal.take_next() {
                return Poll::Pending;
            }
            this.poll_module();
        }
    }
}

impl<T, P: StreamPoller<T>> FusedStream for NativeStream<T, P> {
    fn is_terminated(&self) -> bool {
        self.handle.is_none() && self.buffered.is_none() && self.error.is_none()
    }
}

impl<T, P> Drop for NativeStream<T, P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::debug!(next = %self.next_slot, "stream dropped before exhaustion");
            self.release();
        }
    }
}

impl<T, P> fmt::Debug for NativeStream<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeStream")
            .field("next_slot", &self.next_slot)
            .field("done_slot", &self.done_slot)
            .field("handle", &self.handle)
            .finish()
    }
}
