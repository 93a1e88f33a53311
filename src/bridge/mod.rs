//! Poll-to-async bridges.
//!
//! The module's only concurrency primitive is a "poll once" export that must
//! be called again after the module fires a notifier slot. The bridges turn
//! that protocol into a [`Future`](std::future::Future) ([`NativeFuture`])
//! or a [`Stream`](futures::Stream) ([`NativeStream`]).
//!
//! Notifiers registered by a bridge never poll the module themselves. They
//! raise a flag and wake whichever task is awaiting the bridge; the module
//! is polled again only from that task, one poll at a time.

pub mod future;
pub mod stream;

pub use future::{FuturePoller, NativeFuture, PollResult};
pub use stream::{NativeStream, StreamPoll, StreamPoller};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

use futures::task::AtomicWaker;

use crate::notifier::Notifier;

/// Wake-up state shared between a bridge and its registered notifiers.
#[derive(Default)]
pub(crate) struct Signal {
    waker: AtomicWaker,
    next: AtomicBool,
    done: AtomicBool,
}

impl Signal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn register(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Notifier for "poll again".
    pub(crate) fn next_notifier(self: &Arc<Self>) -> Notifier {
        let signal = self.clone();
        Arc::new(move || {
            signal.next.store(true, Ordering::Release);
            signal.waker.wake();
        })
    }

    /// Notifier for "sequence exhausted".
    pub(crate) fn done_notifier(self: &Arc<Self>) -> Notifier {
        let signal = self.clone();
        Arc::new(move || {
            signal.done.store(true, Ordering::Release);
            signal.waker.wake();
        })
    }

    pub(crate) fn take_next(&self) -> bool {
        self.next.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_done(&self) -> bool {
        self.done.swap(false, Ordering::AcqRel)
    }
}
