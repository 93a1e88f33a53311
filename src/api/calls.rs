//! Async export wrappers.
//!
//! An async export `S` returns a handle to a module-side future or stream.
//! Its companions are `S_future_poll` / `S_future_drop` for futures and
//! `S_stream_poll` / `S_stream_drop` for streams.

use std::marker::PhantomData;

use wasmtime::{TypedFunc, WasmParams, WasmTy};

use super::Api;
use crate::bridge::{FuturePoller, NativeFuture, NativeStream, PollResult, StreamPoll, StreamPoller};
use crate::error::BridgeError;
use crate::handle::{Handle, OwnedHandle};
use crate::notifier::Slot;

/// A value that crosses the module boundary as a single wasm scalar.
pub trait AbiScalar: Sized {
    type Raw: WasmTy;

    fn lift(raw: Self::Raw) -> Self;
}

macro_rules! abi_scalar {
    ($($ty:ty => $raw:ty),* $(,)?) => {
        $(
            impl AbiScalar for $ty {
                type Raw = $raw;

                fn lift(raw: $raw) -> Self {
                    raw as $ty
                }
            }
        )*
    };
}

abi_scalar! {
    i8 => i32,
    i16 => i32,
    i32 => i32,
    u8 => i32,
    u16 => i32,
    u32 => i32,
    i64 => i64,
    u64 => i64,
    f32 => f32,
    f64 => f64,
}

impl AbiScalar for bool {
    type Raw = i32;

    fn lift(raw: i32) -> Self {
        raw != 0
    }
}

impl AbiScalar for () {
    type Raw = i32;

    fn lift(_: i32) -> Self {}
}

/// `(is_pending, is_error, err_ptr, err_len, err_cap, value)`
type FuturePollFn<R> = TypedFunc<(i32, i32, i64), (i32, i32, i32, i32, i32, R)>;

/// `(has_item, item)`
type StreamPollFn<R> = TypedFunc<(i32, i32, i64, i64), (i32, R)>;

pub type ExportFuture<T> = NativeFuture<T, ModuleFuture<T>>;
pub type ExportStream<T> = NativeStream<T, ModuleStream<T>>;

/// Polls a module-side future through `S_future_poll`.
pub struct ModuleFuture<T: AbiScalar> {
    api: Api,
    poll: FuturePollFn<T::Raw>,
    _value: PhantomData<fn() -> T>,
}

impl<T: AbiScalar> FuturePoller<T> for ModuleFuture<T> {
    fn poll(&mut self, handle: Handle, slot: Slot) -> Result<PollResult<T>, BridgeError> {
        let (pending, error, ptr, len, cap, value) =
            self.api.invoke(&self.poll, (handle.to_abi(), 0, slot.to_abi()))?;
        if pending != 0 {
            return Ok(PollResult::Pending);
        }
        if error != 0 {
            let message = self.api.take_error(ptr as u32, len as u32, cap as u32)?;
            return Ok(PollResult::Failed(message));
        }
        Ok(PollResult::Ready(T::lift(value)))
    }
}

/// Polls a module-side stream through `S_stream_poll`.
pub struct ModuleStream<T: AbiScalar> {
    api: Api,
    poll: StreamPollFn<T::Raw>,
    _item: PhantomData<fn() -> T>,
}

impl<T: AbiScalar> StreamPoller<T> for ModuleStream<T> {
    fn poll(&mut self, handle: Handle, next: Slot, done: Slot) -> Result<StreamPoll<T>, BridgeError> {
        let (has_item, item) = self
            .api
            .invoke(&self.poll, (handle.to_abi(), 0, next.to_abi(), done.to_abi()))?;
        if has_item == 0 {
            // Exhaustion arrives through the done slot, not through a return value.
            return Ok(StreamPoll::Pending);
        }
        Ok(StreamPoll::Next(T::lift(item)))
    }
}

impl Api {
    /// Calls the async export `symbol` and awaits its result through
    /// `symbol_future_poll`. The module is polled once before this returns.
    pub fn call_future<P, T>(&self, symbol: &str, params: P) -> Result<ExportFuture<T>, BridgeError>
    where
        P: WasmParams,
        T: AbiScalar,
    {
        let raw: i32 = self.call(symbol, params)?;
        let handle = self.own(Handle::from_abi(raw), format!("{symbol}_future_drop"));
        self.future_from_handle(symbol, handle)
    }

    /// Bridges a future handle the host already owns.
    pub fn future_from_handle<T: AbiScalar>(
        &self,
        symbol: &str,
        handle: OwnedHandle,
    ) -> Result<ExportFuture<T>, BridgeError> {
        let poll = self.typed_func(&format!("{symbol}_future_poll"))?;
        let poller = ModuleFuture {
            api: self.clone(),
            poll,
            _value: PhantomData,
        };
        Ok(NativeFuture::new(self.registry().clone(), handle, poller))
    }

    /// Calls the async export `symbol` and streams its items through
    /// `symbol_stream_poll`.
    pub fn call_stream<P, T>(&self, symbol: &str, params: P) -> Result<ExportStream<T>, BridgeError>
    where
        P: WasmParams,
        T: AbiScalar,
    {
        let raw: i32 = self.call(symbol, params)?;
        let handle = self.own(Handle::from_abi(raw), format!("{symbol}_stream_drop"));
        self.stream_from_handle(symbol, handle)
    }

    pub fn stream_from_handle<T: AbiScalar>(
        &self,
        symbol: &str,
        handle: OwnedHandle,
    ) -> Result<ExportStream<T>, BridgeError> {
        let poll = self.typed_func(&format!("{symbol}_stream_poll"))?;
        let poller = ModuleStream {
            api: self.clone(),
            poll,
            _item: PhantomData,
        };
        Ok(NativeStream::new(self.registry().clone(), handle, poller))
    }
}
