pub mod api;
pub mod bridge;
pub mod error;
pub mod handle;
pub mod notifier;

pub use api::{
    AbiScalar, Api, ApiBuilder, BridgeConfig, ExportFuture, ExportStream, ModuleBuffer, ModuleFuture,
    ModuleState, ModuleStream,
};
pub use bridge::{FuturePoller, NativeFuture, NativeStream, PollResult, StreamPoll, StreamPoller};
pub use error::BridgeError;
pub use handle::{Handle, HandleState, OwnedHandle};
pub use notifier::{Notifier, NotifierRegistry, Slot};

pub use wasmtime;
