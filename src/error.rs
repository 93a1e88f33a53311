use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("use after free")]
    UseAfterFree,

    #[error("use after move")]
    UseAfterMove,

    #[error("double free")]
    DoubleFree,

    #[error("can't drop moved value")]
    DropAfterMove,

    #[error("module reported failure: {0}")]
    ModulePoll(String),

    #[error("module panicked: {0}")]
    ModulePanic(String),

    #[error("module instantiation failed: {0}")]
    Instantiation(#[source] wasmtime::Error),

    #[error("export '{0}' not found")]
    ExportNotFound(String),

    #[error("out of bounds memory access: {len} bytes at {ptr:#x}")]
    MemoryAccess { ptr: u32, len: u32 },

    #[error("failed to read module: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Runtime(#[from] wasmtime::Error),
}

impl BridgeError {
    /// Ownership misuse is a host programming error, never a module failure.
    pub fn is_ownership_violation(&self) -> bool {
        matches!(
            self,
            Self::UseAfterFree | Self::UseAfterMove | Self::DoubleFree | Self::DropAfterMove
        )
    }

    /// Recovers a host-raised error (e.g. a module panic) from a trap.
    pub(crate) fn from_trap(error: wasmtime::Error) -> Self {
        match error.downcast::<BridgeError>() {
            Ok(error) => error,
            Err(error) => Self::Runtime(error),
        }
    }
}
