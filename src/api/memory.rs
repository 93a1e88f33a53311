use wasmtime::{AsContext, Caller, Extern, Memory};

use super::{Api, ModuleState};
use crate::error::BridgeError;

/// A host buffer copied into module memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleBuffer {
    pub ptr: u32,
    pub len: u32,
}

impl Api {
    pub fn read_bytes(&self, ptr: u32, len: u32) -> Result<Vec<u8>, BridgeError> {
        let store = self.store();
        read(self.inner.memory, &*store, ptr, len)
    }

    /// Lossy UTF-8 decode of `len` bytes at `ptr`.
    pub fn read_string(&self, ptr: u32, len: u32) -> Result<String, BridgeError> {
        let bytes = self.read_bytes(ptr, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_bytes(&self, ptr: u32, bytes: &[u8]) -> Result<(), BridgeError> {
        let mut store = self.store();
        self.inner
            .memory
            .write(&mut *store, ptr as usize, bytes)
            .map_err(|_| BridgeError::MemoryAccess {
                ptr,
                len: bytes.len() as u32,
            })
    }

    /// Allocates a byte-aligned buffer in the module and copies `bytes` into it.
    /// The module takes ownership of the allocation.
    pub fn lower_bytes(&self, bytes: &[u8]) -> Result<ModuleBuffer, BridgeError> {
        let len = bytes.len() as u32;
        let ptr = self.allocate(len, 1)?;
        self.write_bytes(ptr, bytes)?;
        Ok(ModuleBuffer { ptr, len })
    }

    /// Copies out an error message the module allocated and frees it with
    /// its capacity. Empty messages carry no allocation.
    pub fn take_error(&self, ptr: u32, len: u32, cap: u32) -> Result<String, BridgeError> {
        let message = self.read_string(ptr, len)?;
        if len > 0 {
            self.deallocate(ptr, cap, 1)?;
        }
        Ok(message)
    }
}

fn read(memory: Memory, store: impl AsContext, ptr: u32, len: u32) -> Result<Vec<u8>, BridgeError> {
    let start = ptr as usize;
    let bytes = start
        .checked_add(len as usize)
        .and_then(|end| memory.data(store.as_context()).get(start..end))
        .ok_or(BridgeError::MemoryAccess { ptr, len })?;
    Ok(bytes.to_vec())
}

/// Reads a string argument from inside a host import.
pub(super) fn read_caller_string(
    caller: &mut Caller<'_, ModuleState>,
    ptr: u32,
    len: u32,
) -> Result<String, BridgeError> {
    let name = caller.data().memory_export.clone();
    let memory = caller
        .get_export(&name)
        .and_then(Extern::into_memory)
        .ok_or(BridgeError::ExportNotFound(name))?;
    let bytes = read(memory, &*caller, ptr, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
