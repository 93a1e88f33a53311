use wasmtime::{Caller, Linker};

use super::memory::read_caller_string;
use super::{BridgeConfig, ModuleState};
use crate::error::BridgeError;
use crate::notifier::Slot;

/// Defines the notifier, log and panic imports under `config.import_module`.
pub(super) fn define(linker: &mut Linker<ModuleState>, config: &BridgeConfig) -> Result<(), BridgeError> {
    let module = config.import_module.as_str();

    linker.func_wrap(
        module,
        &config.notifier_import,
        |caller: Caller<'_, ModuleState>, slot: i32| {
            caller.data().registry.dispatch(Slot::from_abi(slot));
        },
    )?;

    linker.func_wrap(
        module,
        &config.log_import,
        |mut caller: Caller<'_, ModuleState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let message = read_caller_string(&mut caller, ptr as u32, len as u32)?;
            tracing::info!(target: "wasm_poll_bridge::module", "{message}");
            Ok(())
        },
    )?;

    linker.func_wrap(
        module,
        &config.panic_import,
        |mut caller: Caller<'_, ModuleState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
            let message = read_caller_string(&mut caller, ptr as u32, len as u32)?;
            tracing::debug!(%message, "module panicked");
            Err(BridgeError::ModulePanic(message).into())
        },
    )?;

    Ok(())
}
