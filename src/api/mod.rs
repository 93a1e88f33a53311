//! Host-side facade over one instantiated module.
//!
//! [`ApiBuilder`] wires the host import set into a [`Linker`] and
//! instantiates the module; [`Api`] then offers the allocator, memory
//! marshaling, resource destructors and the async export wrappers
//! ([`Api::call_future`], [`Api::call_stream`]).

mod calls;
mod imports;
mod memory;

pub use calls::{AbiScalar, ExportFuture, ExportStream, ModuleFuture, ModuleStream};
pub use memory::ModuleBuffer;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc, WasmParams, WasmResults};

use crate::error::BridgeError;
use crate::handle::{Handle, OwnedHandle};
use crate::notifier::NotifierRegistry;

/// Names of the imports the host provides and the exports it relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    pub import_module: String,
    pub notifier_import: String,
    pub log_import: String,
    pub panic_import: String,
    pub memory_export: String,
    pub allocate_export: String,
    pub deallocate_export: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            import_module: "env".to_string(),
            notifier_import: "__notifier_callback".to_string(),
            log_import: "__log".to_string(),
            panic_import: "__panic".to_string(),
            memory_export: "memory".to_string(),
            allocate_export: "allocate".to_string(),
            deallocate_export: "deallocate".to_string(),
        }
    }
}

/// Store data visible to host imports.
pub struct ModuleState {
    registry: Arc<NotifierRegistry>,
    memory_export: String,
}

impl ModuleState {
    pub fn registry(&self) -> &Arc<NotifierRegistry> {
        &self.registry
    }
}

/// Builder for an [`Api`].
pub struct ApiBuilder {
    engine: Engine,
    linker: Linker<ModuleState>,
    registry: Arc<NotifierRegistry>,
    config: BridgeConfig,
}

impl ApiBuilder {
    pub fn new(engine: &Engine) -> Self {
        Self {
            engine: engine.clone(),
            linker: Linker::new(engine),
            registry: Arc::new(NotifierRegistry::new()),
            config: BridgeConfig::default(),
        }
    }

    /// Override import/export names. Takes effect at instantiation.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Linker for host-defined imports beyond the bridge's own.
    pub fn linker(&mut self) -> &mut Linker<ModuleState> {
        &mut self.linker
    }

    /// Instantiate from wasm binary or WAT text.
    pub fn instantiate(self, bytes: impl AsRef<[u8]>) -> Result<Api, BridgeError> {
        let module = Module::new(&self.engine, bytes).map_err(BridgeError::Instantiation)?;
        self.instantiate_module(&module)
    }

    pub fn instantiate_file(self, path: impl AsRef<Path>) -> Result<Api, BridgeError> {
        let bytes = std::fs::read(path)?;
        self.instantiate(bytes)
    }

    /// Reads the module asynchronously, then instantiates it.
    pub async fn fetch(self, path: impl AsRef<Path>) -> Result<Api, BridgeError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "fetching module");
        let bytes = tokio::fs::read(path).await?;
        self.instantiate(bytes)
    }

    pub fn instantiate_module(mut self, module: &Module) -> Result<Api, BridgeError> {
        imports::define(&mut self.linker, &self.config)?;

        let state = ModuleState {
            registry: self.registry.clone(),
            memory_export: self.config.memory_export.clone(),
        };
        let mut store = Store::new(&self.engine, state);
        let instance = self
            .linker
            .instantiate(&mut store, module)
            .map_err(|error| match BridgeError::from_trap(error) {
                BridgeError::Runtime(error) => BridgeError::Instantiation(error),
                error => error,
            })?;
        let memory = instance
            .get_memory(&mut store, &self.config.memory_export)
            .ok_or_else(|| {
                BridgeError::Instantiation(wasmtime::Error::msg(format!(
                    "missing memory export '{}'",
                    self.config.memory_export
                )))
            })?;

        tracing::debug!(
            exports = module.exports().len(),
            imports = module.imports().len(),
            "instantiated module"
        );

        Ok(Api {
            inner: Arc::new(ApiInner {
                store: Mutex::new(store),
                instance,
                memory,
                registry: self.registry,
                config: self.config,
            }),
        })
    }
}

struct ApiInner {
    store: Mutex<Store<ModuleState>>,
    instance: Instance,
    memory: Memory,
    registry: Arc<NotifierRegistry>,
    config: BridgeConfig,
}

/// Shared handle to an instantiated module.
///
/// Cloning is cheap. Export calls are serialized on the store mutex; the
/// notifier import never takes it, so the module may fire slots from inside
/// any export call.
#[derive(Clone)]
pub struct Api {
    inner: Arc<ApiInner>,
}

impl Api {
    pub fn registry(&self) -> &Arc<NotifierRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn typed_func<P, R>(&self, name: &str) -> Result<TypedFunc<P, R>, BridgeError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let mut store = self.store();
        let func = self
            .inner
            .instance
            .get_func(&mut *store, name)
            .ok_or_else(|| BridgeError::ExportNotFound(name.to_string()))?;
        Ok(func.typed::<P, R>(&*store)?)
    }

    pub fn call<P, R>(&self, name: &str, params: P) -> Result<R, BridgeError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self.typed_func::<P, R>(name)?;
        self.invoke(&func, params)
    }

    pub(crate) fn invoke<P, R>(&self, func: &TypedFunc<P, R>, params: P) -> Result<R, BridgeError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let mut store = self.store();
        func.call(&mut *store, params).map_err(BridgeError::from_trap)
    }

    pub fn allocate(&self, size: u32, align: u32) -> Result<u32, BridgeError> {
        let ptr: i32 = self.call(&self.inner.config.allocate_export, (size as i32, align as i32))?;
        Ok(ptr as u32)
    }

    pub fn deallocate(&self, ptr: u32, size: u32, align: u32) -> Result<(), BridgeError> {
        self.call(
            &self.inner.config.deallocate_export,
            (ptr as i32, size as i32, align as i32),
        )
    }

    /// Runs the resource destructor `symbol(flags = 0, handle)`.
    pub fn drop(&self, symbol: &str, handle: Handle) -> Result<(), BridgeError> {
        tracing::trace!(symbol, %handle, "dropping module resource");
        self.call(symbol, (0i32, handle.to_abi()))
    }

    /// Takes ownership of `handle`, released through `drop_symbol`.
    pub fn own(&self, handle: Handle, drop_symbol: impl Into<String>) -> OwnedHandle {
        let api = self.clone();
        let symbol = drop_symbol.into();
        OwnedHandle::new(handle, move |handle| api.drop(&symbol, handle))
    }

    fn store(&self) -> MutexGuard<'_, Store<ModuleState>> {
        self.inner.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}
