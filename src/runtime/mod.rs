//! Runtime Lifecycle
//!
//! One process-scoped context object gating every core operation. The
//! runtime owns the loader registry, the name index and the lifecycle
//! state machine; hosts pass it explicitly instead of relying on ambient
//! globals.
//!
//! States: Uninitialized → Initialized → Destroyed, with re-initialize
//! permitted after destroy (starting from a clean registry). Loading,
//! invoking, unloading and resolution are legal only while Initialized.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::dispatch::{CallBuilder, FunctionIndex};
use crate::error::{DispatchError, DispatchResult};
use crate::loader::{HandleId, LoadSource, LoaderFactory, LoaderRegistry};
use crate::value::{TypeTag, Value};

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Created, not yet initialized
    Uninitialized,
    /// Fully operational
    Initialized,
    /// Torn down; only re-initialization is legal
    Destroyed,
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeState::Uninitialized => write!(f, "uninitialized"),
            RuntimeState::Initialized => write!(f, "initialized"),
            RuntimeState::Destroyed => write!(f, "destroyed"),
        }
    }
}

struct HandleEntry {
    loader_tag: String,
    unit: String,
}

/// The process-scoped dispatch context
pub struct Runtime {
    state: RwLock<RuntimeState>,
    config: Arc<ConfigStore>,
    registry: LoaderRegistry,
    index: RwLock<FunctionIndex>,
    handles: RwLock<HashMap<HandleId, HandleEntry>>,
    next_handle: AtomicU64,
}

impl Runtime {
    /// Create an uninitialized runtime with an empty configuration
    pub fn new() -> Self {
        Self::with_config(ConfigStore::new("global"))
    }

    /// Create an uninitialized runtime with the given configuration
    pub fn with_config(config: ConfigStore) -> Self {
        Self {
            state: RwLock::new(RuntimeState::Uninitialized),
            config: Arc::new(config),
            registry: LoaderRegistry::new(),
            index: RwLock::new(FunctionIndex::default()),
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// The configuration collaborator handed to loaders
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Register an additional backend factory under its tag aliases
    pub fn register_loader(&self, aliases: &[&str], factory: LoaderFactory) {
        self.registry.register_factory(aliases, factory);
    }

    /// Transition to Initialized
    ///
    /// Idempotent: initializing an initialized runtime is a no-op
    /// success. Re-initializing after destroy starts from a clean
    /// registry with no stale descriptors.
    pub fn initialize(&self) -> DispatchResult<()> {
        let mut state = self.state.write();
        if *state == RuntimeState::Initialized {
            return Ok(());
        }
        self.index.write().clear();
        self.handles.write().clear();
        *state = RuntimeState::Initialized;
        info!(target: "polycall::runtime", "runtime initialized");
        Ok(())
    }

    /// Tear down every live loader and transition to Destroyed
    ///
    /// Idempotent. Callers must quiesce outstanding invokes first;
    /// teardown does not wait for them.
    pub fn destroy(&self) -> DispatchResult<()> {
        let mut state = self.state.write();
        if *state == RuntimeState::Destroyed {
            return Ok(());
        }
        self.registry.destroy_all();
        self.index.write().clear();
        self.handles.write().clear();
        *state = RuntimeState::Destroyed;
        info!(target: "polycall::runtime", "runtime destroyed");
        Ok(())
    }

    fn ensure_initialized(&self) -> DispatchResult<()> {
        let state = *self.state.read();
        if state == RuntimeState::Initialized {
            Ok(())
        } else {
            Err(DispatchError::Lifecycle(state))
        }
    }

    /// Load source files under the given language tag
    pub fn load_from_file<P: AsRef<Path>>(&self, tag: &str, paths: &[P]) -> DispatchResult<HandleId> {
        let sources = paths
            .iter()
            .map(|p| LoadSource::Path(p.as_ref().to_path_buf()))
            .collect();
        self.load_sources(tag, sources)
    }

    /// Load an in-memory source buffer under the given language tag
    pub fn load_from_memory(&self, tag: &str, name: &str, source: &str) -> DispatchResult<HandleId> {
        self.load_sources(
            tag,
            vec![LoadSource::Memory {
                name: name.to_string(),
                source: source.to_string(),
            }],
        )
    }

    fn load_sources(&self, tag: &str, sources: Vec<LoadSource>) -> DispatchResult<HandleId> {
        self.ensure_initialized()?;
        if sources.is_empty() {
            return Err(DispatchError::Load("no sources provided".to_string()));
        }

        let cell = self.registry.resolve(tag, &self.config)?;
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let unit = sources[0].unit_name();

        // Backend failure here leaves no trace: descriptors only reach
        // the index after the whole unit has loaded.
        let exports = cell.lock().load(handle, &sources)?;
        let count = exports.len();
        self.index.write().register(handle, cell.tag(), exports);
        self.handles.write().insert(
            handle,
            HandleEntry {
                loader_tag: cell.tag().to_string(),
                unit: unit.clone(),
            },
        );

        info!(
            target: "polycall::runtime",
            tag = %cell.tag(),
            unit = %unit,
            handle,
            functions = count,
            "unit loaded"
        );
        Ok(handle)
    }

    /// Unload a handle, dropping its descriptors and backend resources
    ///
    /// A second unload of the same handle is reported as an error, not
    /// silently accepted.
    pub fn unload(&self, handle: HandleId) -> DispatchResult<()> {
        self.ensure_initialized()?;
        let entry = self
            .handles
            .write()
            .remove(&handle)
            .ok_or_else(|| DispatchError::Load(format!("handle {} is not loaded", handle)))?;

        self.index.write().remove_handle(handle);
        if let Some(cell) = self.registry.get(&entry.loader_tag) {
            cell.lock().unload(handle)?;
        } else {
            warn!(
                target: "polycall::runtime",
                tag = %entry.loader_tag,
                handle,
                "owning loader already gone"
            );
        }
        debug!(target: "polycall::runtime", unit = %entry.unit, handle, "unit unloaded");
        Ok(())
    }

    /// Resolve and invoke by name with an optional signature hint
    ///
    /// Ownership of `args` transfers to the callee's marshaling step; on
    /// success the returned value is owned by the caller.
    pub fn invoke_by_name(
        &self,
        name: &str,
        hint: Option<&[TypeTag]>,
        args: Vec<Value>,
    ) -> DispatchResult<Value> {
        self.ensure_initialized()?;
        let descriptor = self.index.read().resolve(name, hint, args.len())?;
        let cell = self
            .registry
            .get(&descriptor.loader_tag)
            .ok_or_else(|| DispatchError::NoLoaderAvailable(descriptor.loader_tag.clone()))?;

        debug!(target: "polycall::dispatch", function = %descriptor, "dispatching");
        // Exclusion section: at most one in-flight call per loader; the
        // guard releases on every exit path.
        let result = cell.lock().invoke(&descriptor, args);
        if let Err(err) = &result {
            debug!(target: "polycall::dispatch", function = %descriptor, %err, "call failed");
        }
        result
    }

    /// Untyped convenience entry point, arity-only matching
    pub fn invoke_dynamic(&self, name: &str, args: Vec<Value>) -> DispatchResult<Value> {
        self.invoke_by_name(name, None, args)
    }

    /// Start a typed call builder
    pub fn call(&self, name: impl Into<String>) -> CallBuilder<'_> {
        CallBuilder::new(self, name)
    }

    /// Number of distinct resolvable function names
    pub fn function_count(&self) -> usize {
        self.index.read().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_gating() {
        let runtime = Runtime::new();
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);

        let err = runtime
            .invoke_dynamic("anything", vec![])
            .unwrap_err();
        assert_eq!(err, DispatchError::Lifecycle(RuntimeState::Uninitialized));

        runtime.initialize().unwrap();
        runtime.destroy().unwrap();
        let err = runtime.invoke_dynamic("anything", vec![]).unwrap_err();
        assert_eq!(err, DispatchError::Lifecycle(RuntimeState::Destroyed));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let runtime = Runtime::new();
        runtime.initialize().unwrap();
        runtime
            .load_from_memory("expr", "m", "fn one() -> long = 1;")
            .unwrap();
        // A second initialize must not wipe live state.
        runtime.initialize().unwrap();
        assert_eq!(runtime.function_count(), 1);
    }

    #[test]
    fn test_reinitialize_after_destroy_is_clean() {
        let runtime = Runtime::new();
        runtime.initialize().unwrap();
        runtime
            .load_from_memory("expr", "m", "fn one() -> long = 1;")
            .unwrap();
        runtime.destroy().unwrap();
        runtime.destroy().unwrap(); // idempotent

        runtime.initialize().unwrap();
        assert_eq!(runtime.function_count(), 0);
        let err = runtime.invoke_dynamic("one", vec![]).unwrap_err();
        assert_eq!(err, DispatchError::FunctionNotFound("one".to_string()));
    }

    #[test]
    fn test_load_outside_initialized_has_no_effect() {
        let runtime = Runtime::new();
        let err = runtime
            .load_from_memory("expr", "m", "fn one() -> long = 1;")
            .unwrap_err();
        assert!(matches!(err, DispatchError::Lifecycle(_)));

        runtime.initialize().unwrap();
        assert_eq!(runtime.function_count(), 0);
    }

    #[test]
    fn test_unload_removes_descriptors() {
        let runtime = Runtime::new();
        runtime.initialize().unwrap();
        let handle = runtime
            .load_from_memory("expr", "m", "fn gone() -> long = 1;")
            .unwrap();
        assert!(runtime.invoke_dynamic("gone", vec![]).is_ok());

        runtime.unload(handle).unwrap();
        let err = runtime.invoke_dynamic("gone", vec![]).unwrap_err();
        assert_eq!(err, DispatchError::FunctionNotFound("gone".to_string()));

        // Unloading twice is detected, not ignored.
        assert!(runtime.unload(handle).is_err());
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let runtime = Runtime::new();
        runtime.initialize().unwrap();
        let err = runtime
            .load_from_memory("expr", "bad", "fn broken( = ;")
            .unwrap_err();
        assert!(matches!(err, DispatchError::Load(_)));
        assert_eq!(runtime.function_count(), 0);
    }
}
