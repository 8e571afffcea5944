//! Loader Registry
//!
//! Maps a language tag (or file-extension alias) to a lazily constructed
//! loader instance. At most one live instance exists per canonical tag;
//! construction happens inside the registry write lock so concurrent
//! resolutions of the same tag observe a single instance.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use super::{expr, mock, native, Loader};
use crate::config::ConfigStore;
use crate::error::{DispatchError, DispatchResult};

/// Constructor for a backend instance
pub type LoaderFactory = fn() -> Box<dyn Loader>;

#[derive(Clone)]
struct FactoryEntry {
    canonical: String,
    factory: LoaderFactory,
}

/// A live loader instance plus its invoke exclusion section
///
/// Most foreign runtimes are not reentrant from multiple threads; the
/// mutex guarantees at most one in-flight call per instance. Calls into
/// different loaders proceed concurrently.
pub struct LoaderCell {
    tag: String,
    inner: Mutex<Box<dyn Loader>>,
}

impl std::fmt::Debug for LoaderCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderCell")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl LoaderCell {
    /// Canonical tag of the held instance
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Enter the exclusion section
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Loader>> {
        self.inner.lock()
    }
}

/// Tag-to-loader table with lazy, race-safe construction
pub struct LoaderRegistry {
    factories: RwLock<HashMap<String, FactoryEntry>>,
    instances: RwLock<HashMap<String, Arc<LoaderCell>>>,
}

impl LoaderRegistry {
    /// Create a registry with the built-in backends pre-registered
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        };
        registry.register_factory(expr::TAG_ALIASES, || Box::new(expr::ExprLoader::new()));
        registry.register_factory(mock::TAG_ALIASES, || Box::new(mock::MockLoader::new()));
        registry.register_factory(native::TAG_ALIASES, || {
            Box::new(native::NativeLoader::new())
        });
        registry
    }

    /// Register a backend factory under its tag aliases
    ///
    /// The first alias is the canonical tag. Re-registering an alias
    /// replaces the factory for future resolutions; already-constructed
    /// instances are unaffected.
    pub fn register_factory(&self, aliases: &[&str], factory: LoaderFactory) {
        let canonical = aliases[0].to_string();
        let mut factories = self.factories.write();
        for alias in aliases {
            factories.insert(
                alias.to_string(),
                FactoryEntry {
                    canonical: canonical.clone(),
                    factory,
                },
            );
        }
    }

    /// Resolve a tag to its loader instance, constructing lazily
    pub fn resolve(&self, tag: &str, config: &ConfigStore) -> DispatchResult<Arc<LoaderCell>> {
        let entry = self
            .factories
            .read()
            .get(tag)
            .cloned()
            .ok_or_else(|| DispatchError::NoLoaderAvailable(tag.to_string()))?;

        if let Some(cell) = self.instances.read().get(&entry.canonical) {
            return Ok(Arc::clone(cell));
        }

        // Construction is the critical section: a racing resolution for
        // the same tag blocks here and then observes the stored instance.
        let mut instances = self.instances.write();
        if let Some(cell) = instances.get(&entry.canonical) {
            return Ok(Arc::clone(cell));
        }

        let mut loader = (entry.factory)();
        loader.initialize(config)?;
        debug!(target: "polycall::loader", tag = %entry.canonical, "loader initialized");

        let cell = Arc::new(LoaderCell {
            tag: entry.canonical.clone(),
            inner: Mutex::new(loader),
        });
        instances.insert(entry.canonical, Arc::clone(&cell));
        Ok(cell)
    }

    /// Get an already-constructed instance without constructing
    pub fn get(&self, canonical_tag: &str) -> Option<Arc<LoaderCell>> {
        self.instances.read().get(canonical_tag).cloned()
    }

    /// Snapshot of all live instances
    pub fn instances(&self) -> Vec<Arc<LoaderCell>> {
        self.instances.read().values().cloned().collect()
    }

    /// Tear down every live instance and clear the table
    ///
    /// Backend teardown failures are reported and do not stop the sweep.
    pub fn destroy_all(&self) {
        let cells: Vec<Arc<LoaderCell>> = {
            let mut instances = self.instances.write();
            instances.drain().map(|(_, cell)| cell).collect()
        };
        for cell in cells {
            if let Err(err) = cell.lock().destroy() {
                warn!(target: "polycall::loader", tag = %cell.tag(), %err, "loader teardown failed");
            }
        }
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    /// Check if no instance has been constructed yet
    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag() {
        let registry = LoaderRegistry::new();
        let config = ConfigStore::new("test");
        let err = registry.resolve("cobol", &config).unwrap_err();
        assert_eq!(err, DispatchError::NoLoaderAvailable("cobol".to_string()));
    }

    #[test]
    fn test_lazy_single_instance() {
        let registry = LoaderRegistry::new();
        let config = ConfigStore::new("test");
        assert!(registry.is_empty());

        let first = registry.resolve("mock", &config).unwrap();
        let second = registry.resolve("mock", &config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_alias_resolves_to_one_instance() {
        let registry = LoaderRegistry::new();
        let config = ConfigStore::new("test");

        let by_tag = registry.resolve("native", &config).unwrap();
        let by_ext = registry.resolve("so", &config).unwrap();
        assert!(Arc::ptr_eq(&by_tag, &by_ext));
        assert_eq!(by_ext.tag(), "native");
    }

    #[test]
    fn test_concurrent_resolution_single_instance() {
        let registry = Arc::new(LoaderRegistry::new());
        let config = Arc::new(ConfigStore::new("test"));

        let mut threads = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let config = Arc::clone(&config);
            threads.push(std::thread::spawn(move || {
                registry.resolve("expr", &config).unwrap()
            }));
        }
        let cells: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        for cell in &cells[1..] {
            assert!(Arc::ptr_eq(&cells[0], cell));
        }
    }

    #[test]
    fn test_destroy_all_clears_instances() {
        let registry = LoaderRegistry::new();
        let config = ConfigStore::new("test");
        registry.resolve("mock", &config).unwrap();
        registry.resolve("expr", &config).unwrap();
        assert_eq!(registry.len(), 2);

        registry.destroy_all();
        assert!(registry.is_empty());
    }
}
