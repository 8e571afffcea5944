//! Loader Contract and Built-in Backends
//!
//! A loader is a per-language backend: it owns a foreign runtime context,
//! loads units of source into handles, discovers the entry points each
//! unit exposes and executes calls against them. The dispatcher only ever
//! talks to the [`Loader`] trait; which backend serves a call is decided
//! by the tag the unit was loaded under.

pub mod descriptor;
pub mod expr;
pub mod mock;
pub mod native;
pub mod registry;

pub use descriptor::{Export, FunctionDescriptor, HandleId};
pub use registry::{LoaderFactory, LoaderRegistry};

use std::path::PathBuf;

use crate::config::ConfigStore;
use crate::error::DispatchResult;
use crate::value::Value;

/// One unit of foreign source handed to a loader
#[derive(Debug, Clone)]
pub enum LoadSource {
    /// A file on disk; the path is handed opaquely to the backend
    Path(PathBuf),
    /// An in-memory buffer under a unit name
    Memory {
        /// Unit name used for diagnostics and handle bookkeeping
        name: String,
        /// Source text
        source: String,
    },
}

impl LoadSource {
    /// Unit name for diagnostics
    pub fn unit_name(&self) -> String {
        match self {
            LoadSource::Path(path) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unnamed")
                .to_string(),
            LoadSource::Memory { name, .. } => name.clone(),
        }
    }
}

/// The capability set every language backend must implement
///
/// Implementations are single-threaded by contract: the dispatcher wraps
/// each instance in an exclusion section and guarantees at most one call
/// in flight per loader, so methods take `&mut self` and never need to
/// synchronize internally.
pub trait Loader: Send {
    /// Canonical tag of this backend
    fn tag(&self) -> &str;

    /// Bring up the foreign runtime context
    ///
    /// Idempotent: a second call on an initialized backend returns
    /// without touching foreign state. Initialization parameters come
    /// from the configuration collaborator.
    fn initialize(&mut self, config: &ConfigStore) -> DispatchResult<()>;

    /// Load sources into a new handle and discover its entry points
    ///
    /// All-or-nothing: on failure nothing is retained for the handle and
    /// the error carries the backend diagnostic when one is available.
    fn load(&mut self, handle: HandleId, sources: &[LoadSource]) -> DispatchResult<Vec<Export>>;

    /// Execute one call
    ///
    /// Arguments are marshaled into the foreign representation declared
    /// by the descriptor (or dynamically for `any`), the entry point is
    /// executed, and the foreign result is marshaled back. Foreign-side
    /// unhandled errors come back as
    /// [`InvocationError::Foreign`](crate::error::InvocationError::Foreign),
    /// never as process-level faults.
    fn invoke(&mut self, descriptor: &FunctionDescriptor, args: Vec<Value>)
        -> DispatchResult<Value>;

    /// Release the foreign resources owned by a handle
    ///
    /// Called at most once per handle.
    fn unload(&mut self, handle: HandleId) -> DispatchResult<()>;

    /// Unload all remaining handles and release the runtime context
    ///
    /// Idempotent.
    fn destroy(&mut self) -> DispatchResult<()>;
}
