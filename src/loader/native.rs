//! Native Shared-Library Backend
//!
//! Loads C-ABI shared libraries through `libloading`. Shared objects do
//! not carry portable signature metadata, so each library ships a JSON
//! sidecar manifest declaring its exports:
//!
//! ```json
//! {
//!     "library": "libdemo.so",
//!     "exports": [
//!         { "name": "add", "params": ["long", "long"], "returns": "long" }
//!     ]
//! }
//! ```
//!
//! Arguments and results cross the boundary as 64-bit words: integers
//! sign-extended, floats as their bit patterns. Only scalar tags are
//! marshalable; anything else fails at the boundary, not in the callee.

use std::collections::HashMap;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::descriptor::{Export, FunctionDescriptor, HandleId};
use super::{LoadSource, Loader};
use crate::config::ConfigStore;
use crate::error::{DispatchError, DispatchResult, InvocationError};
use crate::value::{TypeTag, Value};

/// Canonical tag plus file-extension aliases
pub const TAG_ALIASES: &[&str] = &["native", "so", "dylib", "dll"];

/// Most parameters a native call site supports
const MAX_ARITY: usize = 6;

/// Sidecar manifest declaring a library's exports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeManifest {
    /// Library file name or path, resolved against the search paths
    pub library: String,
    /// Declared entry points
    #[serde(default)]
    pub exports: Vec<NativeExportDecl>,
}

/// One declared entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeExportDecl {
    /// Registered function name
    pub name: String,
    /// Symbol to bind; defaults to the function name
    #[serde(default)]
    pub symbol: Option<String>,
    /// Parameter type names
    #[serde(default)]
    pub params: Vec<String>,
    /// Return type name; defaults to dynamic
    #[serde(default)]
    pub returns: Option<String>,
}

impl NativeManifest {
    /// Parse a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

struct ResolvedExport {
    params: Vec<TypeTag>,
    ret: TypeTag,
    address: usize,
}

struct LoadedLibrary {
    // Never read after load; keeps the mapping alive until unload.
    _library: Library,
    exports: HashMap<String, ResolvedExport>,
}

/// The native shared-library loader
pub struct NativeLoader {
    initialized: bool,
    search_paths: Vec<PathBuf>,
    units: HashMap<HandleId, LoadedLibrary>,
}

impl NativeLoader {
    /// Create an uninitialized instance
    pub fn new() -> Self {
        Self {
            initialized: false,
            search_paths: Vec::new(),
            units: HashMap::new(),
        }
    }

    fn find_library(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.exists() {
            return Some(direct.to_path_buf());
        }
        for search_path in &self.search_paths {
            let full = search_path.join(name);
            if full.exists() {
                return Some(full);
            }
        }
        None
    }

    fn resolve_manifest(
        &self,
        handle: HandleId,
        manifest: &NativeManifest,
    ) -> DispatchResult<LoadedLibrary> {
        // Fall back to the bare name so the system loader can apply its
        // own search semantics (multiarch dirs, ld cache).
        let path = self
            .find_library(&manifest.library)
            .unwrap_or_else(|| PathBuf::from(&manifest.library));

        // Loading a shared object runs arbitrary constructor code; the
        // caller vouches for the library by listing it in a manifest.
        let library = unsafe {
            Library::new(&path).map_err(|e| {
                DispatchError::Load(format!("failed to load '{}': {}", path.display(), e))
            })?
        };

        let mut exports = HashMap::new();
        for decl in &manifest.exports {
            if decl.params.len() > MAX_ARITY {
                return Err(DispatchError::Load(format!(
                    "'{}' declares {} parameters, at most {} are supported",
                    decl.name,
                    decl.params.len(),
                    MAX_ARITY
                )));
            }
            let params = decl
                .params
                .iter()
                .map(|t| {
                    TypeTag::from_str(t).ok_or_else(|| {
                        DispatchError::Load(format!("'{}': unknown type '{}'", decl.name, t))
                    })
                })
                .collect::<DispatchResult<Vec<_>>>()?;
            let ret = match &decl.returns {
                Some(t) => TypeTag::from_str(t).ok_or_else(|| {
                    DispatchError::Load(format!("'{}': unknown type '{}'", decl.name, t))
                })?,
                None => TypeTag::Any,
            };

            // Bind eagerly so a missing symbol fails the whole load
            // instead of the first call.
            let symbol_name = decl.symbol.as_deref().unwrap_or(&decl.name);
            let c_name = CString::new(symbol_name).map_err(|_| {
                DispatchError::Load(format!("invalid symbol name '{}'", symbol_name))
            })?;
            let address = unsafe {
                let symbol: Symbol<'_, *const ()> =
                    library.get(c_name.as_bytes_with_nul()).map_err(|e| {
                        DispatchError::Load(format!(
                            "symbol '{}' not found in '{}': {}",
                            symbol_name,
                            path.display(),
                            e
                        ))
                    })?;
                *symbol as usize
            };

            if exports.contains_key(&decl.name) {
                return Err(DispatchError::Load(format!(
                    "duplicate export '{}'",
                    decl.name
                )));
            }
            exports.insert(
                decl.name.clone(),
                ResolvedExport {
                    params,
                    ret,
                    address,
                },
            );
        }

        debug!(
            target: "polycall::loader",
            handle,
            library = %path.display(),
            exports = exports.len(),
            "native library loaded"
        );

        Ok(LoadedLibrary {
            _library: library,
            exports,
        })
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn marshal_word(value: Value, tag: TypeTag) -> DispatchResult<u64> {
    let value = if tag == TypeTag::Any {
        value
    } else {
        value.convert(tag)?
    };
    match value {
        Value::Bool(b) => Ok(u64::from(b)),
        Value::Short(v) => Ok(v as i64 as u64),
        Value::Int(v) => Ok(v as i64 as u64),
        Value::Long(v) => Ok(v as u64),
        Value::Float(v) => Ok(u64::from(v.to_bits())),
        Value::Double(v) => Ok(v.to_bits()),
        other => Err(InvocationError::Marshal(format!(
            "{} cannot cross the native boundary",
            other.tag()
        ))
        .into()),
    }
}

fn unmarshal_word(word: u64, tag: TypeTag) -> Value {
    match tag {
        TypeTag::Bool => Value::Bool(word != 0),
        TypeTag::Short => Value::Short(word as u16 as i16),
        TypeTag::Int => Value::Int(word as u32 as i32),
        TypeTag::Long => Value::Long(word as i64),
        TypeTag::Float => Value::Float(f32::from_bits(word as u32)),
        TypeTag::Double => Value::Double(f64::from_bits(word)),
        TypeTag::Null => Value::Null,
        // Dynamic returns surface as the raw word.
        _ => Value::Long(word as i64),
    }
}

/// Call a bound symbol with up to [`MAX_ARITY`] word arguments
///
/// The words slice length was validated against the declaration at load
/// time; the signature is whatever the manifest vouched for.
unsafe fn call_words(address: usize, words: &[u64]) -> u64 {
    match words {
        [] => {
            type Fn0 = extern "C" fn() -> u64;
            let f: Fn0 = std::mem::transmute(address);
            f()
        }
        [a] => {
            type Fn1 = extern "C" fn(u64) -> u64;
            let f: Fn1 = std::mem::transmute(address);
            f(*a)
        }
        [a, b] => {
            type Fn2 = extern "C" fn(u64, u64) -> u64;
            let f: Fn2 = std::mem::transmute(address);
            f(*a, *b)
        }
        [a, b, c] => {
            type Fn3 = extern "C" fn(u64, u64, u64) -> u64;
            let f: Fn3 = std::mem::transmute(address);
            f(*a, *b, *c)
        }
        [a, b, c, d] => {
            type Fn4 = extern "C" fn(u64, u64, u64, u64) -> u64;
            let f: Fn4 = std::mem::transmute(address);
            f(*a, *b, *c, *d)
        }
        [a, b, c, d, e] => {
            type Fn5 = extern "C" fn(u64, u64, u64, u64, u64) -> u64;
            let f: Fn5 = std::mem::transmute(address);
            f(*a, *b, *c, *d, *e)
        }
        [a, b, c, d, e, g] => {
            type Fn6 = extern "C" fn(u64, u64, u64, u64, u64, u64) -> u64;
            let f: Fn6 = std::mem::transmute(address);
            f(*a, *b, *c, *d, *e, *g)
        }
        _ => 0,
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(ld_path.split(':').map(PathBuf::from));
        }
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/lib"));
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(dyld_path.split(':').map(PathBuf::from));
        }
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("PATH") {
            paths.extend(path.split(';').map(PathBuf::from));
        }
    }

    paths
}

impl Loader for NativeLoader {
    fn tag(&self) -> &str {
        TAG_ALIASES[0]
    }

    fn initialize(&mut self, config: &ConfigStore) -> DispatchResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.search_paths = default_search_paths();
        if let Some(extra) = config.get("native_search_paths").and_then(|v| v.as_array()) {
            for path in extra {
                if let Some(s) = path.as_str() {
                    self.search_paths.push(PathBuf::from(s));
                }
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn load(&mut self, handle: HandleId, sources: &[LoadSource]) -> DispatchResult<Vec<Export>> {
        // One library per handle; multi-source units are not meaningful
        // for shared objects.
        let source = match sources {
            [single] => single,
            _ => {
                return Err(DispatchError::Load(
                    "native units load exactly one manifest".to_string(),
                ))
            }
        };

        let manifest_text = match source {
            LoadSource::Path(path) => std::fs::read_to_string(path)
                .map_err(|e| DispatchError::Load(format!("{}: {}", path.display(), e)))?,
            LoadSource::Memory { source, .. } => source.clone(),
        };
        let manifest = NativeManifest::from_json(&manifest_text)
            .map_err(|e| DispatchError::Load(format!("invalid manifest: {}", e)))?;

        let loaded = self.resolve_manifest(handle, &manifest)?;
        let exports = loaded
            .exports
            .iter()
            .map(|(name, resolved)| Export::new(name, resolved.params.clone(), resolved.ret))
            .collect();
        self.units.insert(handle, loaded);
        Ok(exports)
    }

    fn invoke(
        &mut self,
        descriptor: &FunctionDescriptor,
        args: Vec<Value>,
    ) -> DispatchResult<Value> {
        let library = self.units.get(&descriptor.handle).ok_or_else(|| {
            InvocationError::Foreign(format!("unit of '{}' is no longer loaded", descriptor.name))
        })?;
        let export = library.exports.get(&descriptor.name).ok_or_else(|| {
            InvocationError::Foreign(format!("'{}' is no longer bound", descriptor.name))
        })?;

        if args.len() != export.params.len() {
            return Err(InvocationError::Marshal(format!(
                "'{}' takes {} arguments, got {}",
                descriptor.name,
                export.params.len(),
                args.len()
            ))
            .into());
        }

        let mut words = Vec::with_capacity(args.len());
        for (arg, tag) in args.into_iter().zip(export.params.iter()) {
            words.push(marshal_word(arg, *tag)?);
        }

        let word = unsafe { call_words(export.address, &words) };
        Ok(unmarshal_word(word, export.ret))
    }

    fn unload(&mut self, handle: HandleId) -> DispatchResult<()> {
        // Dropping the library unmaps it.
        self.units.remove(&handle);
        Ok(())
    }

    fn destroy(&mut self) -> DispatchResult<()> {
        self.units.clear();
        self.initialized = false;
        Ok(())
    }
}
