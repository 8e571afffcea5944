//! Polycall - Polyglot Call Dispatch
//!
//! A dispatch substrate letting a host process invoke functions
//! implemented by dynamically loaded language backends through a single
//! uniform calling convention. Arguments and results cross the boundary
//! as tagged [`Value`]s; per-language backends implement the [`Loader`]
//! contract and register the entry points they discover into a shared
//! name index.
//!
//! # Features
//!
//! - **Tagged values**: booleans, sized integers, floats, strings,
//!   buffers, arrays, insertion-ordered maps and function references,
//!   with single-owner move semantics
//! - **Pluggable loaders**: one backend per language tag, constructed
//!   lazily and serialized behind a per-loader exclusion section
//! - **Typed resolution**: optional ordered signature hints with
//!   last-loaded-wins shadowing for untyped calls
//! - **Explicit lifecycle**: one runtime context object with an
//!   initialize/destroy state machine, no ambient globals
//!
//! # Example
//!
//! ```rust
//! use polycall::{Runtime, TypeTag, Value};
//!
//! let runtime = Runtime::new();
//! runtime.initialize().unwrap();
//!
//! runtime
//!     .load_from_memory(
//!         "expr",
//!         "math",
//!         "fn multiply(left: int, right: int) -> long = left * right;",
//!     )
//!     .unwrap();
//!
//! let ret = runtime
//!     .call("multiply")
//!     .arg_tagged(TypeTag::Int, Value::Int(5))
//!     .arg_tagged(TypeTag::Int, Value::Int(15))
//!     .invoke()
//!     .unwrap();
//! assert_eq!(ret.as_long(), Some(75));
//!
//! runtime.destroy().unwrap();
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   Values    ┌──────────────┐   resolve    ┌───────────────┐
//! │    Host    │────────────▶│  Dispatcher  │─────────────▶│  Name Index   │
//! └────────────┘             └──────┬───────┘              └───────────────┘
//!                                   │ exclusion section
//!                                   ▼
//!                            ┌──────────────┐   marshal    ┌───────────────┐
//!                            │    Loader    │─────────────▶│ Foreign entry │
//!                            │ (expr/mock/  │◀─────────────│     point     │
//!                            │   native)    │   Value      └───────────────┘
//!                            └──────────────┘
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod runtime;
pub mod value;

// Re-export commonly used types
pub use config::{ConfigError, ConfigResult, ConfigStore};
pub use dispatch::CallBuilder;
pub use error::{DispatchError, DispatchResult, InvocationError};
pub use loader::{
    Export, FunctionDescriptor, HandleId, LoadSource, Loader, LoaderFactory, LoaderRegistry,
};
pub use loader::{expr::ExprLoader, mock::MockLoader, native::NativeLoader};
pub use runtime::{Runtime, RuntimeState};
pub use value::{FunctionRef, TypeTag, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
