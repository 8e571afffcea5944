//! Dispatch Error Taxonomy
//!
//! Every dispatcher-level operation returns success or failure explicitly;
//! the error kind is the machine-readable "no result" signal embedding
//! hosts branch on.

use thiserror::Error;

use crate::runtime::RuntimeState;
use crate::value::TypeTag;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Error type for dispatcher operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Operation invoked outside the Initialized state
    #[error("operation requires an initialized runtime (state is {0})")]
    Lifecycle(RuntimeState),

    /// No loader registered for the requested tag
    #[error("no loader available for tag '{0}'")]
    NoLoaderAvailable(String),

    /// Foreign source failed to parse or load; carries the backend
    /// diagnostic when one is available
    #[error("failed to load source: {0}")]
    Load(String),

    /// No descriptor matches the requested name
    #[error("function '{0}' not found")]
    FunctionNotFound(String),

    /// The name matched, but no descriptor matches the supplied signature
    #[error("function '{name}' matches no overload for signature ({given})")]
    SignatureMismatch {
        /// Requested function name
        name: String,
        /// The shape the caller supplied
        given: String,
    },

    /// A value has no defined coercion to the required type
    #[error("cannot convert {from} to {to}")]
    TypeMismatch {
        /// Tag of the value being coerced
        from: TypeTag,
        /// Requested target tag
        to: TypeTag,
    },

    /// The foreign call failed; see [`InvocationError`] for which side
    #[error(transparent)]
    Invocation(#[from] InvocationError),

    /// A backend failed to initialize its foreign runtime
    #[error("loader '{tag}' failed to initialize its runtime: {reason}")]
    RuntimeInit {
        /// Loader tag
        tag: String,
        /// Backend diagnostic
        reason: String,
    },
}

/// Failure inside a loader's invoke, split so hosts can tell a fault in
/// the foreign code from a fault at the marshaling boundary
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    /// The foreign function executed and raised an error in its own runtime
    #[error("foreign runtime raised an error: {0}")]
    Foreign(String),

    /// An argument or result could not cross the boundary
    #[error("marshaling failed: {0}")]
    Marshal(String),
}
