//! Call Dispatcher
//!
//! Resolves a name (plus an optional ordered type-signature hint) to a
//! registered descriptor and performs the cross-boundary call through the
//! owning loader's exclusion section. Resolution is last-loaded-wins:
//! among matching candidates the most recently registered descriptor is
//! chosen, so later loads shadow earlier ones of the same name.


use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DispatchError, DispatchResult};
use crate::loader::descriptor::{Export, FunctionDescriptor, HandleId};
use crate::runtime::Runtime;
use crate::value::{TypeTag, Value};

/// Registration-ordered name index over all live descriptors
#[derive(Default)]
pub(crate) struct FunctionIndex {
    by_name: HashMap<String, Vec<Arc<FunctionDescriptor>>>,
    next_seq: u64,
}

impl FunctionIndex {
    /// Register a handle's discovered exports, all or nothing
    pub(crate) fn register(&mut self, handle: HandleId, loader_tag: &str, exports: Vec<Export>) {
        for export in exports {
            let descriptor = Arc::new(FunctionDescriptor {
                name: export.name,
                params: export.params,
                ret: export.ret,
                handle,
                loader_tag: loader_tag.to_string(),
                seq: self.next_seq,
            });
            self.next_seq += 1;
            self.by_name
                .entry(descriptor.name.clone())
                .or_default()
                .push(descriptor);
        }
    }

    /// Drop every descriptor owned by a handle
    pub(crate) fn remove_handle(&mut self, handle: HandleId) {
        self.by_name.retain(|_, list| {
            list.retain(|d| d.handle != handle);
            !list.is_empty()
        });
    }

    /// Drop everything
    pub(crate) fn clear(&mut self) {
        self.by_name.clear();
    }

    /// Resolve a call target
    ///
    /// With a hint, an exact tag-for-tag match wins over wildcard
    /// (`any`) matches. Without one, matching is arity-only. Either way
    /// ties break to the most recent registration.
    pub(crate) fn resolve(
        &self,
        name: &str,
        hint: Option<&[TypeTag]>,
        arity: usize,
    ) -> DispatchResult<Arc<FunctionDescriptor>> {
        let candidates = self
            .by_name
            .get(name)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| DispatchError::FunctionNotFound(name.to_string()))?;

        let best = match hint {
            Some(tags) => candidates
                .iter()
                .filter(|d| d.params.as_slice() == tags)
                .max_by_key(|d| d.seq)
                .or_else(|| {
                    candidates
                        .iter()
                        .filter(|d| d.matches_hint(tags))
                        .max_by_key(|d| d.seq)
                }),
            None => candidates
                .iter()
                .filter(|d| d.arity() == arity)
                .max_by_key(|d| d.seq),
        };

        best.cloned().ok_or_else(|| DispatchError::SignatureMismatch {
            name: name.to_string(),
            given: match hint {
                Some(tags) => tags
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                None => format!("{} arguments", arity),
            },
        })
    }

    /// Number of distinct registered names
    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }
}

/// Typed call builder
///
/// Collects an ordered sequence of (tag, value) pairs ahead of the call.
/// Calls built only with [`CallBuilder::arg`] dispatch untyped
/// (arity-only matching); one [`CallBuilder::arg_tagged`] opts the whole
/// call into signature-hint resolution.
pub struct CallBuilder<'r> {
    runtime: &'r Runtime,
    name: String,
    tags: Vec<TypeTag>,
    args: Vec<Value>,
    typed: bool,
}

impl<'r> CallBuilder<'r> {
    pub(crate) fn new(runtime: &'r Runtime, name: impl Into<String>) -> Self {
        Self {
            runtime,
            name: name.into(),
            tags: Vec::new(),
            args: Vec::new(),
            typed: false,
        }
    }

    /// Append an argument, hinting its own tag
    pub fn arg(mut self, value: Value) -> Self {
        self.tags.push(value.tag());
        self.args.push(value);
        self
    }

    /// Append an argument under an explicit tag
    pub fn arg_tagged(mut self, tag: TypeTag, value: Value) -> Self {
        self.typed = true;
        self.tags.push(tag);
        self.args.push(value);
        self
    }

    /// Perform the call, transferring argument ownership to the callee
    pub fn invoke(self) -> DispatchResult<Value> {
        if self.typed {
            self.runtime
                .invoke_by_name(&self.name, Some(&self.tags), self.args)
        } else {
            self.runtime.invoke_dynamic(&self.name, self.args)
        }
    }
}
