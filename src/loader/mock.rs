//! Mock Backend
//!
//! Registers declared exports without executing anything foreign and
//! answers every call with a canned value for the declared return tag.
//! Used to exercise resolution, shadowing and lifecycle paths without a
//! real language runtime.
//!
//! A unit is a list of export declarations, one per line:
//!
//! ```text
//! # demo.mock
//! three_times: (long) -> long
//! greet: (string) -> string
//! ```
//!
//! An empty unit registers a default export set.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;

use super::descriptor::{Export, FunctionDescriptor, HandleId};
use super::{LoadSource, Loader};
use crate::config::ConfigStore;
use crate::error::{DispatchError, DispatchResult, InvocationError};
use crate::value::{TypeTag, Value};

/// Canonical tag plus file-extension aliases
pub const TAG_ALIASES: &[&str] = &["mock"];

static EXPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:\s*\(([^)]*)\)\s*->\s*([A-Za-z0-9_]+)$").unwrap()
});

fn parse_exports(unit: &str, text: &str) -> DispatchResult<Vec<Export>> {
    let mut exports = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let captures = EXPORT_LINE.captures(line).ok_or_else(|| {
            DispatchError::Load(format!("{}:{}: invalid export declaration", unit, number + 1))
        })?;

        let name = captures[1].to_string();
        let mut params = Vec::new();
        let param_list = captures[2].trim();
        if !param_list.is_empty() {
            for tag in param_list.split(',') {
                let tag = tag.trim();
                params.push(TypeTag::from_str(tag).ok_or_else(|| {
                    DispatchError::Load(format!("{}:{}: unknown type '{}'", unit, number + 1, tag))
                })?);
            }
        }
        let ret = TypeTag::from_str(&captures[3]).ok_or_else(|| {
            DispatchError::Load(format!(
                "{}:{}: unknown type '{}'",
                unit,
                number + 1,
                &captures[3]
            ))
        })?;

        if exports.iter().any(|e: &Export| e.name == name) {
            return Err(DispatchError::Load(format!(
                "{}:{}: duplicate export '{}'",
                unit,
                number + 1,
                name
            )));
        }
        exports.push(Export::new(name, params, ret));
    }
    Ok(exports)
}

fn default_exports() -> Vec<Export> {
    vec![
        Export::new("mock_empty", vec![], TypeTag::Long),
        Export::new("mock_hello", vec![], TypeTag::String),
        Export::new("mock_pi", vec![], TypeTag::Double),
    ]
}

fn canned_value(tag: TypeTag) -> Value {
    match tag {
        TypeTag::Bool => Value::Bool(true),
        TypeTag::Short => Value::Short(7),
        TypeTag::Int => Value::Int(65536),
        TypeTag::Long => Value::Long(65536),
        TypeTag::Float => Value::Float(3.1416),
        TypeTag::Double => Value::Double(3.1416),
        TypeTag::String => Value::string("Hello World"),
        TypeTag::Buffer => Value::Buffer(vec![0xde, 0xad, 0xbe, 0xef]),
        TypeTag::Array => Value::Array(Vec::new()),
        TypeTag::Map => Value::Map(Vec::new()),
        TypeTag::Null | TypeTag::Function | TypeTag::Any => Value::Null,
    }
}

/// The mock loader
pub struct MockLoader {
    initialized: bool,
    units: HashMap<HandleId, Vec<Export>>,
}

impl MockLoader {
    /// Create an uninitialized instance
    pub fn new() -> Self {
        Self {
            initialized: false,
            units: HashMap::new(),
        }
    }
}

impl Default for MockLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for MockLoader {
    fn tag(&self) -> &str {
        TAG_ALIASES[0]
    }

    fn initialize(&mut self, _config: &ConfigStore) -> DispatchResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn load(&mut self, handle: HandleId, sources: &[LoadSource]) -> DispatchResult<Vec<Export>> {
        let mut exports = Vec::new();
        for source in sources {
            let unit = source.unit_name();
            let text = match source {
                LoadSource::Path(path) => std::fs::read_to_string(path)
                    .map_err(|e| DispatchError::Load(format!("{}: {}", path.display(), e)))?,
                LoadSource::Memory { source, .. } => source.clone(),
            };
            exports.extend(parse_exports(&unit, &text)?);
        }
        if exports.is_empty() {
            exports = default_exports();
        }

        debug!(target: "polycall::loader", handle, exports = exports.len(), "mock unit loaded");
        self.units.insert(handle, exports.clone());
        Ok(exports)
    }

    fn invoke(
        &mut self,
        descriptor: &FunctionDescriptor,
        args: Vec<Value>,
    ) -> DispatchResult<Value> {
        let exports = self.units.get(&descriptor.handle).ok_or_else(|| {
            InvocationError::Foreign(format!("unit of '{}' is no longer loaded", descriptor.name))
        })?;
        let export = exports
            .iter()
            .find(|e| e.name == descriptor.name)
            .ok_or_else(|| {
                InvocationError::Foreign(format!("'{}' is no longer defined", descriptor.name))
            })?;

        if args.len() != export.params.len() {
            return Err(InvocationError::Marshal(format!(
                "'{}' takes {} arguments, got {}",
                export.name,
                export.params.len(),
                args.len()
            ))
            .into());
        }

        Ok(canned_value(export.ret))
    }

    fn unload(&mut self, handle: HandleId) -> DispatchResult<()> {
        self.units.remove(&handle);
        Ok(())
    }

    fn destroy(&mut self) -> DispatchResult<()> {
        self.units.clear();
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_parsing() {
        let exports = parse_exports(
            "unit",
            "# comment\n\
             three_times: (long) -> long\n\
             greet: (string, string) -> string\n\
             nullary: () -> double\n",
        )
        .unwrap();
        assert_eq!(exports.len(), 3);
        assert_eq!(exports[0].params, vec![TypeTag::Long]);
        assert_eq!(exports[1].params.len(), 2);
        assert_eq!(exports[2].params.len(), 0);
        assert_eq!(exports[2].ret, TypeTag::Double);
    }

    #[test]
    fn test_invalid_declaration() {
        let err = parse_exports("unit", "not a declaration").unwrap_err();
        assert!(matches!(err, DispatchError::Load(_)));

        let err = parse_exports("unit", "f: (gibberish) -> long").unwrap_err();
        assert!(matches!(err, DispatchError::Load(_)));
    }

    #[test]
    fn test_canned_results() {
        let mut loader = MockLoader::new();
        loader.initialize(&ConfigStore::new("test")).unwrap();
        let exports = loader
            .load(
                9,
                &[LoadSource::Memory {
                    name: "unit".to_string(),
                    source: "answer: (long) -> long".to_string(),
                }],
            )
            .unwrap();

        let d = FunctionDescriptor {
            name: exports[0].name.clone(),
            params: exports[0].params.clone(),
            ret: exports[0].ret,
            handle: 9,
            loader_tag: "mock".to_string(),
            seq: 0,
        };
        assert_eq!(loader.invoke(&d, vec![Value::Long(1)]).unwrap(), Value::Long(65536));

        let err = loader.invoke(&d, vec![]).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Invocation(InvocationError::Marshal(_))
        ));
    }

    #[test]
    fn test_empty_unit_gets_default_exports() {
        let mut loader = MockLoader::new();
        loader.initialize(&ConfigStore::new("test")).unwrap();
        let exports = loader
            .load(
                1,
                &[LoadSource::Memory {
                    name: "empty".to_string(),
                    source: String::new(),
                }],
            )
            .unwrap();
        assert!(exports.iter().any(|e| e.name == "mock_hello"));
    }
}
