//! Value Interchange Format
//!
//! Defines the tagged value representation used as the lingua franca for
//! arguments and results crossing a language boundary, plus the type tags
//! used by function descriptors and signature hints.
//!
//! Ownership is single-owner move semantics: passing a [`Value`] by value
//! transfers it to the callee, passing `&Value` is the borrowed-parameter
//! contract, and release happens exactly once in `Drop`.

mod convert;

use std::fmt;

/// Type tags for descriptor parameters, return types and signature hints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Boolean
    Bool,
    /// 16-bit signed integer
    Short,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// Owned string (may contain interior NULs)
    String,
    /// Opaque byte buffer
    Buffer,
    /// Ordered sequence of values
    Array,
    /// Value-to-value mapping, insertion-ordered for iteration
    Map,
    /// Null / invalid marker
    Null,
    /// Reference to a loadable function
    Function,
    /// Wildcard: any parameter type, or a dynamic return type
    Any,
}

impl TypeTag {
    /// Check if this tag is a signed integral type
    pub fn is_integer(&self) -> bool {
        matches!(self, TypeTag::Short | TypeTag::Int | TypeTag::Long)
    }

    /// Check if this tag is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, TypeTag::Float | TypeTag::Double)
    }

    /// Check if this tag is numeric (integral or floating point)
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Parse from a string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Some(TypeTag::Bool),
            "short" | "i16" => Some(TypeTag::Short),
            "int" | "i32" => Some(TypeTag::Int),
            "long" | "i64" => Some(TypeTag::Long),
            "float" | "f32" => Some(TypeTag::Float),
            "double" | "f64" => Some(TypeTag::Double),
            "string" | "str" => Some(TypeTag::String),
            "buffer" | "bytes" => Some(TypeTag::Buffer),
            "array" => Some(TypeTag::Array),
            "map" => Some(TypeTag::Map),
            "null" | "void" => Some(TypeTag::Null),
            "function" | "fn" => Some(TypeTag::Function),
            "any" | "dynamic" => Some(TypeTag::Any),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Short => write!(f, "short"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Long => write!(f, "long"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Double => write!(f, "double"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Buffer => write!(f, "buffer"),
            TypeTag::Array => write!(f, "array"),
            TypeTag::Map => write!(f, "map"),
            TypeTag::Null => write!(f, "null"),
            TypeTag::Function => write!(f, "function"),
            TypeTag::Any => write!(f, "any"),
        }
    }
}

/// Reference to a registered callable, for passing functions as data
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRef {
    /// Registered function name
    pub name: String,
}

impl FunctionRef {
    /// Create a reference to a registered function
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A tagged datum crossing the language boundary
///
/// The tag is fixed at creation; [`Value::convert`] produces a new value
/// rather than mutating in place. Containers own their elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null / invalid marker
    Null,
    /// Boolean
    Bool(bool),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// Owned string
    Str(String),
    /// Opaque byte buffer
    Buffer(Vec<u8>),
    /// Ordered sequence of owned values
    Array(Vec<Value>),
    /// Insertion-ordered association list; lookup is a linear scan
    Map(Vec<(Value, Value)>),
    /// Reference to a loadable function
    Function(FunctionRef),
}

impl Value {
    /// Get the tag of this value
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Short(_) => TypeTag::Short,
            Value::Int(_) => TypeTag::Int,
            Value::Long(_) => TypeTag::Long,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Str(_) => TypeTag::String,
            Value::Buffer(_) => TypeTag::Buffer,
            Value::Array(_) => TypeTag::Array,
            Value::Map(_) => TypeTag::Map,
            Value::Function(_) => TypeTag::Function,
        }
    }

    /// Create a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Check if this is the null marker
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Deep copy, producing a new owned value sharing no elements
    /// with the original
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Widen any integral value to i64
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Widen any floating point value to f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Borrow the string content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the buffer content
    pub fn as_buffer(&self) -> Option<&[u8]> {
        match self {
            Value::Buffer(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Borrow the array elements
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Look up a map entry by key
    ///
    /// Maps preserve insertion order for iteration, not for lookup;
    /// this is a scan over the pairs, first match wins.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
            Value::Buffer(b) => write!(f, "<buffer {} bytes>", b.len()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Function(r) => write!(f, "<function {}>", r.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(TypeTag::from_str("long"), Some(TypeTag::Long));
        assert_eq!(TypeTag::from_str("i64"), Some(TypeTag::Long));
        assert_eq!(TypeTag::from_str("double"), Some(TypeTag::Double));
        assert_eq!(TypeTag::from_str("string"), Some(TypeTag::String));
        assert_eq!(TypeTag::from_str("dynamic"), Some(TypeTag::Any));
        assert_eq!(TypeTag::from_str("unknown"), None);
    }

    #[test]
    fn test_tag_properties() {
        assert!(TypeTag::Long.is_integer());
        assert!(!TypeTag::Long.is_float());
        assert!(TypeTag::Double.is_float());
        assert!(TypeTag::Double.is_numeric());
        assert!(!TypeTag::String.is_numeric());
    }

    #[test]
    fn test_tag_is_fixed_at_creation() {
        let v = Value::Int(5);
        assert_eq!(v.tag(), TypeTag::Int);
        let converted = v.convert(TypeTag::Long).unwrap();
        assert_eq!(converted.tag(), TypeTag::Long);
    }

    #[test]
    fn test_deep_copy_does_not_alias() {
        let original = Value::Array(vec![
            Value::Str("one".to_string()),
            Value::Array(vec![Value::Long(2)]),
        ]);
        let mut copy = original.deep_copy();
        if let Value::Array(items) = &mut copy {
            items[0] = Value::Str("changed".to_string());
        }
        assert_eq!(
            original.as_array().unwrap()[0],
            Value::Str("one".to_string())
        );
    }

    #[test]
    fn test_destroy_is_isolated() {
        // Dropping one value must leave every other live value intact.
        let a = Value::Long(1);
        let b = a.deep_copy();
        drop(a);
        assert_eq!(b, Value::Long(1));
    }

    #[test]
    fn test_map_ordered_iteration_linear_lookup() {
        let map = Value::Map(vec![
            (Value::Str("b".into()), Value::Long(2)),
            (Value::Str("a".into()), Value::Long(1)),
        ]);
        // Iteration preserves insertion order.
        if let Value::Map(pairs) = &map {
            assert_eq!(pairs[0].0, Value::Str("b".into()));
        }
        assert_eq!(
            map.map_get(&Value::Str("a".into())),
            Some(&Value::Long(1))
        );
        assert_eq!(map.map_get(&Value::Str("missing".into())), None);
    }
}
