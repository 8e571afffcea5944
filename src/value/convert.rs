//! Value coercions
//!
//! Defined coercions: numeric widening and narrowing, boolean to and from
//! integers, string to and from numerics. Narrowing an integer keeps the
//! low-order bits; float to integer truncates toward zero, saturating at
//! the target bounds; string to numeric fails unless the trimmed text is a
//! valid literal. Everything else is a `TypeMismatch`.

use crate::error::{DispatchError, DispatchResult};

use super::{TypeTag, Value};

impl Value {
    /// Convert this value to the target tag, consuming it
    ///
    /// Converting to the value's own tag or to [`TypeTag::Any`] is the
    /// identity. Undefined coercions (container to scalar, null to
    /// anything, float to bool) fail with
    /// [`DispatchError::TypeMismatch`].
    pub fn convert(self, target: TypeTag) -> DispatchResult<Value> {
        let from = self.tag();
        if from == target || target == TypeTag::Any {
            return Ok(self);
        }

        let mismatch = || DispatchError::TypeMismatch { from, to: target };

        match &self {
            Value::Bool(b) => {
                let n = i64::from(*b);
                match target {
                    TypeTag::Short => Ok(Value::Short(n as i16)),
                    TypeTag::Int => Ok(Value::Int(n as i32)),
                    TypeTag::Long => Ok(Value::Long(n)),
                    TypeTag::String => Ok(Value::Str(b.to_string())),
                    _ => Err(mismatch()),
                }
            }
            Value::Short(_) | Value::Int(_) | Value::Long(_) => {
                // as_long always succeeds for integral tags
                let n = self.as_long().ok_or_else(mismatch)?;
                match target {
                    TypeTag::Bool => Ok(Value::Bool(n != 0)),
                    TypeTag::Short => Ok(Value::Short(n as i16)),
                    TypeTag::Int => Ok(Value::Int(n as i32)),
                    TypeTag::Long => Ok(Value::Long(n)),
                    TypeTag::Float => Ok(Value::Float(n as f32)),
                    TypeTag::Double => Ok(Value::Double(n as f64)),
                    TypeTag::String => Ok(Value::Str(n.to_string())),
                    _ => Err(mismatch()),
                }
            }
            Value::Float(_) | Value::Double(_) => {
                let x = self.as_double().ok_or_else(mismatch)?;
                match target {
                    TypeTag::Short => Ok(Value::Short(x as i16)),
                    TypeTag::Int => Ok(Value::Int(x as i32)),
                    TypeTag::Long => Ok(Value::Long(x as i64)),
                    TypeTag::Float => Ok(Value::Float(x as f32)),
                    TypeTag::Double => Ok(Value::Double(x)),
                    TypeTag::String => Ok(Value::Str(x.to_string())),
                    _ => Err(mismatch()),
                }
            }
            Value::Str(s) => {
                let text = s.trim();
                match target {
                    TypeTag::Short => {
                        text.parse::<i16>().map(Value::Short).map_err(|_| mismatch())
                    }
                    TypeTag::Int => text.parse::<i32>().map(Value::Int).map_err(|_| mismatch()),
                    TypeTag::Long => text.parse::<i64>().map(Value::Long).map_err(|_| mismatch()),
                    TypeTag::Float => {
                        text.parse::<f32>().map(Value::Float).map_err(|_| mismatch())
                    }
                    TypeTag::Double => text
                        .parse::<f64>()
                        .map(Value::Double)
                        .map_err(|_| mismatch()),
                    _ => Err(mismatch()),
                }
            }
            _ => Err(mismatch()),
        }
    }
}
