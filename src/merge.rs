//! Merge resolution for append operations.
//!
//! An append does not know what is already stored at its path: nothing, a
//! scalar, or a collection.  [`resolve`] takes the freshly-read existing
//! value and the incoming value(s) and computes the next value to write.
//! Pure and deterministic; all I/O stays in the database facade.

use serde_json::{Map, Value};

use crate::error::{FirekitError, Result};

/// What an append brings to a path: one scalar, or a sequence of scalars.
#[derive(Debug, Clone)]
pub enum Incoming {
    One(Value),
    Many(Vec<Value>),
}

/// Scalars are strings and integers; anything else is rejected before the
/// merge rules run.
pub(crate) fn is_scalar(value: &Value) -> bool {
    value.is_string() || value.is_i64() || value.is_u64()
}

fn ensure_scalar(value: &Value) -> Result<()> {
    if is_scalar(value) {
        Ok(())
    } else {
        Err(FirekitError::InvalidInput(
            "value must be a string or an integer".to_string(),
        ))
    }
}

/// Computes the next stored value for an append.
///
/// Rules, in order:
/// 1. nothing stored + one scalar: the scalar is stored bare, not wrapped.
/// 2. nothing stored + a sequence: refused; the first value must be scalar.
/// 3. a scalar stored: promoted to a one-element array, then rules 4/5 apply.
/// 4. an array stored + one scalar: appended at the end, order preserved.
/// 5. an array stored + a sequence: the result is an object keying the
///    incoming values by position ("0", "1", ...); the previous array
///    contents are DISCARDED.  This is an overwrite-as-reindex, not a
///    concatenation.
/// 6. anything else stored (object, bool, float): refused rather than
///    guessed at.
pub fn resolve(existing: Option<&Value>, incoming: Incoming) -> Result<Value> {
    match existing {
        None | Some(Value::Null) => match incoming {
            Incoming::One(value) => {
                ensure_scalar(&value)?;
                Ok(value)
            }
            Incoming::Many(_) => Err(FirekitError::SeedNotScalar),
        },
        Some(current) if is_scalar(current) => {
            let promoted = Value::Array(vec![current.clone()]);
            resolve(Some(&promoted), incoming)
        }
        Some(Value::Array(items)) => match incoming {
            Incoming::One(value) => {
                ensure_scalar(&value)?;
                let mut next = items.clone();
                next.push(value);
                Ok(Value::Array(next))
            }
            Incoming::Many(values) => {
                let mut keyed = Map::new();
                for (position, value) in values.into_iter().enumerate() {
                    ensure_scalar(&value)?;
                    keyed.insert(position.to_string(), value);
                }
                Ok(Value::Object(keyed))
            }
        },
        Some(_) => Err(FirekitError::UnexpectedShape),
    }
}
