//!
//! Positional ("pblite") record decoding.
//!
//! The chat service encodes its messages as nested arrays where a field's meaning is given by
//! its index. Trailing fields are frequently omitted and absent fields are sent as `null`, so
//! every accessor here treats "out of range" and "null" the same way.

use super::types::SchemaError;
use serde_json::Value;

/// A typed record that can be parsed from a positional array.
pub trait Schema: Sized {
	fn parse(value: &Value) -> Result<Self, SchemaError>;
}

/// Element at `index`, or `None` if it is out of range or `null`.
pub fn field(value: &Value, index: usize) -> Option<&Value> {
	value
		.as_array()
		.and_then(|items| items.get(index))
		.filter(|v| !v.is_null())
}

/// Element at `index`, failing if it is absent.
pub fn required<'a>(
	value: &'a Value,
	index: usize,
	name: &'static str,
) -> Result<&'a Value, SchemaError> {
	field(value, index).ok_or(SchemaError::MissingField(name))
}

/// Interpret a value as an unsigned integer. Accepts numeric strings, which protojson uses
/// for 64-bit fields.
pub fn to_u64(value: &Value) -> Option<u64> {
	match value {
		Value::Number(n) => n
			.as_u64()
			.or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
		Value::String(s) => s.parse().ok(),
		_ => None,
	}
}

/// Interpret a value as text. Numbers are rendered, since some header fields arrive either way.
pub fn to_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

pub fn string_field(value: &Value, index: usize, name: &'static str) -> Result<String, SchemaError> {
	to_text(required(value, index, name)?).ok_or(SchemaError::UnexpectedType {
		field: name,
		expected: "string",
	})
}

pub fn optional_string(
	value: &Value,
	index: usize,
	name: &'static str,
) -> Result<Option<String>, SchemaError> {
	match field(value, index) {
		None => Ok(None),
		Some(v) => to_text(v).map(Some).ok_or(SchemaError::UnexpectedType {
			field: name,
			expected: "string",
		}),
	}
}

pub fn integer_field(value: &Value, index: usize, name: &'static str) -> Result<u64, SchemaError> {
	to_u64(required(value, index, name)?).ok_or(SchemaError::UnexpectedType {
		field: name,
		expected: "integer",
	})
}

pub fn optional_integer(
	value: &Value,
	index: usize,
	name: &'static str,
) -> Result<Option<u64>, SchemaError> {
	match field(value, index) {
		None => Ok(None),
		Some(v) => to_u64(v).map(Some).ok_or(SchemaError::UnexpectedType {
			field: name,
			expected: "integer",
		}),
	}
}

/// Boolean flag; `1`/`true` are set, anything else (including absence) is unset.
pub fn flag(value: &Value, index: usize) -> bool {
	match field(value, index) {
		Some(Value::Bool(b)) => *b,
		Some(v) => to_u64(v) == Some(1),
		None => false,
	}
}

pub fn message<T: Schema>(value: &Value, index: usize, name: &'static str) -> Result<T, SchemaError> {
	T::parse(required(value, index, name)?)
}

pub fn optional_message<T: Schema>(value: &Value, index: usize) -> Result<Option<T>, SchemaError> {
	field(value, index).map(T::parse).transpose()
}

/// Repeated sub-message at `index`. Absent means empty.
pub fn repeated<T: Schema>(value: &Value, index: usize, name: &'static str) -> Result<Vec<T>, SchemaError> {
	match field(value, index) {
		None => Ok(Vec::new()),
		Some(Value::Array(items)) => items.iter().map(T::parse).collect(),
		Some(_) => Err(SchemaError::UnexpectedType {
			field: name,
			expected: "array",
		}),
	}
}

pub fn repeated_strings(
	value: &Value,
	index: usize,
	name: &'static str,
) -> Result<Vec<String>, SchemaError> {
	match field(value, index) {
		None => Ok(Vec::new()),
		Some(Value::Array(items)) => items
			.iter()
			.filter(|v| !v.is_null())
			.map(|v| {
				to_text(v).ok_or(SchemaError::UnexpectedType {
					field: name,
					expected: "string",
				})
			})
			.collect(),
		Some(_) => Err(SchemaError::UnexpectedType {
			field: name,
			expected: "array",
		}),
	}
}

/// Require that a record value is an array at all.
pub fn ensure_message(value: &Value, name: &'static str) -> Result<(), SchemaError> {
	if value.is_array() {
		Ok(())
	} else {
		Err(SchemaError::UnexpectedType {
			field: name,
			expected: "array",
		})
	}
}
