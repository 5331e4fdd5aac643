use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::complex::Complex;
use crate::context::Context;
use crate::EvalError;

/// A value flowing through the interpreter. The set of variants is closed;
/// every variant answers the whole coercion surface so statements never need
/// to know what they are handed.
///
/// `Variable` is the odd one out: it is a lazy node produced by the parser
/// and only turns into a concrete value once [`Value::resolve`] runs it
/// against a [`Context`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(u64),
	Float(f64),
	String(Arc<str>),
	Bytes(Bytes),
	Slice(Vec<Value>),
	Complex(Complex),
	Variable(Box<Variable>),
}

/// A deferred lookup by (possibly dotted) name, optionally carrying call
/// arguments. Resolution order: value-producing function, then declared
/// variable, then the literal name itself as a String. The last step is what
/// lets bare tokens like `127.0.0.1:6090` act as string literals.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
	pub name: Arc<str>,
	pub args: Vec<Value>,
}

impl Variable {
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Variable {
			name: name.into(),
			args: Vec::new(),
		}
	}

	pub fn resolve(&self, ctx: &Context) -> Result<Value, EvalError> {
		if let Some(f) = ctx.lookup_valued_func(&self.name) {
			let mut args = Vec::with_capacity(self.args.len());
			for a in &self.args {
				args.push(a.resolve(ctx)?);
			}
			return f(ctx, &args);
		}
		if ctx.is_declared(&self.name) {
			return Ok(ctx.get_value(&self.name));
		}
		Ok(Value::String(self.name.clone()))
	}
}

impl Value {
	pub fn string(s: impl Into<Arc<str>>) -> Value {
		Value::String(s.into())
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// The variant name, used in error reporting.
	pub fn kind(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::Float(_) => "float",
			Value::String(_) => "string",
			Value::Bytes(_) => "bytes",
			Value::Slice(_) => "slice",
			Value::Complex(_) => "complex",
			Value::Variable(_) => "variable",
		}
	}

	/// Materializes this value against `ctx`: variables are looked up,
	/// slices resolve elementwise, concrete values pass through.
	pub fn resolve(&self, ctx: &Context) -> Result<Value, EvalError> {
		match self {
			Value::Variable(v) => v.resolve(ctx),
			Value::Slice(items) => {
				let mut out = Vec::with_capacity(items.len());
				for item in items {
					out.push(item.resolve(ctx)?);
				}
				Ok(Value::Slice(out))
			},
			other => Ok(other.clone()),
		}
	}

	pub fn as_int(&self) -> Result<u64, EvalError> {
		match self {
			Value::Null => Ok(0),
			Value::Bool(b) => Ok(*b as u64),
			Value::Int(u) => Ok(*u),
			Value::Float(f) => Ok(*f as u64),
			Value::String(s) => s
				.parse::<u64>()
				.map_err(|e| EvalError::coercion("string", "int", e)),
			Value::Bytes(b) => std::str::from_utf8(b)
				.map_err(|e| EvalError::coercion("bytes", "int", e))?
				.parse::<u64>()
				.map_err(|e| EvalError::coercion("bytes", "int", e)),
			Value::Slice(_) => Err(EvalError::coercion("slice", "int", "not a scalar")),
			Value::Complex(_) => Err(EvalError::coercion("complex", "int", "not a scalar")),
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
		}
	}

	pub fn as_float(&self) -> Result<f64, EvalError> {
		match self {
			Value::Null => Ok(0.0),
			Value::Bool(b) => Ok(*b as u64 as f64),
			Value::Int(u) => Ok(*u as f64),
			Value::Float(f) => Ok(*f),
			Value::String(s) => s
				.parse::<f64>()
				.map_err(|e| EvalError::coercion("string", "float", e)),
			Value::Bytes(_) => Ok(self.as_int()? as f64),
			Value::Slice(_) => Err(EvalError::coercion("slice", "float", "not a scalar")),
			Value::Complex(_) => Err(EvalError::coercion("complex", "float", "not a scalar")),
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
		}
	}

	pub fn as_string(&self) -> Result<String, EvalError> {
		match self {
			Value::Null => Ok(String::new()),
			Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
			Value::Int(u) => Ok(u.to_string()),
			Value::Float(f) => Ok(f.to_string()),
			Value::String(s) => Ok(s.to_string()),
			Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
			Value::Slice(_) => Err(EvalError::coercion("slice", "string", "not a scalar")),
			Value::Complex(c) => c.to_json_string(),
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
		}
	}

	pub fn as_bytes(&self) -> Result<Bytes, EvalError> {
		match self {
			Value::Bytes(b) => Ok(b.clone()),
			Value::Null => Ok(Bytes::new()),
			Value::Slice(_) => Err(EvalError::coercion("slice", "bytes", "not a scalar")),
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
			other => Ok(Bytes::from(other.as_string()?)),
		}
	}

	pub fn as_bool(&self) -> Result<bool, EvalError> {
		match self {
			Value::Null => Ok(false),
			Value::Bool(b) => Ok(*b),
			Value::Int(u) => Ok(*u > 0),
			Value::Float(f) => Ok((*f as u64) > 0),
			Value::String(s) => Ok(s.eq_ignore_ascii_case("true")),
			Value::Bytes(b) => Ok(b.eq_ignore_ascii_case(b"true")),
			Value::Slice(_) => Err(EvalError::coercion("slice", "bool", "not a scalar")),
			Value::Complex(_) => Err(EvalError::coercion("complex", "bool", "not a scalar")),
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
		}
	}

	/// Sequences unwrap to their elements; everything else is a singleton of
	/// itself.
	pub fn as_slice(&self) -> Vec<Value> {
		match self {
			Value::Slice(items) => items.clone(),
			other => vec![other.clone()],
		}
	}

	/// Three-way comparison. Same kinds use natural order; otherwise the
	/// right operand is coerced to the left operand's kind first. `Null`
	/// equals only `Null` and sorts below everything else. Complex values
	/// support equality only.
	pub fn compare(&self, other: &Value) -> Result<Ordering, EvalError> {
		match self {
			Value::Null => Ok(if other.is_null() {
				Ordering::Equal
			} else {
				Ordering::Less
			}),
			Value::Bool(b) => Ok(b.cmp(&other.as_bool()?)),
			Value::Int(u) => Ok(u.cmp(&other.as_int()?)),
			Value::Float(f) => Ok(f.total_cmp(&other.as_float()?)),
			Value::String(s) => Ok(s.as_ref().cmp(other.as_string()?.as_str())),
			Value::Bytes(b) => Ok(b.as_ref().cmp(other.as_bytes()?.as_ref())),
			Value::Slice(items) => {
				let rhs = other.as_slice();
				match items.len().cmp(&rhs.len()) {
					Ordering::Equal => {},
					unequal => return Ok(unequal),
				}
				for (l, r) in items.iter().zip(rhs.iter()) {
					match l.compare(r)? {
						Ordering::Equal => {},
						unequal => return Ok(unequal),
					}
				}
				Ok(Ordering::Equal)
			},
			Value::Complex(c) => match other {
				Value::Complex(o) => Ok(if c.to_json_string()? == o.to_json_string()? {
					Ordering::Equal
				} else {
					Ordering::Greater
				}),
				_ => Err(EvalError::NotComparable("complex", other.kind())),
			},
			Value::Variable(v) => Err(EvalError::Unresolved(v.name.clone())),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<u64> for Value {
	fn from(v: u64) -> Self {
		Value::Int(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(Arc::from(v))
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(Arc::from(v.as_str()))
	}
}

impl From<Bytes> for Value {
	fn from(v: Bytes) -> Self {
		Value::Bytes(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::Slice(v)
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn int_coercions() {
		let i = Value::Int(1234567890);
		assert_eq!(i.as_int().unwrap(), 1234567890);
		assert_eq!(i.as_string().unwrap(), "1234567890");
		assert!(i.as_bool().unwrap());
		assert_eq!(i.as_bytes().unwrap(), Bytes::from_static(b"1234567890"));
		assert_eq!(i.as_float().unwrap(), 1234567890.0);
	}

	#[test]
	fn int_string_round_trip() {
		for u in [0u64, 1, 42, u64::MAX] {
			let s = Value::Int(u).as_string().unwrap();
			assert_eq!(Value::from(s).as_int().unwrap(), u);
		}
	}

	#[test]
	fn null_coercions() {
		assert_eq!(Value::Null.as_int().unwrap(), 0);
		assert_eq!(Value::Null.as_float().unwrap(), 0.0);
		assert_eq!(Value::Null.as_string().unwrap(), "");
		assert!(Value::Null.as_bytes().unwrap().is_empty());
		assert!(!Value::Null.as_bool().unwrap());
	}

	#[test]
	fn bool_coercions() {
		assert_eq!(Value::Bool(true).as_int().unwrap(), 1);
		assert_eq!(Value::Bool(false).as_int().unwrap(), 0);
		assert_eq!(Value::Bool(true).as_string().unwrap(), "true");
		assert_eq!(Value::Bool(false).as_string().unwrap(), "false");
		assert!(Value::from("TRUE").as_bool().unwrap());
		assert!(!Value::from("yes").as_bool().unwrap());
		assert!(Value::Bytes(Bytes::from_static(b"True")).as_bool().unwrap());
	}

	#[test]
	fn non_numeric_string_is_an_error() {
		assert_matches!(
			Value::from("hello.com").as_int(),
			Err(EvalError::Coercion { from: "string", to: "int", .. })
		);
		assert_matches!(
			Value::from("not-a-float").as_float(),
			Err(EvalError::Coercion { .. })
		);
	}

	#[test]
	fn sequence_coercions_fail() {
		let s = Value::Slice(vec![Value::Int(1)]);
		assert_matches!(s.as_int(), Err(EvalError::Coercion { from: "slice", .. }));
		assert_matches!(s.as_bool(), Err(EvalError::Coercion { from: "slice", .. }));
		let c = Value::Complex(Complex::new());
		assert_matches!(c.as_int(), Err(EvalError::Coercion { from: "complex", .. }));
		assert_matches!(c.as_bool(), Err(EvalError::Coercion { from: "complex", .. }));
	}

	#[test]
	fn complex_serializes_to_json() {
		let mut c = Complex::new();
		c.set("a.b", Value::Int(1));
		assert_eq!(Value::Complex(c).as_string().unwrap(), r#"{"a":{"b":1}}"#);
	}

	#[test]
	fn as_slice_wraps_scalars() {
		assert_eq!(Value::Int(1).as_slice(), vec![Value::Int(1)]);
		let s = Value::Slice(vec![Value::Int(1), Value::Int(2)]);
		assert_eq!(s.as_slice().len(), 2);
	}

	#[test]
	fn compare_same_kind() {
		assert_eq!(
			Value::Int(1).compare(&Value::Int(2)).unwrap(),
			Ordering::Less
		);
		assert_eq!(
			Value::from("abc").compare(&Value::from("abc")).unwrap(),
			Ordering::Equal
		);
		assert_eq!(
			Value::Float(2.5).compare(&Value::Float(1.5)).unwrap(),
			Ordering::Greater
		);
	}

	#[test]
	fn compare_coerces_right_to_left() {
		// Left int, right string: the string is parsed.
		assert_eq!(
			Value::Int(200).compare(&Value::from("200")).unwrap(),
			Ordering::Equal
		);
		// Left string, right int: the int is printed.
		assert_eq!(
			Value::from("200").compare(&Value::Int(200)).unwrap(),
			Ordering::Equal
		);
		// Left bool, right string.
		assert_eq!(
			Value::Bool(true).compare(&Value::from("true")).unwrap(),
			Ordering::Equal
		);
	}

	#[test]
	fn compare_null() {
		assert_eq!(
			Value::Null.compare(&Value::Null).unwrap(),
			Ordering::Equal
		);
		assert_eq!(
			Value::Null.compare(&Value::Int(0)).unwrap(),
			Ordering::Less
		);
	}

	#[test]
	fn compare_slices_length_first() {
		let a = Value::Slice(vec![Value::Int(1), Value::Int(2)]);
		let b = Value::Slice(vec![Value::Int(9)]);
		assert_eq!(a.compare(&b).unwrap(), Ordering::Greater);
		let c = Value::Slice(vec![Value::Int(1), Value::Int(3)]);
		assert_eq!(a.compare(&c).unwrap(), Ordering::Less);
		assert_eq!(a.compare(&a).unwrap(), Ordering::Equal);
	}

	#[test]
	fn compare_complex_equality_only() {
		let mut a = Complex::new();
		a.set("x", Value::Int(1));
		let b = a.clone();
		assert_eq!(
			Value::Complex(a.clone())
				.compare(&Value::Complex(b))
				.unwrap(),
			Ordering::Equal
		);
		assert_matches!(
			Value::Complex(a).compare(&Value::Int(1)),
			Err(EvalError::NotComparable(..))
		);
	}
}
