use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Serialize, Serializer};

use crate::EvalError;
use crate::complex::Complex;
use crate::value::Value;

/// Converts any serializable host object into a [`Value`]: maps and structs
/// become Complex trees, sequences become Slices, primitives map onto their
/// obvious variants, unit/None becomes Null.
pub fn to_value<T: Serialize>(v: &T) -> Result<Value, EvalError> {
	let json =
		serde_json::to_value(v).map_err(|e| EvalError::coercion("host value", "value", e))?;
	Ok(json_to_value(&json))
}

fn json_to_value(v: &serde_json::Value) -> Value {
	match v {
		serde_json::Value::Null => Value::Null,
		serde_json::Value::Bool(b) => Value::Bool(*b),
		serde_json::Value::Number(n) => match n.as_u64() {
			Some(u) => Value::Int(u),
			None => Value::Float(n.as_f64().unwrap_or(0.0)),
		},
		serde_json::Value::String(s) => Value::string(s.as_str()),
		serde_json::Value::Array(items) => {
			Value::Slice(items.iter().map(json_to_value).collect())
		},
		serde_json::Value::Object(fields) => {
			let mut c = Complex::new();
			for (k, v) in fields {
				c.set(k, json_to_value(v));
			}
			Value::Complex(c)
		},
	}
}

/// The inverse of [`to_value`]: renders a [`Value`] as JSON. Bytes become a
/// string when they hold UTF-8, base64 otherwise; an unresolved variable
/// renders as its literal name, mirroring its evaluation fallback.
pub fn from_value(v: &Value) -> serde_json::Value {
	match v {
		Value::Null => serde_json::Value::Null,
		Value::Bool(b) => (*b).into(),
		Value::Int(u) => (*u).into(),
		Value::Float(f) => serde_json::Number::from_f64(*f)
			.map(serde_json::Value::Number)
			.unwrap_or(serde_json::Value::Null),
		Value::String(s) => s.as_ref().into(),
		Value::Bytes(b) => match std::str::from_utf8(b) {
			Ok(s) => s.into(),
			Err(_) => BASE64_STANDARD.encode(b).into(),
		},
		Value::Slice(items) => {
			serde_json::Value::Array(items.iter().map(from_value).collect())
		},
		Value::Complex(c) => complex_json(c),
		Value::Variable(var) => var.name.as_ref().into(),
	}
}

pub(crate) fn complex_json(c: &Complex) -> serde_json::Value {
	let mut obj = serde_json::Map::with_capacity(c.attributes().len());
	for (k, v) in c.attributes() {
		obj.insert(k.clone(), from_value(v));
	}
	serde_json::Value::Object(obj)
}

impl Serialize for Value {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		from_value(self).serialize(serializer)
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;
	use serde_json::json;

	use super::*;

	#[test]
	fn complex_to_json() {
		let mut c = Complex::new();
		c.set("hello.world", Value::string("hello world"));
		c.set("hello.world1", Value::string("hello world 1"));
		c.set("hello.world2", Value::Bytes(Bytes::from_static(b"hello world 2")));
		c.set("hello.world3", Value::Int(123));
		c.set("hello.world4", Value::Slice(vec![Value::string("h")]));
		assert_eq!(
			serde_json::to_string(&Value::Complex(c)).unwrap(),
			r#"{"hello":{"world":"hello world","world1":"hello world 1","world2":"hello world 2","world3":123,"world4":["h"]}}"#
		);
	}

	#[test]
	fn json_to_complex() {
		let v = to_value(&json!({
			"hello": {
				"world": "hello world",
				"world3": 123,
				"world4": ["h"],
				"deep": {"flag": true},
			}
		}))
		.unwrap();
		let Value::Complex(c) = v else {
			panic!("expected a complex");
		};
		assert_eq!(c.find("hello.world").as_string().unwrap(), "hello world");
		assert_eq!(c.find("hello.world3").as_int().unwrap(), 123);
		assert_eq!(c.find("hello.world4").as_slice().len(), 1);
		assert!(c.find("hello.deep.flag").as_bool().unwrap());
	}

	#[test]
	fn primitives_round_trip() {
		for v in [
			json!(null),
			json!(true),
			json!(42),
			json!(1.25),
			json!("text"),
			json!([1, 2, 3]),
		] {
			assert_eq!(from_value(&to_value(&v).unwrap()), v);
		}
	}

	#[test]
	fn serializable_structs_become_complex() {
		#[derive(serde::Serialize)]
		struct Upstream {
			addr: String,
			weight: u64,
		}
		let v = to_value(&Upstream {
			addr: "127.0.0.1:6090".to_string(),
			weight: 3,
		})
		.unwrap();
		let Value::Complex(c) = v else {
			panic!("expected a complex");
		};
		assert_eq!(c.find("addr").as_string().unwrap(), "127.0.0.1:6090");
		assert_eq!(c.find("weight").as_int().unwrap(), 3);
	}
}
