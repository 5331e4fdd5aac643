use std::sync::Arc;

use base64::Engine;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE};
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;
use vane::{Context, EvalError, Value};

/// The stock value helpers: JSON in and out of the engine's value model,
/// base64, and v4 uuids for request ids. Decode failures log and yield Null
/// rather than aborting the block.
pub fn register(ctx: &Context) {
	ctx.register_valued_func("decode-json", Arc::new(decode_json));
	ctx.register_valued_func("encode-json", Arc::new(encode_json));
	ctx.register_valued_func("decode-base64", Arc::new(decode_base64));
	ctx.register_valued_func("encode-base64", Arc::new(encode_base64));
	ctx.register_valued_func(
		"uuid",
		Arc::new(|_, _| Ok(Value::string(Uuid::new_v4().to_string()))),
	);
}

fn decode_json(_: &Context, args: &[Value]) -> Result<Value, EvalError> {
	let Some(arg) = args.first() else {
		warn!("decode-json needs an argument");
		return Ok(Value::Null);
	};
	let bytes = arg.as_bytes()?;
	match serde_json::from_slice::<serde_json::Value>(&bytes) {
		Ok(v) => vane::to_value(&v),
		Err(e) => {
			warn!("decode-json: {e}");
			Ok(Value::Null)
		},
	}
}

fn encode_json(_: &Context, args: &[Value]) -> Result<Value, EvalError> {
	let Some(arg) = args.first() else {
		warn!("encode-json needs an argument");
		return Ok(Value::Null);
	};
	let encoded = serde_json::to_vec(&vane::from_value(arg))
		.map_err(|e| EvalError::func("encode-json", e))?;
	Ok(Value::Bytes(Bytes::from(encoded)))
}

fn encode_base64(_: &Context, args: &[Value]) -> Result<Value, EvalError> {
	let Some(arg) = args.first() else {
		warn!("encode-base64 needs an argument");
		return Ok(Value::Null);
	};
	Ok(Value::string(BASE64_URL_SAFE.encode(arg.as_bytes()?)))
}

fn decode_base64(_: &Context, args: &[Value]) -> Result<Value, EvalError> {
	let Some(arg) = args.first() else {
		warn!("decode-base64 needs an argument");
		return Ok(Value::Null);
	};
	match BASE64_STANDARD.decode(arg.as_string()?) {
		Ok(decoded) => Ok(Value::Bytes(Bytes::from(decoded))),
		Err(e) => {
			warn!("decode-base64: {e}");
			Ok(Value::Null)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn json_round_trip() {
		let ctx = Context::new();
		let decoded = decode_json(
			&ctx,
			&[Value::string(r#"{"user":{"id":7,"name":"ada"}}"#)],
		)
		.unwrap();
		let Value::Complex(c) = &decoded else {
			panic!("expected a complex");
		};
		assert_eq!(c.find("user.id").as_int().unwrap(), 7);
		assert_eq!(c.find("user.name").as_string().unwrap(), "ada");
		let encoded = encode_json(&ctx, &[decoded]).unwrap();
		assert_eq!(
			encoded.as_string().unwrap(),
			r#"{"user":{"id":7,"name":"ada"}}"#
		);
	}

	#[test]
	fn bad_json_is_null() {
		let ctx = Context::new();
		assert!(
			decode_json(&ctx, &[Value::string("{nope")])
				.unwrap()
				.is_null()
		);
		assert!(decode_json(&ctx, &[]).unwrap().is_null());
	}

	#[test]
	fn base64_round_trip() {
		let ctx = Context::new();
		let encoded = encode_base64(&ctx, &[Value::string("hello world")]).unwrap();
		assert_eq!(encoded.as_string().unwrap(), "aGVsbG8gd29ybGQ=");
		let decoded = decode_base64(&ctx, &[encoded]).unwrap();
		assert_eq!(decoded.as_string().unwrap(), "hello world");
	}

	#[test]
	fn bad_base64_is_null() {
		let ctx = Context::new();
		assert!(
			decode_base64(&ctx, &[Value::string("!!not base64!!")])
				.unwrap()
				.is_null()
		);
	}

	#[test]
	fn uuids_are_fresh() {
		let ctx = Context::new();
		ctx.register_valued_func(
			"uuid",
			Arc::new(|_, _| Ok(Value::string(Uuid::new_v4().to_string()))),
		);
		let f = ctx.lookup_valued_func("uuid").unwrap();
		let a = f(&ctx, &[]).unwrap().as_string().unwrap();
		let b = f(&ctx, &[]).unwrap().as_string().unwrap();
		assert_ne!(a, b);
		assert_eq!(a.len(), 36);
	}
}
