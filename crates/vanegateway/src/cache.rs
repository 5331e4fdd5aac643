use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;
use vane::{Context, EvalError, Value};

/// A process-local TTL cache behind `cache-set` / `cache-get`. Entries are
/// evicted lazily on read.
#[derive(Default)]
pub struct Cache {
	entries: RwLock<HashMap<String, Entry>>,
}

struct Entry {
	value: Value,
	expires: Option<Instant>,
}

impl Cache {
	pub fn put(&self, key: &str, value: Value, ttl: Option<Duration>) {
		self.entries.write().insert(
			key.to_string(),
			Entry {
				value,
				expires: ttl.map(|ttl| Instant::now() + ttl),
			},
		);
	}

	pub fn get(&self, key: &str) -> Value {
		{
			let entries = self.entries.read();
			match entries.get(key) {
				None => return Value::Null,
				Some(e) if e.expires.is_none_or(|at| Instant::now() < at) => {
					return e.value.clone();
				},
				Some(_) => {},
			}
		}
		self.entries.write().remove(key);
		Value::Null
	}
}

pub fn register(ctx: &Context) {
	let cache = Arc::new(Cache::default());
	let set_cache = cache.clone();
	ctx.register_func(
		"cache-set",
		Arc::new(move |ctx: &Context, args: &[Value]| {
			let [key, value, rest @ ..] = args else {
				warn!("cache-set needs a key and a value");
				return Ok(false);
			};
			let key = key.resolve(ctx)?.as_string()?;
			let value = value.resolve(ctx)?;
			let ttl = match rest.first() {
				Some(ttl) => Some(Duration::from_secs(ttl.resolve(ctx)?.as_int()?)),
				None => None,
			};
			set_cache.put(&key, value, ttl);
			Ok(true)
		}),
	);
	ctx.register_valued_func(
		"cache-get",
		Arc::new(move |_: &Context, args: &[Value]| {
			let Some(key) = args.first() else {
				warn!("cache-get needs a key");
				return Ok(Value::Null);
			};
			Ok(cache.get(&key.as_string()?))
		}),
	);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn set_then_get() {
		let cache = Cache::default();
		cache.put("token", Value::string("abc"), None);
		assert_eq!(cache.get("token").as_string().unwrap(), "abc");
		assert!(cache.get("missing").is_null());
	}

	#[test]
	fn overwrite() {
		let cache = Cache::default();
		cache.put("k", Value::Int(1), None);
		cache.put("k", Value::Int(2), None);
		assert_eq!(cache.get("k").as_int().unwrap(), 2);
	}

	#[test]
	fn ttl_expires() {
		let cache = Cache::default();
		cache.put("gone", Value::Int(1), Some(Duration::ZERO));
		assert!(cache.get("gone").is_null());
		// Lazy eviction removed the entry entirely.
		assert!(cache.entries.read().get("gone").is_none());
	}

	#[test]
	fn registered_funcs_round_trip() {
		let ctx = Context::new();
		register(&ctx);
		let set = ctx.lookup_func("cache-set").unwrap();
		let get = ctx.lookup_valued_func("cache-get").unwrap();
		assert!(set(&ctx, &[Value::string("k"), Value::string("v")]).unwrap());
		assert_eq!(
			get(&ctx, &[Value::string("k")]).unwrap().as_string().unwrap(),
			"v"
		);
		// Missing arguments stop the block without erroring.
		assert!(!set(&ctx, &[Value::string("only-key")]).unwrap());
	}
}
