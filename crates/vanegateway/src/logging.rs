use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};
use vane::{Context, EvalError, Value};

/// `log level message args… ;` — bridges configuration-level logging onto
/// the process tracing pipeline. A single argument logs at info; an unknown
/// level warns and falls back to info.
pub fn register(ctx: &Context) {
	ctx.register_func("log", Arc::new(log));
}

fn log(ctx: &Context, args: &[Value]) -> Result<bool, EvalError> {
	let mut parts = Vec::with_capacity(args.len());
	for a in args {
		parts.push(a.resolve(ctx)?.as_string()?);
	}
	match parts.split_first() {
		None => warn!("log with nothing"),
		Some((msg, [])) => info!("{msg}"),
		Some((level, rest)) => {
			let msg = rest.join(" ");
			match level.to_lowercase().as_str() {
				"trace" => trace!("{msg}"),
				"debug" => debug!("{msg}"),
				"info" => info!("{msg}"),
				"warn" => warn!("{msg}"),
				"error" | "fatal" => error!("{msg}"),
				unknown => {
					warn!(level = unknown, "unknown log level");
					info!("{msg}");
				},
			}
		},
	}
	Ok(true)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn log_never_stops_the_block() {
		let ctx = Context::new();
		register(&ctx);
		let f = ctx.lookup_func("log").unwrap();
		assert!(f(&ctx, &[]).unwrap());
		assert!(f(&ctx, &[Value::string("plain message")]).unwrap());
		assert!(
			f(
				&ctx,
				&[
					Value::string("warn"),
					Value::string("slow upstream"),
					Value::Int(502),
				],
			)
			.unwrap()
		);
		assert!(
			f(&ctx, &[Value::string("nonsense-level"), Value::string("x")]).unwrap()
		);
	}

	#[test]
	fn log_resolves_variables() {
		let ctx = Context::new();
		register(&ctx);
		ctx.bind_value("host", Value::string("hello.com"));
		let f = ctx.lookup_func("log").unwrap();
		let host = Value::Variable(Box::new(vane::Variable::new("host")));
		assert!(f(&ctx, &[Value::string("info"), host]).unwrap());
	}
}
