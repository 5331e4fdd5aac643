use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, Uri};
use http_body_util::{BodyExt, Full};
use tracing::warn;
use vane::{Context, EvalError, Value};

use crate::Gateway;

pub fn register(gw: &Arc<Gateway>, ctx: &Context) {
	ctx.register_func("backend", Arc::new(backend));
	// `forward` is the tail call at the end of a route; `call` is the same
	// machinery used mid-flight (auth subrequests and the like).
	for name in ["call", "forward"] {
		let gw = gw.clone();
		ctx.register_func(
			name,
			Arc::new(move |ctx: &Context, args: &[Value]| call(&gw, ctx, args)),
		);
	}
}

/// `backend a | b | c ;` — picks the first of the distinct candidates and
/// rebinds `host`/`scheme` so a later `call` or `forward` targets it.
fn backend(ctx: &Context, args: &[Value]) -> Result<bool, EvalError> {
	let mut candidates: Vec<String> = Vec::new();
	for arg in args {
		for v in arg.resolve(ctx)?.as_slice() {
			let s = v.as_string()?;
			if !s.is_empty() && !candidates.contains(&s) {
				candidates.push(s);
			}
		}
	}
	let Some(chosen) = candidates.first() else {
		return Err(EvalError::func("backend", "at least one address is required"));
	};
	match chosen.split_once("://") {
		Some((scheme, rest)) => {
			let authority = rest.split('/').next().unwrap_or(rest);
			ctx.bind_value("scheme", Value::string(scheme));
			ctx.bind_value("host", Value::string(authority));
		},
		None => {
			ctx.bind_value("host", Value::string(chosen.as_str()));
			if ctx.get_value("scheme").is_null() {
				ctx.bind_value("scheme", Value::string("http"));
			}
		},
	}
	Ok(true)
}

/// Rebuilds the outbound request from the scope (or from explicit
/// `call [ METHOD URL ]` arguments), sends it, and leaves the upstream
/// answer behind as `response.code`, `response.body`, and each header flat
/// as `response.<Name>`. A connect failure becomes a 502 and stops the
/// block.
fn call(gw: &Arc<Gateway>, ctx: &Context, args: &[Value]) -> Result<bool, EvalError> {
	let mut resolved = Vec::with_capacity(args.len());
	for a in args {
		resolved.push(a.resolve(ctx)?);
	}
	let method = match resolved.first() {
		Some(m) => Method::from_bytes(m.as_string()?.to_uppercase().as_bytes())
			.map_err(|e| EvalError::func("call", e))?,
		None => Method::from_bytes(ctx.get_value("method").as_string()?.as_bytes())
			.unwrap_or(Method::GET),
	};
	let uri = match resolved.get(1) {
		Some(u) => u
			.as_string()?
			.parse::<Uri>()
			.map_err(|e| EvalError::func("call", e))?,
		None => target_uri(ctx)?,
	};
	let mut builder = http::Request::builder().method(method).uri(uri);
	for name in ctx.get_attr_names("header").as_slice() {
		let Ok(name) = name.as_string() else {
			continue;
		};
		// The Host header follows the (re)bound authority, not the inbound
		// request.
		if name.eq_ignore_ascii_case("host") {
			continue;
		}
		let Ok(header) = HeaderName::try_from(name.as_str()) else {
			warn!(header = %name, "dropping malformed request header");
			continue;
		};
		for v in ctx.get_value(&format!("header.{name}")).as_slice() {
			match v.as_string().ok().and_then(|v| HeaderValue::try_from(v).ok()) {
				Some(v) => builder = builder.header(header.clone(), v),
				None => warn!(header = %name, "dropping malformed request header value"),
			}
		}
	}
	let body = match ctx.lookup_valued_func("body") {
		Some(f) => f(ctx, &[])?.as_bytes()?,
		None => Bytes::new(),
	};
	let request = builder
		.body(Full::new(body))
		.map_err(|e| EvalError::func("call", e))?;
	let response = gw
		.handle()
		.block_on(gw.client().request(request));
	let response = match response {
		Ok(r) => r,
		Err(e) => {
			warn!("upstream request: {e}");
			ctx.bind_value("response.code", Value::Int(502));
			ctx.bind_value(
				"response.body",
				Value::string(format!("can't request upstream: {e}")),
			);
			return Ok(false);
		},
	};
	let (parts, body) = response.into_parts();
	ctx.bind_value("response.code", Value::Int(u64::from(parts.status.as_u16())));
	// Upstream headers land flat under `response.<Name>`, away from the
	// `response.header.*` namespace the outbound response is assembled from:
	// an upstream's headers reach the client only when the configuration
	// copies them across explicitly.
	for name in parts.headers.keys() {
		let mut values: Vec<Value> = parts
			.headers
			.get_all(name)
			.iter()
			.map(|v| Value::string(String::from_utf8_lossy(v.as_bytes()).into_owned()))
			.collect();
		let value = if values.len() == 1 {
			values.pop().expect("one value")
		} else {
			Value::Slice(values)
		};
		ctx.bind_value(
			&format!("response.{}", crate::canonical_header(name.as_str())),
			value,
		);
	}
	let body = gw
		.handle()
		.block_on(body.collect())
		.map_err(|e| EvalError::func("call", e))?
		.to_bytes();
	ctx.bind_value("response.body", Value::Bytes(body.clone()));
	ctx.register_valued_func(
		"responseBody",
		Arc::new(move |_, _| Ok(Value::Bytes(body.clone()))),
	);
	Ok(true)
}

/// The target assembled from the scope: `scheme://host/path?query`, with the
/// query string rebuilt from `query.*`.
pub(crate) fn target_uri(ctx: &Context) -> Result<Uri, EvalError> {
	let scheme = match ctx.get_value("scheme") {
		Value::Null => "http".to_string(),
		s => s.as_string()?,
	};
	let host = ctx.get_value("host").as_string()?;
	if host.is_empty() {
		return Err(EvalError::func("call", "no host bound; use backend first"));
	}
	let path = ctx.get_value("path").as_string()?;
	let path = if path.is_empty() { "/".to_string() } else { path };
	let mut query = url::form_urlencoded::Serializer::new(String::new());
	let mut any = false;
	for name in ctx.get_attr_names("query").as_slice() {
		let Ok(name) = name.as_string() else {
			continue;
		};
		for v in ctx.get_value(&format!("query.{name}")).as_slice() {
			if let Ok(v) = v.as_string() {
				query.append_pair(&name, &v);
				any = true;
			}
		}
	}
	let path_and_query = if any {
		format!("{path}?{}", query.finish())
	} else {
		path
	};
	Uri::builder()
		.scheme(scheme.as_str())
		.authority(host.as_str())
		.path_and_query(path_and_query.as_str())
		.build()
		.map_err(|e| EvalError::func("call", e))
}
