use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use vane::{Context, EvalError, Stmt, Value};

use crate::Gateway;

pub fn register(gw: &Arc<Gateway>, ctx: &Context) {
	let gw = gw.clone();
	ctx.register_func(
		"listen",
		Arc::new(move |ctx: &Context, args: &[Value]| listen(&gw, ctx, args)),
	);
}

/// The `listen <port> { … }` guard. Serves HTTP on the port and re-enters
/// the block body once per request, each time in a fresh child scope seeded
/// with the request. Returns continue=false so the match-then does not run
/// the body a second time itself.
fn listen(gw: &Arc<Gateway>, ctx: &Context, args: &[Value]) -> Result<bool, EvalError> {
	let Some(port) = args.first() else {
		return Err(EvalError::func("listen", "a port is required"));
	};
	let port = port.resolve(ctx)?.as_int()?;
	let port = u16::try_from(port).map_err(|_| EvalError::func("listen", "port out of range"))?;
	if !ctx.get_value("cert-file").is_null() || !ctx.get_value("key-file").is_null() {
		return Err(EvalError::func(
			"listen",
			"tls listeners are not built in; terminate tls in front of the gateway",
		));
	}
	let Some(stmts) = ctx.stmts() else {
		return Err(EvalError::func("listen", "needs a block to run per request"));
	};
	let ctx = ctx.clone();
	let gw2 = gw.clone();
	gw.handle()
		.block_on(async move { serve(gw2, ctx, stmts, port).await })
		.map_err(|e| EvalError::func("listen", e))?;
	Ok(false)
}

async fn serve(
	gw: Arc<Gateway>,
	ctx: Context,
	stmts: Arc<[Stmt]>,
	port: u16,
) -> std::io::Result<()> {
	let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
	info!(port, "listening");
	loop {
		let (stream, remote) = listener.accept().await?;
		let ctx = ctx.clone();
		let stmts = stmts.clone();
		gw.handle().spawn(async move {
			let io = TokioIo::new(stream);
			let service = service_fn(move |req| {
				let ctx = ctx.clone();
				let stmts = stmts.clone();
				async move { Ok::<_, Infallible>(handle(ctx, stmts, remote, req).await) }
			});
			if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
				debug!(remote = %remote, "connection ended: {e}");
			}
		});
	}
}

async fn handle(
	ctx: Context,
	stmts: Arc<[Stmt]>,
	remote: SocketAddr,
	req: http::Request<Incoming>,
) -> Response<Full<Bytes>> {
	let (parts, body) = req.into_parts();
	let body = match body.collect().await {
		Ok(collected) => collected.to_bytes(),
		Err(e) => {
			warn!("read request body: {e}");
			return plain(StatusCode::BAD_REQUEST, "bad request");
		},
	};
	let scope = ctx.fork();
	seed_request(&scope, &parts, remote, body);
	// Evaluation, and the response assembly that may lazily pull an upstream
	// body, both block; keep them off the runtime workers.
	let evaluated = tokio::task::spawn_blocking(move || {
		for stmt in stmts.iter() {
			if !stmt.execute(&scope)? {
				break;
			}
		}
		Ok::<_, EvalError>(respond(&scope))
	})
	.await;
	match evaluated {
		Ok(Ok(response)) => response,
		Ok(Err(e)) => {
			error!("evaluate request: {e}");
			plain(StatusCode::INTERNAL_SERVER_ERROR, "configuration error")
		},
		Err(e) => {
			error!("evaluation task: {e}");
			plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		},
	}
}

fn plain(code: StatusCode, msg: &'static str) -> Response<Full<Bytes>> {
	Response::builder()
		.status(code)
		.body(Full::new(Bytes::from_static(msg.as_bytes())))
		.expect("static response")
}

/// Seeds a per-request scope: every request attribute the language exposes,
/// declared here so configuration writes land on this scope and stay visible
/// to the response assembly below.
pub fn seed_request(
	ctx: &Context,
	parts: &http::request::Parts,
	remote: SocketAddr,
	body: Bytes,
) {
	ctx.declare([
		"path",
		"hash",
		"scheme",
		"host",
		"port",
		"user-agent",
		"remote-addr",
		"method",
		"header",
		"query",
		"response",
	]);
	ctx.bind_value("path", Value::string(parts.uri.path()));
	ctx.bind_value("hash", Value::string(""));
	ctx.bind_value(
		"scheme",
		Value::string(parts.uri.scheme_str().unwrap_or("http")),
	);
	let host = parts
		.headers
		.get(HOST)
		.and_then(|v| v.to_str().ok())
		.or_else(|| parts.uri.host())
		.unwrap_or("");
	ctx.bind_value("host", Value::string(host));
	ctx.bind_value(
		"port",
		match parts.uri.port_u16() {
			Some(p) => Value::Int(u64::from(p)),
			None => Value::string(""),
		},
	);
	let user_agent = parts
		.headers
		.get(USER_AGENT)
		.and_then(|v| v.to_str().ok())
		.unwrap_or("");
	ctx.bind_value("user-agent", Value::string(user_agent));
	ctx.bind_value("remote-addr", Value::string(remote.to_string()));
	ctx.bind_value("method", Value::string(parts.method.as_str()));
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
		// Canonical MIME form, so configurations can say
		// `header.Authorization ~ .+`.
		ctx.bind_value(
			&format!("header.{}", crate::canonical_header(name.as_str())),
			value,
		);
	}
	let mut query: BTreeMap<String, Vec<Value>> = BTreeMap::new();
	if let Some(qs) = parts.uri.query() {
		for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
			query
				.entry(k.into_owned())
				.or_default()
				.push(Value::string(v.into_owned()));
		}
	}
	for (k, mut values) in query {
		let value = if values.len() == 1 {
			values.pop().expect("one value")
		} else {
			Value::Slice(values)
		};
		ctx.bind_value(&format!("query.{k}"), value);
	}
	ctx.register_valued_func("body", Arc::new(move |_, _| Ok(Value::Bytes(body.clone()))));
}

/// Assembles the outbound response from what the configuration left behind:
/// `response.code`, `response.header.*`, and `response.body`, falling back
/// to a registered `responseBody` valued function for the body.
pub fn respond(ctx: &Context) -> Response<Full<Bytes>> {
	let mut builder = Response::builder();
	let code = ctx.get_value("response.code");
	let status = if code.is_null() {
		StatusCode::OK
	} else {
		code
			.as_int()
			.ok()
			.and_then(|c| u16::try_from(c).ok())
			.and_then(|c| StatusCode::from_u16(c).ok())
			.unwrap_or(StatusCode::OK)
	};
	builder = builder.status(status);
	for name in ctx.get_attr_names("response.header").as_slice() {
		let Ok(name) = name.as_string() else {
			continue;
		};
		let Ok(value) = ctx.get_value(&format!("response.header.{name}")).as_string() else {
			continue;
		};
		match (
			HeaderName::try_from(name.as_str()),
			HeaderValue::try_from(value.as_str()),
		) {
			(Ok(n), Ok(v)) => builder = builder.header(n, v),
			_ => warn!(header = %name, "dropping malformed response header"),
		}
	}
	let body = match ctx.get_value("response.body") {
		Value::Null => match ctx.lookup_valued_func("responseBody") {
			Some(f) => f(ctx, &[]).and_then(|v| v.as_bytes()).unwrap_or_else(|e| {
				warn!("deferred response body: {e}");
				Bytes::new()
			}),
			None => Bytes::new(),
		},
		explicit => explicit.as_bytes().unwrap_or_else(|e| {
			warn!("response body: {e}");
			Bytes::new()
		}),
	};
	builder
		.body(Full::new(body))
		.unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request_parts(uri: &str) -> http::request::Parts {
		let (parts, _) = http::Request::builder()
			.method(http::Method::POST)
			.uri(uri)
			.header("Host", "hello.com")
			.header("User-Agent", "vane-test")
			.header("X-Multi", "one")
			.header("X-Multi", "two")
			.body(())
			.unwrap()
			.into_parts();
		parts
	}

	fn seeded(uri: &str) -> Context {
		let root = Context::new();
		let ctx = root.fork();
		seed_request(
			&ctx,
			&request_parts(uri),
			"10.0.0.9:41000".parse().unwrap(),
			Bytes::from_static(b"{\"user\":1}"),
		);
		ctx
	}

	#[test]
	fn seeds_request_attributes() {
		let ctx = seeded("http://hello.com:8080/login?x=1&x=2&y=z");
		assert_eq!(ctx.get_value("path").as_string().unwrap(), "/login");
		assert_eq!(ctx.get_value("method").as_string().unwrap(), "POST");
		assert_eq!(ctx.get_value("host").as_string().unwrap(), "hello.com");
		assert_eq!(ctx.get_value("port").as_int().unwrap(), 8080);
		assert_eq!(
			ctx.get_value("user-agent").as_string().unwrap(),
			"vane-test"
		);
		assert_eq!(
			ctx.get_value("remote-addr").as_string().unwrap(),
			"10.0.0.9:41000"
		);
		assert_eq!(
			ctx.get_value("header.Host").as_string().unwrap(),
			"hello.com"
		);
		assert_eq!(ctx.get_value("query.y").as_string().unwrap(), "z");
		assert_eq!(ctx.get_value("query.x").as_slice().len(), 2);
		// Seeded under canonical names, not the lowercase the http crate keeps.
		assert_eq!(ctx.get_value("header.X-Multi").as_slice().len(), 2);
		assert!(ctx.get_value("header.x-multi").is_null());
		assert_eq!(
			ctx.get_value("header.User-Agent").as_string().unwrap(),
			"vane-test"
		);
	}

	#[test]
	fn body_is_a_valued_func() {
		let ctx = seeded("http://hello.com/");
		let body = ctx.lookup_valued_func("body").unwrap();
		assert_eq!(
			body(&ctx, &[]).unwrap().as_bytes().unwrap(),
			Bytes::from_static(b"{\"user\":1}")
		);
	}

	#[test]
	fn respond_defaults_to_200_empty() {
		let ctx = seeded("http://hello.com/");
		let res = respond(&ctx);
		assert_eq!(res.status(), StatusCode::OK);
	}

	#[test]
	fn respond_uses_configured_fields() {
		let ctx = seeded("http://hello.com/");
		ctx.bind_value("response.code", Value::Int(401));
		ctx.bind_value("response.header.x-reason", Value::string("denied"));
		ctx.bind_value("response.body", Value::string("unauthorized"));
		let res = respond(&ctx);
		assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
		assert_eq!(res.headers().get("x-reason").unwrap(), "denied");
	}

	#[test]
	fn respond_falls_back_to_deferred_body() {
		let ctx = seeded("http://hello.com/");
		ctx.register_valued_func(
			"responseBody",
			Arc::new(|_, _| Ok(Value::Bytes(Bytes::from_static(b"upstream")))),
		);
		let res = respond(&ctx);
		assert_eq!(res.status(), StatusCode::OK);
	}

	#[test]
	fn code_written_by_config_statements_is_visible() {
		let ctx = seeded("http://hello.com/login");
		let stmts = vane::parse("{ path == /login { response.code = 401; } }".as_bytes()).unwrap();
		for stmt in &stmts {
			stmt.execute(&ctx).unwrap();
		}
		assert_eq!(respond(&ctx).status(), StatusCode::UNAUTHORIZED);
	}
}
