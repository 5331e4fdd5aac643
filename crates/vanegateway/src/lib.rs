//! The HTTP host around the vane engine: a listener guard, upstream
//! selection and forwarding, and the stock value helpers a gateway
//! configuration expects (JSON, base64, uuid, a process-local cache).
//!
//! The engine stays synchronous; everything that blocks on the network runs
//! through the tokio [`Handle`] carried by [`Gateway`].

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::runtime::Handle;
use vane::Context;

pub mod cache;
pub mod codec;
pub mod listener;
pub mod logging;
pub mod upstream;

/// Shared plumbing for the networked builtins: the runtime to block on and
/// the upstream client. One per process, shared by every listener.
pub struct Gateway {
	handle: Handle,
	client: Client<HttpConnector, Full<Bytes>>,
}

impl Gateway {
	pub fn new(handle: Handle) -> Arc<Self> {
		let client = Client::builder(TokioExecutor::new()).build_http();
		Arc::new(Gateway { handle, client })
	}

	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	pub(crate) fn client(&self) -> &Client<HttpConnector, Full<Bytes>> {
		&self.client
	}

	/// Registers every builtin on `ctx`, usually the root context the
	/// configuration will run against.
	pub fn register(self: &Arc<Self>, ctx: &Context) {
		listener::register(self, ctx);
		upstream::register(self, ctx);
		codec::register(ctx);
		cache::register(ctx);
		logging::register(ctx);
	}
}

// The http crate lowercases every header name; configurations address them
// in canonical MIME form (`header.Authorization`, `header.X-Request-Id`), so
// restore that form before binding.
pub(crate) fn canonical_header(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	let mut start = true;
	for c in name.chars() {
		if start {
			out.push(c.to_ascii_uppercase());
		} else {
			out.push(c.to_ascii_lowercase());
		}
		start = c == '-';
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_names_canonicalize() {
		assert_eq!(canonical_header("authorization"), "Authorization");
		assert_eq!(canonical_header("x-request-id"), "X-Request-Id");
		assert_eq!(canonical_header("HOST"), "Host");
		assert_eq!(canonical_header(""), "");
	}
}
