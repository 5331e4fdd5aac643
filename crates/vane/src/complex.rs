use std::collections::BTreeMap;

use crate::EvalError;
use crate::value::Value;

/// A tree-shaped attribute store addressed by dotted paths, e.g.
/// `response.header.user-id`. Intermediate nodes are created on demand;
/// the segment `*` fans out over every direct child during lookup.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Complex {
	value: Option<Box<Value>>,
	attributes: BTreeMap<String, Value>,
}

fn split_head(path: &str) -> (&str, &str) {
	match path.split_once('.') {
		Some((head, rest)) => (head, rest),
		None => (path, ""),
	}
}

impl Complex {
	pub fn new() -> Self {
		Complex::default()
	}

	/// Writes `v` at `path`, creating intermediate nodes and replacing any
	/// leaf standing in the way. An empty path sets this node's own value.
	pub fn set(&mut self, path: &str, v: Value) {
		if path.is_empty() {
			self.value = Some(Box::new(v));
			return;
		}
		let (head, rest) = split_head(path);
		if rest.is_empty() {
			self.attributes.insert(head.to_string(), v);
			return;
		}
		let child = self.attributes.entry(head.to_string()).or_insert_with(|| {
			Value::Complex(Complex::new())
		});
		if !matches!(child, Value::Complex(_)) {
			*child = Value::Complex(Complex::new());
		}
		let Value::Complex(c) = child else {
			unreachable!()
		};
		c.set(rest, v);
	}

	/// Dotted lookup. A `*` segment recurses into every direct child and
	/// concatenates the results into a Slice; a child that cannot recurse
	/// contributes Null. Missing non-wildcard segments yield Null; an empty
	/// path yields the node's own value. Never errors.
	pub fn find(&self, path: &str) -> Value {
		if path.is_empty() {
			return self.value.as_deref().cloned().unwrap_or(Value::Null);
		}
		let (head, rest) = split_head(path);
		if head == "*" {
			let mut out = Vec::with_capacity(self.attributes.len());
			for child in self.attributes.values() {
				if rest.is_empty() {
					out.push(child.clone());
				} else if let Value::Complex(c) = child {
					out.push(c.find(rest));
				} else {
					out.push(Value::Null);
				}
			}
			return Value::Slice(out);
		}
		match self.attributes.get(head) {
			None => Value::Null,
			Some(child) if rest.is_empty() => child.clone(),
			Some(Value::Complex(c)) => c.find(rest),
			Some(_) => Value::Null,
		}
	}

	/// The names of the direct children at `path`, as a Slice of Strings.
	pub fn attr_names(&self, path: &str) -> Value {
		let names = |c: &Complex| {
			Value::Slice(
				c.attributes
					.keys()
					.map(|k| Value::string(k.as_str()))
					.collect(),
			)
		};
		if path.is_empty() {
			return names(self);
		}
		match self.find(path) {
			Value::Complex(c) => names(&c),
			_ => Value::Slice(Vec::new()),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.value.is_none() && self.attributes.is_empty()
	}

	pub(crate) fn attributes(&self) -> &BTreeMap<String, Value> {
		&self.attributes
	}

	/// The canonical JSON form: attributes become object members, sorted by
	/// name.
	pub fn to_json_string(&self) -> Result<String, EvalError> {
		serde_json::to_string(&crate::convert::complex_json(self))
			.map_err(|e| EvalError::coercion("complex", "string", e))
	}
}
