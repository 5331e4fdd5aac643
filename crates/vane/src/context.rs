use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::EvalError;
use crate::complex::Complex;
use crate::stmt::Stmt;
use crate::value::Value;

/// A side-effecting callable: `(ctx, args) -> continue`. Arguments arrive
/// unresolved so the callee can inspect Variable identities (the built-in
/// `var` depends on this); resolve them with [`Value::resolve`] as needed.
pub type Func = Arc<dyn Fn(&Context, &[Value]) -> Result<bool, EvalError> + Send + Sync>;

/// A value-producing callable: `(ctx, args) -> Value`. Arguments are
/// resolved before the call.
pub type ValuedFunc = Arc<dyn Fn(&Context, &[Value]) -> Result<Value, EvalError> + Send + Sync>;

struct Inner {
	variables: RwLock<Complex>,
	declared: RwLock<HashSet<String>>,
	funcs: RwLock<HashMap<String, Func>>,
	valued_funcs: RwLock<HashMap<String, ValuedFunc>>,
	bag: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
	stmts: RwLock<Option<Arc<[Stmt]>>>,
	parent: Option<Context>,
}

/// The per-evaluation variable environment. Contexts form a tree: [`fork`]
/// creates a child with fresh maps whose lookups fall through to the parent
/// chain, which is how lexical scoping works here. Assignments write through
/// to whichever enclosing scope declared the variable's head segment;
/// undeclared names land in the assigning scope.
///
/// A `Context` is a cheap handle (`Arc` inside); clones share state. Each
/// concurrent evaluation must run in its own forked child — the parent is
/// treated as read-only once evaluations are in flight.
///
/// [`fork`]: Context::fork
#[derive(Clone)]
pub struct Context {
	inner: Arc<Inner>,
}

fn head(path: &str) -> &str {
	path.split('.').next().unwrap_or(path)
}

impl Default for Context {
	fn default() -> Self {
		Self::new()
	}
}

impl Context {
	pub fn new() -> Self {
		let ctx = Context {
			inner: Arc::new(Inner {
				variables: RwLock::new(Complex::new()),
				declared: RwLock::new(HashSet::new()),
				funcs: RwLock::new(HashMap::new()),
				valued_funcs: RwLock::new(HashMap::new()),
				bag: RwLock::new(HashMap::new()),
				stmts: RwLock::new(None),
				parent: None,
			}),
		};
		ctx.register_func("var", Arc::new(declare_vars));
		ctx
	}

	/// A child scope: fresh variables, declarations, registries and bag; the
	/// current block body is inherited. Lookups that miss locally continue
	/// in this context.
	pub fn fork(&self) -> Context {
		Context {
			inner: Arc::new(Inner {
				variables: RwLock::new(Complex::new()),
				declared: RwLock::new(HashSet::new()),
				funcs: RwLock::new(HashMap::new()),
				valued_funcs: RwLock::new(HashMap::new()),
				bag: RwLock::new(HashMap::new()),
				stmts: RwLock::new(self.stmts()),
				parent: Some(self.clone()),
			}),
		}
	}

	pub fn declare<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
		let mut declared = self.inner.declared.write();
		for name in names {
			declared.insert(name.to_string());
		}
	}

	/// Whether the head segment of `name` is declared here or in any
	/// enclosing scope.
	pub fn is_declared(&self, name: &str) -> bool {
		if self.inner.declared.read().contains(head(name)) {
			return true;
		}
		match &self.inner.parent {
			Some(parent) => parent.is_declared(name),
			None => false,
		}
	}

	/// Binds `path` to `v`. If an enclosing scope (this one included)
	/// declared the head segment, the write lands there; otherwise it lands
	/// locally and implicitly declares the head segment in this scope.
	pub fn bind_value(&self, path: &str, v: Value) {
		let h = head(path);
		let mut scope = self;
		loop {
			if scope.inner.declared.read().contains(h) {
				scope.inner.variables.write().set(path, v);
				return;
			}
			match &scope.inner.parent {
				Some(parent) => scope = parent,
				None => break,
			}
		}
		self.inner.declared.write().insert(h.to_string());
		self.inner.variables.write().set(path, v);
	}

	/// Looks `path` up locally, walking the parent chain on a Null result.
	pub fn get_value(&self, path: &str) -> Value {
		let found = self.inner.variables.read().find(path);
		if !found.is_null() {
			return found;
		}
		match &self.inner.parent {
			Some(parent) => parent.get_value(path),
			None => Value::Null,
		}
	}

	/// The direct attribute names under `path`, walking the parent chain
	/// when this scope has none.
	pub fn get_attr_names(&self, path: &str) -> Value {
		let names = self.inner.variables.read().attr_names(path);
		if !names.as_slice().is_empty() {
			return names;
		}
		match &self.inner.parent {
			Some(parent) => parent.get_attr_names(path),
			None => Value::Slice(Vec::new()),
		}
	}

	pub fn register_func(&self, name: &str, f: Func) {
		self.inner.funcs.write().insert(name.to_string(), f);
	}

	pub fn register_valued_func(&self, name: &str, f: ValuedFunc) {
		self.inner.valued_funcs.write().insert(name.to_string(), f);
	}

	pub fn lookup_func(&self, name: &str) -> Option<Func> {
		if let Some(f) = self.inner.funcs.read().get(name) {
			return Some(f.clone());
		}
		self.inner.parent.as_ref().and_then(|p| p.lookup_func(name))
	}

	pub fn lookup_valued_func(&self, name: &str) -> Option<ValuedFunc> {
		if let Some(f) = self.inner.valued_funcs.read().get(name) {
			return Some(f.clone());
		}
		self
			.inner
			.parent
			.as_ref()
			.and_then(|p| p.lookup_valued_func(name))
	}

	/// Attaches an opaque host object (say, the current request) to this
	/// scope.
	pub fn put<T: Any + Send + Sync>(&self, name: &str, v: T) {
		self
			.inner
			.bag
			.write()
			.insert(name.to_string(), Arc::new(v));
	}

	/// Fetches a host attachment, reaching through enclosing scopes. Forked
	/// children start with an empty bag of their own.
	pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
		if let Some(v) = self.inner.bag.read().get(name) {
			return v.clone().downcast::<T>().ok();
		}
		self.inner.parent.as_ref().and_then(|p| p.get(name))
	}

	/// The body of the block currently being evaluated, when a match-then
	/// statement is deciding its guard. Host guards like a listener capture
	/// this to re-enter the body per connection.
	pub fn stmts(&self) -> Option<Arc<[Stmt]>> {
		self.inner.stmts.read().clone()
	}

	pub(crate) fn set_stmts(&self, stmts: Option<Arc<[Stmt]>>) {
		*self.inner.stmts.write() = stmts;
	}
}

// The pre-registered `var` builtin: records each Variable argument's name in
// the calling scope's declared set, and nothing else.
fn declare_vars(ctx: &Context, args: &[Value]) -> Result<bool, EvalError> {
	for arg in args {
		for item in arg.as_slice() {
			if let Value::Variable(v) = item {
				ctx.declare([v.name.as_ref()]);
			}
		}
	}
	Ok(true)
}
