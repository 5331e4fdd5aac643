//! The vane configuration language: a small match-then DSL evaluated per
//! request against a lexically scoped variable environment.
//!
//! A configuration is parsed once into a statement tree. Hosts then create a
//! [`Context`], seed variables and callables, and execute the tree for every
//! incoming request:
//!
//! ```
//! use vane::{Context, parse};
//!
//! let stmts = parse("greeting = hello;".as_bytes()).unwrap();
//! let ctx = Context::new();
//! for stmt in &stmts {
//!     stmt.execute(&ctx).unwrap();
//! }
//! assert_eq!(ctx.get_value("greeting").as_string().unwrap(), "hello");
//! ```

use std::sync::Arc;

use thiserror::Error;

mod complex;
mod context;
mod convert;
mod lexer;
mod parser;
mod stmt;
mod value;

pub use complex::Complex;
pub use context::{Context, Func, ValuedFunc};
pub use convert::{from_value, to_value};
pub use lexer::{LexError, Lexer, Token, TokenKind};
pub use parser::{ParseError, Parser, parse};
pub use stmt::{Operator, Stmt};
pub use value::{Value, Variable};

/// Errors surfaced while executing a statement tree. Any of these aborts the
/// enclosing block; a non-matching guard is not an error.
#[derive(Error, Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum EvalError {
	#[error("func not found: {0}")]
	FuncNotFound(Arc<str>),
	#[error("invalid pattern {pattern:?}: {message}")]
	BadPattern { pattern: String, message: String },
	#[error("operator {0} not supported for {1}")]
	UnsupportedOperator(&'static str, &'static str),
	#[error("{0} and {1} are not comparable")]
	NotComparable(&'static str, &'static str),
	#[error("cannot coerce {from} to {to}: {detail}")]
	Coercion {
		from: &'static str,
		to: &'static str,
		detail: String,
	},
	#[error("variable {0} was not resolved against a context")]
	Unresolved(Arc<str>),
	#[error("{func}: {message}")]
	Func { func: Arc<str>, message: String },
}

impl EvalError {
	pub fn coercion(from: &'static str, to: &'static str, detail: impl ToString) -> Self {
		EvalError::Coercion {
			from,
			to,
			detail: detail.to_string(),
		}
	}

	/// An error raised by a host-registered callable.
	pub fn func(func: &str, message: impl ToString) -> Self {
		EvalError::Func {
			func: Arc::from(func),
			message: message.to_string(),
		}
	}
}
