use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;

use crate::EvalError;
use crate::context::Context;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
	Eq,
	Neq,
	Gt,
	Gte,
	Lt,
	Lte,
	Like,
	NotLike,
}

impl Operator {
	pub fn symbol(&self) -> &'static str {
		match self {
			Operator::Eq => "==",
			Operator::Neq => "!=",
			Operator::Gt => ">",
			Operator::Gte => ">=",
			Operator::Lt => "<",
			Operator::Lte => "<=",
			Operator::Like => "~",
			Operator::NotLike => "!~",
		}
	}

	fn is_ordering(&self) -> bool {
		matches!(
			self,
			Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
		)
	}
}

/// One node of the parsed statement tree. `execute` returns the `continue`
/// flag: `false` stops the enclosing block.
#[derive(Clone, Debug)]
pub enum Stmt {
	Empty,
	Return,
	Assignment {
		name: Arc<str>,
		value: Value,
	},
	Func {
		name: Arc<str>,
		args: Vec<Value>,
	},
	Match {
		left: Value,
		op: Operator,
		right: Value,
	},
	/// The central control construct: run `body` when `guard` holds. There
	/// is no else arm; configurations nest these instead.
	MatchThen {
		guard: Box<Stmt>,
		body: Arc<[Stmt]>,
	},
}

impl Stmt {
	pub fn execute(&self, ctx: &Context) -> Result<bool, EvalError> {
		match self {
			Stmt::Empty => Ok(true),
			Stmt::Return => Ok(false),
			Stmt::Assignment { name, value } => {
				// Materialize before storing: the environment holds concrete
				// values, never deferred lookups.
				let v = value.resolve(ctx)?;
				ctx.bind_value(name, v);
				Ok(true)
			},
			Stmt::Func { name, args } => {
				let f = ctx
					.lookup_func(name)
					.ok_or_else(|| EvalError::FuncNotFound(name.clone()))?;
				f(ctx, args)
			},
			Stmt::Match { left, op, right } => eval_match(ctx, left, *op, right),
			Stmt::MatchThen { guard, body } => {
				// Expose the body to guard functions that re-enter it on
				// their own schedule (a listener running it per request).
				ctx.set_stmts(Some(body.clone()));
				let guarded = guard.execute(ctx);
				ctx.set_stmts(None);
				// A guard that does not hold, errors out, or already consumed
				// the body (continue=false) skips it without stopping the
				// enclosing block.
				if !matches!(guarded, Ok(true)) {
					return Ok(true);
				}
				let scope = ctx.fork();
				let mut last = true;
				for stmt in body.iter() {
					last = stmt.execute(&scope)?;
					if !last {
						break;
					}
				}
				Ok(last)
			},
		}
	}
}

fn eval_match(ctx: &Context, left: &Value, op: Operator, right: &Value) -> Result<bool, EvalError> {
	let l = left.resolve(ctx)?;
	let r = right.resolve(ctx)?;
	// A slice on the right means membership semantics.
	if let Value::Slice(candidates) = &r {
		match op {
			Operator::Eq => {
				for c in candidates {
					if l.compare(c)? == Ordering::Equal {
						return Ok(true);
					}
				}
				return Ok(false);
			},
			Operator::Neq => {
				for c in candidates {
					if l.compare(c)? == Ordering::Equal {
						return Ok(false);
					}
				}
				return Ok(true);
			},
			Operator::Like => {
				for c in candidates {
					if regex_match(&l, c)? {
						return Ok(true);
					}
				}
				return Ok(false);
			},
			Operator::NotLike => {
				for c in candidates {
					if regex_match(&l, c)? {
						return Ok(false);
					}
				}
				return Ok(true);
			},
			_ => {},
		}
	}
	match op {
		Operator::Like => regex_match(&l, &r),
		Operator::NotLike => Ok(!regex_match(&l, &r)?),
		_ => {
			if op.is_ordering()
				&& (matches!(l, Value::Complex(_)) || matches!(r, Value::Complex(_)))
			{
				return Err(EvalError::UnsupportedOperator(op.symbol(), "complex"));
			}
			let ord = l.compare(&r)?;
			Ok(match op {
				Operator::Eq => ord == Ordering::Equal,
				Operator::Neq => ord != Ordering::Equal,
				Operator::Gt => ord == Ordering::Greater,
				Operator::Gte => ord != Ordering::Less,
				Operator::Lt => ord == Ordering::Less,
				Operator::Lte => ord != Ordering::Greater,
				Operator::Like | Operator::NotLike => unreachable!(),
			})
		},
	}
}

fn regex_match(left: &Value, pattern: &Value) -> Result<bool, EvalError> {
	let pattern = pattern.as_string()?;
	let re = Regex::new(&pattern).map_err(|e| EvalError::BadPattern {
		pattern,
		message: e.to_string(),
	})?;
	Ok(re.is_match(&left.as_string()?))
}
