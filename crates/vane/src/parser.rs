use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::stmt::{Operator, Stmt};
use crate::value::{Value, Variable};

#[derive(Error, Debug)]
pub enum ParseError {
	#[error(transparent)]
	Lex(#[from] LexError),
	#[error("parse error at {row}:{col}: found {found:?}, {context}")]
	Unexpected {
		row: u32,
		col: u32,
		found: String,
		context: &'static str,
	},
}

/// Parses a whole configuration into its statement tree.
pub fn parse(reader: impl Read) -> Result<Vec<Stmt>, ParseError> {
	Parser::new(reader).parse()
}

/// Recursive-descent parser over the token stream:
///
/// ```text
/// Program    := Stmt*
/// Stmt       := Block | SmallStmt ';' | SmallStmt Block
/// Block      := '{' Stmt* '}'
/// SmallStmt  := 'return' | Name '=' Expr | Name ('[' Expr* ']')?
///             | Expr Op Expr
/// Expr       := Atom ('|' Atom)*
/// ```
///
/// A small statement followed by a block becomes a match-then with the small
/// statement as its guard; a bare block gets an always-true empty guard.
pub struct Parser<R> {
	lexer: Lexer<R>,
	lookahead: Option<Token>,
}

fn operator_of(kind: TokenKind) -> Option<Operator> {
	match kind {
		TokenKind::Eq => Some(Operator::Eq),
		TokenKind::Neq => Some(Operator::Neq),
		TokenKind::Gt => Some(Operator::Gt),
		TokenKind::Gte => Some(Operator::Gte),
		TokenKind::Lt => Some(Operator::Lt),
		TokenKind::Lte => Some(Operator::Lte),
		TokenKind::Like => Some(Operator::Like),
		TokenKind::NotLike => Some(Operator::NotLike),
		_ => None,
	}
}

fn is_atom(kind: TokenKind) -> bool {
	matches!(
		kind,
		TokenKind::Name
			| TokenKind::Int
			| TokenKind::Float
			| TokenKind::String
			| TokenKind::True
			| TokenKind::False
			| TokenKind::Null
	)
}

impl<R: Read> Parser<R> {
	pub fn new(reader: R) -> Self {
		Parser {
			lexer: Lexer::new(reader),
			lookahead: None,
		}
	}

	pub fn parse(mut self) -> Result<Vec<Stmt>, ParseError> {
		let mut stmts = Vec::new();
		while self.peek()?.kind != TokenKind::Eof {
			stmts.push(self.stmt()?);
		}
		Ok(stmts)
	}

	fn next(&mut self) -> Result<Token, ParseError> {
		if let Some(t) = self.lookahead.take() {
			return Ok(t);
		}
		loop {
			let t = self.lexer.scan()?;
			if t.kind != TokenKind::Comment {
				return Ok(t);
			}
		}
	}

	fn peek(&mut self) -> Result<&Token, ParseError> {
		if self.lookahead.is_none() {
			self.lookahead = Some(self.next()?);
		}
		Ok(self.lookahead.as_ref().expect("just filled"))
	}

	fn unexpected(t: &Token, context: &'static str) -> ParseError {
		ParseError::Unexpected {
			row: t.row,
			col: t.col,
			found: t.text(),
			context,
		}
	}

	fn stmt(&mut self) -> Result<Stmt, ParseError> {
		if self.peek()?.kind == TokenKind::BlockBegin {
			let body = self.block()?;
			return Ok(Stmt::MatchThen {
				guard: Box::new(Stmt::Empty),
				body,
			});
		}
		let small = self.small_stmt()?;
		match self.peek()?.kind {
			TokenKind::StmtEnd => {
				self.next()?;
				Ok(small)
			},
			TokenKind::BlockBegin => {
				let body = self.block()?;
				Ok(Stmt::MatchThen {
					guard: Box::new(small),
					body,
				})
			},
			_ => {
				let t = self.next()?;
				Err(Self::unexpected(&t, "expected ';' or '{' after statement"))
			},
		}
	}

	fn block(&mut self) -> Result<Arc<[Stmt]>, ParseError> {
		let open = self.next()?;
		debug_assert_eq!(open.kind, TokenKind::BlockBegin);
		let mut body = Vec::new();
		loop {
			match self.peek()?.kind {
				TokenKind::BlockEnd => {
					self.next()?;
					return Ok(Arc::from(body));
				},
				TokenKind::Eof => {
					let t = self.next()?;
					return Err(Self::unexpected(&t, "unclosed block"));
				},
				_ => body.push(self.stmt()?),
			}
		}
	}

	fn small_stmt(&mut self) -> Result<Stmt, ParseError> {
		let t = self.next()?;
		match t.kind {
			TokenKind::Return => Ok(Stmt::Return),
			TokenKind::Name => {
				let name: Arc<str> = Arc::from(t.text().as_str());
				let peeked = self.peek()?.kind;
				if let Some(op) = operator_of(peeked) {
					self.next()?;
					let right = self.expr()?;
					return Ok(Stmt::Match {
						left: Value::Variable(Box::new(Variable::new(name))),
						op,
						right,
					});
				}
				match peeked {
					TokenKind::Assign => {
						self.next()?;
						let value = self.expr()?;
						Ok(Stmt::Assignment { name, value })
					},
					TokenKind::ArgBegin => {
						self.next()?;
						let mut args = Vec::new();
						loop {
							match self.peek()?.kind {
								TokenKind::ArgEnd => {
									self.next()?;
									return Ok(Stmt::Func { name, args });
								},
								kind if is_atom(kind) => args.push(self.expr()?),
								_ => {
									let t = self.next()?;
									return Err(Self::unexpected(&t, "expected argument or ']'"));
								},
							}
						}
					},
					// A pipe right after the name: the name opens a
					// slice-valued match operand.
					TokenKind::Sep => {
						let first = Value::Variable(Box::new(Variable::new(name)));
						let left = self.expr_continued(first)?;
						let t = self.next()?;
						let Some(op) = operator_of(t.kind) else {
							return Err(Self::unexpected(&t, "expected comparison operator"));
						};
						let right = self.expr()?;
						Ok(Stmt::Match { left, op, right })
					},
					// Trailing arguments without brackets, `listen 6000` style.
					kind if is_atom(kind) => {
						let mut args = Vec::new();
						while is_atom(self.peek()?.kind) {
							args.push(self.expr()?);
						}
						Ok(Stmt::Func { name, args })
					},
					// A bare name: a call with no arguments.
					_ => Ok(Stmt::Func {
						name,
						args: Vec::new(),
					}),
				}
			},
			_ if is_atom(t.kind) => {
				let first = Self::atom(&t)?;
				let left = self.expr_continued(first)?;
				let op_token = self.next()?;
				let Some(op) = operator_of(op_token.kind) else {
					return Err(Self::unexpected(&op_token, "expected comparison operator"));
				};
				let right = self.expr()?;
				Ok(Stmt::Match { left, op, right })
			},
			_ => Err(Self::unexpected(&t, "expected a statement")),
		}
	}

	/// `Atom ('|' Atom)*` — more than one atom folds into a Slice.
	fn expr(&mut self) -> Result<Value, ParseError> {
		let t = self.next()?;
		let first = Self::atom(&t)?;
		self.expr_continued(first)
	}

	fn expr_continued(&mut self, first: Value) -> Result<Value, ParseError> {
		let mut items = vec![first];
		while self.peek()?.kind == TokenKind::Sep {
			self.next()?;
			let t = self.next()?;
			items.push(Self::atom(&t)?);
		}
		if items.len() == 1 {
			Ok(items.pop().expect("one item"))
		} else {
			Ok(Value::Slice(items))
		}
	}

	fn atom(t: &Token) -> Result<Value, ParseError> {
		match t.kind {
			TokenKind::Name => Ok(Value::Variable(Box::new(Variable::new(t.text().as_str())))),
			TokenKind::Int => t
				.text()
				.parse::<u64>()
				.map(Value::Int)
				.map_err(|_| Self::unexpected(t, "integer literal out of range")),
			TokenKind::Float => t
				.text()
				.parse::<f64>()
				.map(Value::Float)
				.map_err(|_| Self::unexpected(t, "malformed float literal")),
			TokenKind::String => Ok(Value::string(t.text())),
			TokenKind::True => Ok(Value::Bool(true)),
			TokenKind::False => Ok(Value::Bool(false)),
			TokenKind::Null => Ok(Value::Null),
			_ => Err(Self::unexpected(t, "expected a value")),
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	fn parse_str(src: &str) -> Result<Vec<Stmt>, ParseError> {
		parse(src.as_bytes())
	}

	#[test]
	fn assignment() {
		let stmts = parse_str("a.b.c = 1;").unwrap();
		assert_matches!(
			&stmts[..],
			[Stmt::Assignment { name, value: Value::Int(1) }] if name.as_ref() == "a.b.c"
		);
	}

	#[test]
	fn match_with_membership() {
		let stmts = parse_str("host == hello.com | world.com ;").unwrap();
		let [Stmt::Match { left, op, right }] = &stmts[..] else {
			panic!("expected a match");
		};
		assert_matches!(left, Value::Variable(v) if v.name.as_ref() == "host");
		assert_eq!(*op, Operator::Eq);
		assert_matches!(right, Value::Slice(items) if items.len() == 2);
	}

	#[test]
	fn guarded_block() {
		let stmts = parse_str("host == hello.com { ok = 1; }").unwrap();
		let [Stmt::MatchThen { guard, body }] = &stmts[..] else {
			panic!("expected a match-then");
		};
		assert_matches!(guard.as_ref(), Stmt::Match { .. });
		assert_eq!(body.len(), 1);
	}

	#[test]
	fn bare_block_has_empty_guard() {
		let stmts = parse_str("{ a = 1; b = 2; }").unwrap();
		let [Stmt::MatchThen { guard, body }] = &stmts[..] else {
			panic!("expected a match-then");
		};
		assert_matches!(guard.as_ref(), Stmt::Empty);
		assert_eq!(body.len(), 2);
	}

	#[test]
	fn func_with_bracketed_args() {
		let stmts = parse_str("call [ POST http://127.0.0.1:6080/auth ];").unwrap();
		let [Stmt::Func { name, args }] = &stmts[..] else {
			panic!("expected a func");
		};
		assert_eq!(name.as_ref(), "call");
		assert_eq!(args.len(), 2);
	}

	#[test]
	fn pipes_group_inside_brackets() {
		let stmts = parse_str("var [ a | b c ];").unwrap();
		let [Stmt::Func { args, .. }] = &stmts[..] else {
			panic!("expected a func");
		};
		assert_eq!(args.len(), 2);
		assert_matches!(&args[0], Value::Slice(items) if items.len() == 2);
		assert_matches!(&args[1], Value::Variable(_));
	}

	#[test]
	fn unbracketed_args_group_by_pipe() {
		let stmts = parse_str("backend 127.0.0.1:6090 | 127.0.0.1:6091;").unwrap();
		let [Stmt::Func { name, args }] = &stmts[..] else {
			panic!("expected a func");
		};
		assert_eq!(name.as_ref(), "backend");
		assert_eq!(args.len(), 1);
		assert_matches!(&args[0], Value::Slice(items) if items.len() == 2);
	}

	#[test]
	fn no_arg_func() {
		let stmts = parse_str("forward; return;").unwrap();
		assert_matches!(
			&stmts[..],
			[Stmt::Func { args, .. }, Stmt::Return] if args.is_empty()
		);
	}

	#[test]
	fn guard_func_with_args() {
		let stmts = parse_str("listen 6000 { forward; }").unwrap();
		let [Stmt::MatchThen { guard, body }] = &stmts[..] else {
			panic!("expected a match-then");
		};
		assert_matches!(
			guard.as_ref(),
			Stmt::Func { name, args } if name.as_ref() == "listen" && args.len() == 1
		);
		assert_eq!(body.len(), 1);
	}

	#[test]
	fn literals() {
		let stmts = parse_str("enabled = true; label = \"two words\"; nothing = null;").unwrap();
		assert_matches!(&stmts[0], Stmt::Assignment { value: Value::Bool(true), .. });
		assert_matches!(
			&stmts[1],
			Stmt::Assignment { value: Value::String(s), .. } if s.as_ref() == "two words"
		);
		assert_matches!(&stmts[2], Stmt::Assignment { value: Value::Null, .. });
	}

	#[test]
	fn nested_blocks() {
		let src = r#"
{
    header.request-id == null {
        header.request-id = uuid;
    }
    listen 6000 {
        host == hello.com | world.com {
            path !~ /login | /register {
                response.code = 401;
            }
        }
    }
}
"#;
		let stmts = parse_str(src).unwrap();
		assert_eq!(stmts.len(), 1);
		let [Stmt::MatchThen { guard, body }] = &stmts[..] else {
			panic!("expected the outer block");
		};
		assert_matches!(guard.as_ref(), Stmt::Empty);
		assert_eq!(body.len(), 2);
		let Stmt::MatchThen { guard, .. } = &body[1] else {
			panic!("expected listen block");
		};
		assert_matches!(guard.as_ref(), Stmt::Func { name, .. } if name.as_ref() == "listen");
	}

	#[test]
	fn error_positions() {
		let err = parse_str("a = 1\nb = 2;").unwrap_err();
		assert_matches!(
			err,
			ParseError::Unexpected { row: 2, col: 1, .. }
		);
	}

	#[test]
	fn unclosed_block() {
		assert_matches!(
			parse_str("{ a = 1; "),
			Err(ParseError::Unexpected { .. })
		);
	}

	#[test]
	fn stray_close() {
		assert_matches!(parse_str("}"), Err(ParseError::Unexpected { .. }));
	}
}
