use std::io::Read;

use thiserror::Error;

/// The kinds of token the lexer produces. `Or`, `And` and `Bool` are
/// reserved: the scanner recognizes `||` and `&&` but no grammar production
/// consumes them yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
	Null,
	Return,
	True,
	False,
	Eq,
	Neq,
	Gte,
	Gt,
	Lte,
	Lt,
	Assign,
	Or,
	And,
	Sep,
	Like,
	NotLike,
	StmtEnd,
	BlockBegin,
	BlockEnd,
	ArgBegin,
	ArgEnd,
	Name,
	Int,
	Float,
	String,
	Bool,
	Comment,
	Eof,
}

/// A scanned token: kind, raw bytes, and the position of its first byte.
#[derive(Clone, Debug)]
pub struct Token {
	pub kind: TokenKind,
	pub raw: Vec<u8>,
	pub row: u32,
	pub col: u32,
}

impl Token {
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.raw).into_owned()
	}
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("lex error at {row}:{col}: {cause}")]
pub struct LexError {
	pub row: u32,
	pub col: u32,
	pub cause: String,
}

enum State {
	Start,
	Keyword(&'static [u8], TokenKind),
	Name,
	Number,
	Float,
	Str { quoted: bool },
	Comment,
	Not,
	AssignOrEq,
	GtOrGte,
	LtOrLte,
	SepOrOr,
	Amp,
}

/// A single-byte-lookahead scanner over any byte stream. Whitespace
/// separates tokens and is discarded outside quoted strings. When a state
/// runs into a byte that is itself significant (a number directly followed
/// by `;`, say), the byte is stashed and replayed on the next scan.
pub struct Lexer<R> {
	reader: R,
	buf: Box<[u8; 4096]>,
	pos: usize,
	filled: usize,
	stash: Option<(u8, u32, u32)>,
	row: u32,
	col: u32,
}

fn is_whitespace(b: u8) -> bool {
	matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_alpha(b: u8) -> bool {
	b.is_ascii_alphabetic()
}

fn is_name_start(b: u8) -> bool {
	is_alpha(b) || b == b'_' || b == b'-'
}

fn is_name_byte(b: u8) -> bool {
	is_alpha(b) || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.')
}

// Word-shaped tokens end at whitespace or a statement terminator.
fn is_terminator(b: u8) -> bool {
	is_whitespace(b) || b == b';'
}

impl<R: Read> Lexer<R> {
	pub fn new(reader: R) -> Self {
		Lexer {
			reader,
			buf: Box::new([0; 4096]),
			pos: 0,
			filled: 0,
			stash: None,
			row: 1,
			col: 1,
		}
	}

	fn next_byte(&mut self) -> Result<Option<(u8, u32, u32)>, LexError> {
		if let Some(stashed) = self.stash.take() {
			return Ok(Some(stashed));
		}
		if self.pos == self.filled {
			self.pos = 0;
			self.filled = self.reader.read(&mut self.buf[..]).map_err(|e| LexError {
				row: self.row,
				col: self.col,
				cause: e.to_string(),
			})?;
			if self.filled == 0 {
				return Ok(None);
			}
		}
		let b = self.buf[self.pos];
		self.pos += 1;
		let at = (b, self.row, self.col);
		if b == b'\n' {
			self.row += 1;
			self.col = 1;
		} else {
			self.col += 1;
		}
		Ok(Some(at))
	}

	fn put_back(&mut self, b: u8, row: u32, col: u32) {
		self.stash = Some((b, row, col));
	}

	/// Scans the next token. Reaching end of input in the start state yields
	/// an `Eof` token; an unterminated quoted string is the only fatal case.
	pub fn scan(&mut self) -> Result<Token, LexError> {
		let mut state = State::Start;
		let mut raw: Vec<u8> = Vec::new();
		let mut row = self.row;
		let mut col = self.col;
		let token = |kind: TokenKind, raw: Vec<u8>, row: u32, col: u32| Token { kind, raw, row, col };
		loop {
			let Some((b, brow, bcol)) = self.next_byte()? else {
				return self.finish(state, raw, row, col);
			};
			match state {
				State::Start => {
					if is_whitespace(b) {
						continue;
					}
					row = brow;
					col = bcol;
					match b {
						b'n' => state = State::Keyword(b"null", TokenKind::Null),
						b't' => state = State::Keyword(b"true", TokenKind::True),
						b'f' => state = State::Keyword(b"false", TokenKind::False),
						b'r' => state = State::Keyword(b"return", TokenKind::Return),
						b'{' => return Ok(token(TokenKind::BlockBegin, vec![b], row, col)),
						b'}' => return Ok(token(TokenKind::BlockEnd, vec![b], row, col)),
						b'[' => return Ok(token(TokenKind::ArgBegin, vec![b], row, col)),
						b']' => return Ok(token(TokenKind::ArgEnd, vec![b], row, col)),
						b';' => return Ok(token(TokenKind::StmtEnd, vec![b], row, col)),
						b'~' => return Ok(token(TokenKind::Like, vec![b], row, col)),
						b'!' => state = State::Not,
						b'=' => state = State::AssignOrEq,
						b'>' => state = State::GtOrGte,
						b'<' => state = State::LtOrLte,
						b'|' => state = State::SepOrOr,
						b'&' => state = State::Amp,
						b'#' => state = State::Comment,
						b'"' => state = State::Str { quoted: true },
						_ if is_name_start(b) => state = State::Name,
						_ if b.is_ascii_digit() => state = State::Number,
						_ => state = State::Str { quoted: false },
					}
					if matches!(
						state,
						State::Keyword(..) | State::Name | State::Number | State::Str { quoted: false }
					) {
						raw.push(b);
					}
				},
				State::Keyword(kw, kind) => {
					if raw.len() < kw.len() && b == kw[raw.len()] {
						raw.push(b);
					} else if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						let kind = if raw == kw { kind } else { TokenKind::Name };
						return Ok(token(kind, raw, row, col));
					} else if is_name_byte(b) {
						raw.push(b);
						state = State::Name;
					} else {
						raw.push(b);
						state = State::Str { quoted: false };
					}
				},
				State::Name => {
					if is_name_byte(b) {
						raw.push(b);
					} else if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::Name, raw, row, col));
					} else {
						raw.push(b);
						state = State::Str { quoted: false };
					}
				},
				State::Number => {
					if b.is_ascii_digit() {
						raw.push(b);
					} else if b == b'.' {
						raw.push(b);
						state = State::Float;
					} else if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::Int, raw, row, col));
					} else {
						raw.push(b);
						state = State::Str { quoted: false };
					}
				},
				State::Float => {
					if b.is_ascii_digit() {
						raw.push(b);
					} else if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::Float, raw, row, col));
					} else {
						raw.push(b);
						state = State::Str { quoted: false };
					}
				},
				State::Str { quoted: true } => {
					if b == b'"' {
						return Ok(token(TokenKind::String, raw, row, col));
					}
					raw.push(b);
				},
				State::Str { quoted: false } => {
					if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::String, raw, row, col));
					}
					raw.push(b);
				},
				State::Comment => {
					if b == b'\n' {
						return Ok(token(TokenKind::Comment, raw, row, col));
					}
					raw.push(b);
				},
				State::Not => match b {
					b'=' => return Ok(token(TokenKind::Neq, b"!=".to_vec(), row, col)),
					b'~' => return Ok(token(TokenKind::NotLike, b"!~".to_vec(), row, col)),
					_ if is_terminator(b) => {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::String, b"!".to_vec(), row, col));
					},
					_ => {
						raw.push(b'!');
						raw.push(b);
						state = State::Str { quoted: false };
					},
				},
				State::AssignOrEq => {
					if b == b'=' {
						return Ok(token(TokenKind::Eq, b"==".to_vec(), row, col));
					}
					if !is_whitespace(b) {
						self.put_back(b, brow, bcol);
					}
					return Ok(token(TokenKind::Assign, b"=".to_vec(), row, col));
				},
				State::GtOrGte => {
					if b == b'=' {
						return Ok(token(TokenKind::Gte, b">=".to_vec(), row, col));
					}
					if !is_whitespace(b) {
						self.put_back(b, brow, bcol);
					}
					return Ok(token(TokenKind::Gt, b">".to_vec(), row, col));
				},
				State::LtOrLte => {
					if b == b'=' {
						return Ok(token(TokenKind::Lte, b"<=".to_vec(), row, col));
					}
					if !is_whitespace(b) {
						self.put_back(b, brow, bcol);
					}
					return Ok(token(TokenKind::Lt, b"<".to_vec(), row, col));
				},
				State::SepOrOr => {
					if b == b'|' {
						return Ok(token(TokenKind::Or, b"||".to_vec(), row, col));
					}
					if !is_whitespace(b) {
						self.put_back(b, brow, bcol);
					}
					return Ok(token(TokenKind::Sep, b"|".to_vec(), row, col));
				},
				State::Amp => {
					if b == b'&' {
						return Ok(token(TokenKind::And, b"&&".to_vec(), row, col));
					}
					raw.push(b'&');
					if is_terminator(b) {
						if b == b';' {
							self.put_back(b, brow, bcol);
						}
						return Ok(token(TokenKind::String, raw, row, col));
					}
					raw.push(b);
					state = State::Str { quoted: false };
				},
			}
		}
	}

	fn finish(&self, state: State, raw: Vec<u8>, row: u32, col: u32) -> Result<Token, LexError> {
		let token = |kind: TokenKind, raw: Vec<u8>| Token { kind, raw, row, col };
		match state {
			State::Start => Ok(token(TokenKind::Eof, Vec::new())),
			State::Keyword(kw, kind) => {
				let kind = if raw == kw { kind } else { TokenKind::Name };
				Ok(token(kind, raw))
			},
			State::Name => Ok(token(TokenKind::Name, raw)),
			State::Number => Ok(token(TokenKind::Int, raw)),
			State::Float => Ok(token(TokenKind::Float, raw)),
			State::Str { quoted: false } => Ok(token(TokenKind::String, raw)),
			State::Str { quoted: true } => Err(LexError {
				row,
				col,
				cause: "unterminated quoted string".to_string(),
			}),
			State::Comment => Ok(token(TokenKind::Comment, raw)),
			State::Not => Ok(token(TokenKind::String, b"!".to_vec())),
			State::AssignOrEq => Ok(token(TokenKind::Assign, b"=".to_vec())),
			State::GtOrGte => Ok(token(TokenKind::Gt, b">".to_vec())),
			State::LtOrLte => Ok(token(TokenKind::Lt, b"<".to_vec())),
			State::SepOrOr => Ok(token(TokenKind::Sep, b"|".to_vec())),
			State::Amp => Ok(token(TokenKind::String, b"&".to_vec())),
		}
	}
}
