//!
//! Decoder for the JavaScript object literals the chat service embeds in its bootstrap page
//! and returns from protojson endpoints.
//!
//! The accepted language is a superset of JSON: unquoted object keys, single-quoted strings,
//! sparse arrays (`[1,,3]`), `undefined`, and `function(){return <value>}` wrappers around the
//! payload. Everything decodes into a plain `serde_json::Value`.

use super::types::DecodeError;
use serde_json::{Map, Number, Value};

/// Turns one embedded literal into a nested value.
pub trait LiteralDecoder: Send + Sync {
	/// Decode `text`, which must contain exactly one literal (surrounding whitespace allowed).
	fn decode(&self, text: &str) -> Result<Value, DecodeError>;
}

/// Default decoder for the vendor's literal format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsLiteralDecoder;

impl LiteralDecoder for JsLiteralDecoder {
	fn decode(&self, text: &str) -> Result<Value, DecodeError> {
		let mut parser = Parser::new(text);
		let value = parser.parse_value()?;
		parser.skip_whitespace();
		match parser.peek() {
			Some(c) => Err(parser.error(format!("trailing character '{}'", c))),
			None => Ok(value),
		}
	}
}

/// Deepest nesting of arrays, objects and function wrappers accepted.
const MAX_DEPTH: usize = 128;

struct Parser {
	chars: Vec<char>,
	pos: usize,
	depth: usize,
}

fn is_identifier_start(c: char) -> bool {
	c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_char(c: char) -> bool {
	is_identifier_start(c) || c.is_ascii_digit()
}

impl Parser {
	fn new(text: &str) -> Self {
		Self {
			chars: text.chars().collect(),
			pos: 0,
			depth: 0,
		}
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek();
		if c.is_some() {
			self.pos += 1;
		}
		c
	}

	fn error(&self, message: impl Into<String>) -> DecodeError {
		DecodeError::Syntax {
			position: self.pos,
			message: message.into(),
		}
	}

	fn skip_whitespace(&mut self) {
		while matches!(self.peek(), Some(c) if c.is_whitespace()) {
			self.pos += 1;
		}
	}

	fn expect(&mut self, expected: char) -> Result<(), DecodeError> {
		self.skip_whitespace();
		match self.bump() {
			Some(c) if c == expected => Ok(()),
			Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
			None => Err(self.error(format!("expected '{}', found end of input", expected))),
		}
	}

	fn parse_value(&mut self) -> Result<Value, DecodeError> {
		if self.depth >= MAX_DEPTH {
			return Err(self.error("recursion limit exceeded"));
		}
		self.depth += 1;
		let value = self.parse_nested();
		self.depth -= 1;
		value
	}

	fn parse_nested(&mut self) -> Result<Value, DecodeError> {
		self.skip_whitespace();
		match self.peek() {
			Some('{') => self.parse_object(),
			Some('[') => self.parse_array(),
			Some(quote @ ('"' | '\'')) => self.parse_string(quote).map(Value::String),
			Some(c) if c == '-' || c == '.' || c.is_ascii_digit() => self.parse_number(),
			Some(c) if is_identifier_start(c) => self.parse_keyword(),
			Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
			None => Err(self.error("unexpected end of input")),
		}
	}

	fn parse_identifier(&mut self) -> String {
		let start = self.pos;
		while matches!(self.peek(), Some(c) if is_identifier_char(c)) {
			self.pos += 1;
		}
		self.chars[start..self.pos].iter().collect()
	}

	fn parse_object(&mut self) -> Result<Value, DecodeError> {
		self.expect('{')?;
		let mut map = Map::new();
		loop {
			self.skip_whitespace();
			let key = match self.peek() {
				Some('}') => {
					self.pos += 1;
					return Ok(Value::Object(map));
				}
				Some(quote @ ('"' | '\'')) => self.parse_string(quote)?,
				Some(c) if is_identifier_char(c) => self.parse_identifier(),
				Some(c) => return Err(self.error(format!("invalid object key start '{}'", c))),
				None => return Err(self.error("unterminated object")),
			};
			self.expect(':')?;
			let value = self.parse_value()?;
			map.insert(key, value);

			self.skip_whitespace();
			match self.bump() {
				Some(',') => {}
				Some('}') => return Ok(Value::Object(map)),
				Some(c) => return Err(self.error(format!("expected ',' or '}}', found '{}'", c))),
				None => return Err(self.error("unterminated object")),
			}
		}
	}

	fn parse_array(&mut self) -> Result<Value, DecodeError> {
		self.expect('[')?;
		let mut items = Vec::new();
		loop {
			self.skip_whitespace();
			match self.peek() {
				Some(']') => {
					self.pos += 1;
					return Ok(Value::Array(items));
				}
				// elided element
				Some(',') => {
					self.pos += 1;
					items.push(Value::Null);
					continue;
				}
				_ => {}
			}
			items.push(self.parse_value()?);

			self.skip_whitespace();
			match self.bump() {
				Some(',') => {}
				Some(']') => return Ok(Value::Array(items)),
				Some(c) => return Err(self.error(format!("expected ',' or ']', found '{}'", c))),
				None => return Err(self.error("unterminated array")),
			}
		}
	}

	fn parse_string(&mut self, quote: char) -> Result<String, DecodeError> {
		self.pos += 1;
		let mut out = String::new();
		loop {
			match self.bump() {
				None => return Err(self.error("unterminated string")),
				Some(c) if c == quote => return Ok(out),
				Some('\\') => {
					let escaped = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
					match escaped {
						'n' => out.push('\n'),
						't' => out.push('\t'),
						'r' => out.push('\r'),
						'b' => out.push('\u{8}'),
						'f' => out.push('\u{c}'),
						'v' => out.push('\u{b}'),
						'0' => out.push('\0'),
						'x' => {
							let code = self.parse_hex(2)?;
							out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
						}
						'u' => out.push(self.parse_unicode_escape()?),
						// line continuation
						'\n' => {}
						other => out.push(other),
					}
				}
				Some(c) => out.push(c),
			}
		}
	}

	fn parse_hex(&mut self, digits: usize) -> Result<u32, DecodeError> {
		let end = self.pos + digits;
		if end > self.chars.len() {
			return Err(self.error("truncated hex escape"));
		}
		let text: String = self.chars[self.pos..end].iter().collect();
		let code = u32::from_str_radix(&text, 16)
			.map_err(|_| self.error(format!("invalid hex escape '{}'", text)))?;
		self.pos = end;
		Ok(code)
	}

	fn parse_unicode_escape(&mut self) -> Result<char, DecodeError> {
		let high = self.parse_hex(4)?;
		if (0xD800..0xDC00).contains(&high)
			&& self.chars.get(self.pos) == Some(&'\\')
			&& self.chars.get(self.pos + 1) == Some(&'u')
		{
			self.pos += 2;
			let low = self.parse_hex(4)?;
			if (0xDC00..0xE000).contains(&low) {
				let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
				return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
			}
			return Ok(char::REPLACEMENT_CHARACTER);
		}
		Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
	}

	fn parse_number(&mut self) -> Result<Value, DecodeError> {
		let start = self.pos;
		while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
		{
			self.pos += 1;
		}
		let text: String = self.chars[start..self.pos].iter().collect();

		if !text.contains(['.', 'e', 'E']) {
			if let Ok(n) = text.parse::<i64>() {
				return Ok(Value::from(n));
			}
			if let Ok(n) = text.parse::<u64>() {
				return Ok(Value::from(n));
			}
		}
		text.parse::<f64>()
			.ok()
			.and_then(Number::from_f64)
			.map(Value::Number)
			.ok_or_else(|| self.error(format!("invalid number '{}'", text)))
	}

	fn parse_keyword(&mut self) -> Result<Value, DecodeError> {
		let word = self.parse_identifier();
		match word.as_str() {
			"true" => Ok(Value::Bool(true)),
			"false" => Ok(Value::Bool(false)),
			"null" | "undefined" => Ok(Value::Null),
			"function" => self.parse_function_body(),
			other => Err(self.error(format!("unexpected identifier '{}'", other))),
		}
	}

	/// `function(...){return <value>}` yields `<value>`.
	fn parse_function_body(&mut self) -> Result<Value, DecodeError> {
		while let Some(c) = self.bump() {
			if c == '{' {
				self.skip_whitespace();
				let keyword = self.parse_identifier();
				if keyword != "return" {
					return Err(self.error(format!("expected 'return', found '{}'", keyword)));
				}
				let value = self.parse_value()?;
				self.skip_whitespace();
				if self.peek() == Some(';') {
					self.pos += 1;
				}
				self.expect('}')?;
				return Ok(value);
			}
		}
		Err(self.error("unterminated function"))
	}
}
