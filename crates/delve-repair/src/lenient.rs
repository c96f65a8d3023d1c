//! Lenient parser for almost-JSON
//!
//! Recursive descent that accepts what strict JSON rejects but models emit:
//! - single-quoted strings and unquoted keys
//! - missing commas and colons, trailing commas
//! - `//` and `/* */` comments
//! - `True`/`False`/`None`/`undefined`
//! - raw newlines inside strings
//! - unterminated strings and containers, closed at end of input

use serde_json::{Map, Number, Value};

/// Nesting bound; deeper input is rejected rather than recursed into
const MAX_DEPTH: usize = 128;

/// Lenient parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LenientError {
    /// Nothing but whitespace and comments
    #[error("no value found")]
    Empty,

    /// Input nests deeper than the parser allows
    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),

    /// A character that cannot start a value
    #[error("unexpected {found:?} at offset {offset}")]
    Unexpected {
        /// Offending character
        found: char,
        /// Character offset
        offset: usize,
    },
}

/// Parse the first value in `text`, ignoring anything after it
///
/// # Errors
///
/// Returns [`LenientError`] when no value can be recognized at all.
pub fn parse_lenient(text: &str) -> Result<Value, LenientError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    parser.skip_trivia();
    if parser.peek().is_none() {
        return Err(LenientError::Empty);
    }
    parser.value(0)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '/' && self.peek_at(1) == Some('*') {
                self.pos += 2;
                while self.peek().is_some() {
                    if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                        self.pos += 2;
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, LenientError> {
        if depth > MAX_DEPTH {
            return Err(LenientError::TooDeep(MAX_DEPTH));
        }
        self.skip_trivia();
        match self.peek() {
            None => Ok(Value::Null),
            Some('{') => self.object(depth),
            Some('[') => self.array(depth),
            Some(q @ ('"' | '\'')) => Ok(Value::String(self.string(q))),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => Ok(self.number()),
            Some(c) if c.is_alphabetic() || c == '_' => Ok(self.word()),
            Some(found) => Err(LenientError::Unexpected {
                found,
                offset: self.pos,
            }),
        }
    }

    fn object(&mut self, depth: usize) -> Result<Value, LenientError> {
        self.pos += 1;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some('}' | ']') => {
                    self.pos += 1;
                    break;
                }
                Some(',' | ';') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            let Some(key) = self.key() else {
                // Unusable character in key position
                self.pos += 1;
                continue;
            };
            self.skip_trivia();
            if matches!(self.peek(), Some(':' | '=')) {
                self.pos += 1;
                self.skip_trivia();
            }
            let value = match self.peek() {
                None | Some(',' | '}' | ']') => Value::Null,
                _ => match self.value(depth + 1) {
                    Ok(v) => v,
                    Err(LenientError::Unexpected { .. }) => {
                        self.pos += 1;
                        Value::Null
                    }
                    Err(e) => return Err(e),
                },
            };
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    fn array(&mut self, depth: usize) -> Result<Value, LenientError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => break,
                Some(']' | '}') => {
                    self.pos += 1;
                    break;
                }
                Some(',') => {
                    self.pos += 1;
                    continue;
                }
                _ => {}
            }
            match self.value(depth + 1) {
                Ok(v) => items.push(v),
                Err(LenientError::Unexpected { .. }) => self.pos += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Array(items))
    }

    fn key(&mut self) -> Option<String> {
        match self.peek()? {
            q @ ('"' | '\'') => Some(self.string(q)),
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || matches!(c, ':' | '=' | ',' | '{' | '}' | '[' | ']' | '"' | '\'') {
                        break;
                    }
                    self.pos += 1;
                }
                (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
            }
        }
    }

    fn string(&mut self, quote: char) -> String {
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == quote {
                return out;
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(esc) = self.peek() else { break };
            self.pos += 1;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => out.push(self.unicode_escape()),
                other => out.push(other),
            }
        }
        out
    }

    fn hex4(&mut self) -> Option<u32> {
        let digits: String = self.chars.get(self.pos..self.pos + 4)?.iter().collect();
        let code = u32::from_str_radix(&digits, 16).ok()?;
        self.pos += 4;
        Some(code)
    }

    fn unicode_escape(&mut self) -> char {
        let Some(high) = self.hex4() else {
            return 'u';
        };
        if (0xD800..0xDC00).contains(&high) && self.peek() == Some('\\') && self.peek_at(1) == Some('u') {
            let save = self.pos;
            self.pos += 2;
            if let Some(low) = self.hex4().filter(|l| (0xDC00..0xE000).contains(l)) {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
            }
            self.pos = save;
        }
        char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn number(&mut self) -> Value {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let text = text.trim_start_matches('+');
        if let Ok(i) = text.parse::<i64>() {
            return Value::Number(i.into());
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::String(text.to_string()), Value::Number)
    }

    fn word(&mut self) -> Value {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | '}' | ']' | ':' | '\n') {
                break;
            }
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.trim() {
            "true" | "True" => Value::Bool(true),
            "false" | "False" => Value::Bool(false),
            "null" | "None" | "undefined" | "NaN" => Value::Null,
            other => Value::String(other.to_string()),
        }
    }
}
