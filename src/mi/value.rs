//! GDB/MI value grammar
//!
//! Result and async records carry a comma-separated list of `name=value`
//! pairs after their class identifier. Values nest arbitrarily:
//!
//! ```text
//! results  := [ pair (',' pair)* ]
//! pair     := identifier '=' value
//! value    := c-string | tuple | list
//! tuple    := '{' [ pair (',' pair)* ] '}'
//! list     := '[' [ value (',' value)* | pair (',' pair)* ] ']'
//! ```
//!
//! Lists come in two shapes: bare values (`register-values=[{...},{...}]`)
//! and named results (`body=[bkpt={...},bkpt={...}]`). Both are kept as
//! decoded; neither is coerced into the other.

use std::fmt;

use serde_json::{Map, Value as Json};

/// Deepest tuple/list nesting accepted before decoding fails
pub const MAX_DEPTH: usize = 256;

/// A single MI value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    /// `{k=v,...}`; keys may repeat and order is preserved
    Tuple(Vec<(String, Value)>),
    List(List),
}

/// Contents of an MI list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum List {
    /// `[v,v,...]`; an empty list `[]` decodes to this form
    Values(Vec<Value>),
    /// `[k=v,k=v,...]`
    Results(Vec<(String, Value)>),
}

/// Top-level payload of a result or async record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Results(Vec<(String, Value)>);

/// Malformed value syntax
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct DecodeError {
    /// Byte offset into the decoded body
    pub offset: usize,
    pub message: String,
}

impl DecodeError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self { offset, message: message.into() }
    }
}

impl Results {
    pub fn new(pairs: Vec<(String, Value)>) -> Self {
        Self(pairs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&Value> {
        find(&self.0, key)
    }

    /// Every value stored under `key`, in order
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.0.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.0
    }

    pub fn to_json(&self) -> Json {
        pairs_to_json(&self.0)
    }
}

impl From<Vec<(String, Value)>> for Results {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Self(pairs)
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Tuple(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Look up `key` in a tuple or a named-result list
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Tuple(pairs) | Value::List(List::Results(pairs)) => find(pairs, key),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// JSON view of the value: tuples become objects (repeated keys collect
    /// into arrays), lists become arrays.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Str(s) => Json::String(s.clone()),
            Value::Tuple(pairs) => pairs_to_json(pairs),
            Value::List(List::Values(values)) => {
                Json::Array(values.iter().map(Value::to_json).collect())
            }
            Value::List(List::Results(pairs)) => Json::Array(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        let mut entry = Map::new();
                        entry.insert(k.clone(), v.to_json());
                        Json::Object(entry)
                    })
                    .collect(),
            ),
        }
    }
}

impl List {
    pub fn len(&self) -> usize {
        match self {
            List::Values(values) => values.len(),
            List::Results(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn find<'a>(pairs: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn pairs_to_json(pairs: &[(String, Value)]) -> Json {
    let mut object = Map::new();
    for (key, value) in pairs {
        let repeated = pairs.iter().filter(|(k, _)| k == key).count() > 1;
        if !repeated {
            object.insert(key.clone(), value.to_json());
            continue;
        }
        if let Json::Array(items) = object
            .entry(key.clone())
            .or_insert_with(|| Json::Array(Vec::new()))
        {
            items.push(value.to_json());
        }
    }
    Json::Object(object)
}

/// Escape `s` for use inside an MI c-string (without the surrounding quotes)
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "\"{}\"", escape(s)),
            Value::Tuple(pairs) => {
                f.write_str("{")?;
                write_pairs(f, pairs)?;
                f.write_str("}")
            }
            Value::List(List::Values(values)) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            Value::List(List::Results(pairs)) => {
                f.write_str("[")?;
                write_pairs(f, pairs)?;
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Results {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pairs(f, &self.0)
    }
}

fn write_pairs(f: &mut fmt::Formatter<'_>, pairs: &[(String, Value)]) -> fmt::Result {
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{key}={value}")?;
    }
    Ok(())
}

pub(crate) fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')
}

/// Decode the `name=value,...` body that follows a record's class
pub fn decode(body: &str) -> Result<Results, DecodeError> {
    let mut decoder = Decoder::new(body);
    let pairs = decoder.results()?;
    Ok(Results(pairs))
}

/// Decode a body consisting of exactly one c-string literal
pub fn decode_cstring(input: &str) -> Result<String, DecodeError> {
    let mut decoder = Decoder::new(input);
    let text = decoder.cstring()?;
    decoder.finish()?;
    Ok(text)
}

/// Recursive-descent cursor over the value grammar
struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(input: &'a str) -> Self {
        Self { bytes: input.as_bytes(), pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, DecodeError> {
        Err(DecodeError::new(self.pos, message))
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T, DecodeError> {
        match self.peek() {
            Some(b) => self.error(format!("expected {expected}, found '{}'", b as char)),
            None => self.error(format!("expected {expected}, found end of input")),
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), DecodeError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            self.unexpected(&format!("'{}'", byte as char))
        }
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            self.unexpected("end of input")
        }
    }

    fn results(&mut self) -> Result<Vec<(String, Value)>, DecodeError> {
        let mut pairs = Vec::new();
        if self.peek().is_none() {
            return Ok(pairs);
        }
        loop {
            pairs.push(self.pair()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                None => return Ok(pairs),
                Some(_) => return self.unexpected("',' or end of input"),
            }
        }
    }

    fn pair(&mut self) -> Result<(String, Value), DecodeError> {
        let key = self.identifier()?;
        self.expect(b'=')?;
        let value = self.value()?;
        Ok((key, value))
    }

    fn identifier(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_byte) {
            self.pos += 1;
        }
        if self.pos == start {
            return self.unexpected("identifier");
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        match self.peek() {
            Some(b'"') => self.cstring().map(Value::Str),
            Some(b'{') => self.nested(Self::tuple),
            Some(b'[') => self.nested(Self::list),
            _ => self.unexpected("value"),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Value, DecodeError>,
    ) -> Result<Value, DecodeError> {
        if self.depth >= MAX_DEPTH {
            return self.error(format!("nesting deeper than {MAX_DEPTH} levels"));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn tuple(&mut self) -> Result<Value, DecodeError> {
        self.expect(b'{')?;
        let mut pairs = Vec::new();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Tuple(pairs));
        }
        loop {
            pairs.push(self.pair()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(Value::Tuple(pairs));
                }
                _ => return self.unexpected("',' or '}'"),
            }
        }
    }

    fn list(&mut self) -> Result<Value, DecodeError> {
        self.expect(b'[')?;
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::List(List::Values(Vec::new())));
        }

        // The first element decides the list's shape; the rest must agree.
        if matches!(self.peek(), Some(b'"' | b'{' | b'[')) {
            let mut values = Vec::new();
            loop {
                values.push(self.value()?);
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b']') => {
                        self.pos += 1;
                        return Ok(Value::List(List::Values(values)));
                    }
                    _ => return self.unexpected("',' or ']'"),
                }
            }
        }

        let mut pairs = Vec::new();
        loop {
            pairs.push(self.pair()?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Value::List(List::Results(pairs)));
                }
                _ => return self.unexpected("',' or ']'"),
            }
        }
    }

    fn cstring(&mut self) -> Result<String, DecodeError> {
        let open = self.pos;
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(DecodeError::new(open, "unterminated string"));
            };
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => self.escape(&mut out)?,
                _ => out.push(b),
            }
        }
        // Octal escapes may spell out bytes that are not valid UTF-8 on their own.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let Some(b) = self.peek() else {
            return self.error("unterminated escape sequence");
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'e' => out.push(0x1b),
            b'0'..=b'7' => {
                let mut code = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                let byte = u8::try_from(code)
                    .map_err(|_| DecodeError::new(self.pos, format!("octal escape \\{code:o} out of range")))?;
                out.push(byte);
            }
            // \" \\ and any unknown escape stand for the character itself
            other => out.push(other),
        }
        Ok(())
    }
}
