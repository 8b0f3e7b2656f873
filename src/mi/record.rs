//! GDB/MI output records
//!
//! Every line gdb writes in MI mode is one record. The first character after
//! an optional numeric token selects the record type:
//!
//! | prefix        | record                                   |
//! |---------------|------------------------------------------|
//! | `^`           | result of the command with that token    |
//! | `*` `+` `=`   | exec / status / notify async record      |
//! | `~` `@` `&`   | console / target / log stream output     |
//! | `(gdb)`       | prompt, gdb is waiting for input         |

use std::fmt;

use super::value::{self, is_identifier_byte, Results};

/// Idle sentinel gdb prints when it is ready for the next command
pub const PROMPT: &str = "(gdb)";

/// One parsed line of gdb output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Result(ResultRecord),
    Async(AsyncRecord),
    Stream(StreamRecord),
    Prompt,
    Unrecognized { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub payload: Results,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
    /// Class identifier gdb may add in future versions
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRecord {
    pub token: Option<u64>,
    pub kind: AsyncKind,
    /// e.g. `stopped`, `running`, `thread-group-added`
    pub class: String,
    pub payload: Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*`: execution state changes
    Exec,
    /// `+`: progress of long-running operations
    Status,
    /// `=`: supplementary information
    Notify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Console,
    Target,
    Log,
}

/// A line that could not be parsed as an MI record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed MI record ({reason}): {raw}")]
pub struct ParseError {
    /// Token of a `^` result line whose body failed to parse
    pub token: Option<u64>,
    pub raw: String,
    pub reason: String,
}

impl ParseError {
    fn new(token: Option<u64>, raw: &str, reason: impl Into<String>) -> Self {
        Self { token, raw: raw.to_string(), reason: reason.into() }
    }
}

impl ResultClass {
    pub fn from_identifier(class: &str) -> Self {
        match class {
            "done" => ResultClass::Done,
            "running" => ResultClass::Running,
            "connected" => ResultClass::Connected,
            "error" => ResultClass::Error,
            "exit" => ResultClass::Exit,
            other => ResultClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResultClass::Done => "done",
            ResultClass::Running => "running",
            ResultClass::Connected => "connected",
            ResultClass::Error => "error",
            ResultClass::Exit => "exit",
            ResultClass::Other(class) => class,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResultClass::Error)
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsyncRecord {
    /// True for `*<class>` exec records
    pub fn is_exec(&self, class: &str) -> bool {
        self.kind == AsyncKind::Exec && self.class == class
    }

    /// `reason` field of a `*stopped` record
    pub fn reason(&self) -> Option<&str> {
        self.payload.get_str("reason")
    }
}

impl AsyncKind {
    fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '*' => Some(AsyncKind::Exec),
            '+' => Some(AsyncKind::Status),
            '=' => Some(AsyncKind::Notify),
            _ => None,
        }
    }
}

impl StreamKind {
    fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '~' => Some(StreamKind::Console),
            '@' => Some(StreamKind::Target),
            '&' => Some(StreamKind::Log),
            _ => None,
        }
    }
}

/// Parse one line of gdb output. Never fails: anything that is not a
/// well-formed record comes back as [`Record::Unrecognized`].
pub fn parse(line: &str) -> Record {
    try_parse(line).unwrap_or_else(|e| Record::Unrecognized { raw: e.raw })
}

/// Parse one line of gdb output, reporting why a line was rejected
pub fn try_parse(raw: &str) -> Result<Record, ParseError> {
    let line = raw.trim();
    if line == PROMPT {
        return Ok(Record::Prompt);
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let (token_text, rest) = line.split_at(digits);
    let token = if token_text.is_empty() {
        None
    } else {
        Some(
            token_text
                .parse::<u64>()
                .map_err(|_| ParseError::new(None, raw, "token out of range"))?,
        )
    };

    let mut chars = rest.chars();
    let Some(prefix) = chars.next() else {
        return Err(ParseError::new(None, raw, "missing record prefix"));
    };
    let body = chars.as_str();

    if prefix == '^' {
        let (class, payload) =
            class_and_payload(body).map_err(|reason| ParseError::new(token, raw, reason))?;
        return Ok(Record::Result(ResultRecord {
            token,
            class: ResultClass::from_identifier(class),
            payload,
        }));
    }

    if let Some(kind) = AsyncKind::from_prefix(prefix) {
        let (class, payload) =
            class_and_payload(body).map_err(|reason| ParseError::new(None, raw, reason))?;
        return Ok(Record::Async(AsyncRecord {
            token,
            kind,
            class: class.to_string(),
            payload,
        }));
    }

    if let Some(kind) = StreamKind::from_prefix(prefix) {
        if token.is_some() {
            return Err(ParseError::new(None, raw, "stream records carry no token"));
        }
        let text = value::decode_cstring(body)
            .map_err(|e| ParseError::new(None, raw, e.to_string()))?;
        return Ok(Record::Stream(StreamRecord { kind, text }));
    }

    Err(ParseError::new(None, raw, format!("unknown record prefix '{prefix}'")))
}

fn class_and_payload(body: &str) -> Result<(&str, Results), String> {
    let (class, rest) = match body.split_once(',') {
        Some((class, rest)) => (class, Some(rest)),
        None => (body, None),
    };
    if class.is_empty() || !class.bytes().all(is_identifier_byte) {
        return Err(format!("invalid class identifier '{class}'"));
    }
    let payload = match rest {
        Some(rest) => value::decode(rest).map_err(|e| e.to_string())?,
        None => Results::default(),
    };
    Ok((class, payload))
}
