//! GDB/MI wire protocol
//!
//! Stateless parsing of gdb's machine-interface output: [`record`] splits a
//! line into its record type, [`value`] decodes the nested payload syntax.

pub mod record;
pub mod value;

pub use record::{
    parse, try_parse, AsyncKind, AsyncRecord, ParseError, Record, ResultClass, ResultRecord,
    StreamKind, StreamRecord, PROMPT,
};
pub use value::{decode, DecodeError, List, Results, Value};
