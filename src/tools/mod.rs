//! gdb debug MCP tools module
//!
//! A single tool handler that maps debugger actions onto GDB/MI commands,
//! using the RMCP 0.3.2 API patterns.

pub mod commands;
pub mod gdb_tools;
pub mod types;

pub use gdb_tools::*;
pub use types::*;
