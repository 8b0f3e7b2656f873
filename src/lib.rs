//! gdb Debug MCP Server
//!
//! A Model Context Protocol server for native debugging through gdb's machine
//! interface (GDB/MI). Each session drives one `gdb --interpreter=mi` process
//! over its stdio pipes; commands are correlated with their results by token.

pub mod config;
pub mod error;
pub mod mi;
pub mod registry;
pub mod session;
pub mod tools;

pub use config::{Args, Config, Timeouts};
pub use error::{Result, SessionError};
pub use registry::{SessionInfo, SessionRegistry};
pub use session::{CommandOutcome, GdbSession, ReadyState, RunState, SpawnConfig, StopOutcome};
pub use tools::GdbDebugToolHandler;
