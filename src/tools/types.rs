//! Type definitions for gdb debug MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

// ============================================================================
// gdb_start
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartArgs {
    /// Program to debug (path to an executable built with -g). Can also be loaded later with gdb_load.
    #[serde(default)]
    pub program: Option<String>,
    /// Working directory for gdb and the program. Defaults to the server's configured directory.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Extra gdb command-line arguments (e.g., ["-nx"])
    #[serde(default)]
    pub extra_args: Option<Vec<String>>,
}

// ============================================================================
// gdb_terminate
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TerminateArgs {
    /// Session ID to terminate
    pub session_id: String,
}

// ============================================================================
// gdb_list_sessions
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListSessionsArgs {}

// ============================================================================
// gdb_command / gdb_mi_command
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommandArgs {
    /// Session ID
    pub session_id: String,
    /// gdb CLI command (e.g., "info frame")
    pub command: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MiCommandArgs {
    /// Session ID
    pub session_id: String,
    /// MI command, with or without the leading dash (e.g., "-stack-info-depth")
    pub command: String,
    /// Seconds to wait for the result (default: server command timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// gdb_load / gdb_attach / gdb_load_core
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadArgs {
    /// Session ID
    pub session_id: String,
    /// Path to the executable
    pub program: String,
    /// Arguments for the program on the next run
    #[serde(default)]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AttachArgs {
    /// Session ID
    pub session_id: String,
    /// Process ID to attach to
    pub pid: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LoadCoreArgs {
    /// Session ID
    pub session_id: String,
    /// Executable that produced the core dump
    pub program: String,
    /// Path to the core file
    pub core_path: String,
}

// ============================================================================
// gdb_set_breakpoint
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetBreakpointArgs {
    /// Session ID
    pub session_id: String,
    /// Location: function name, file:line, or *address (e.g., "main", "loop.c:12")
    pub location: String,
    /// Only stop when this expression is true (e.g., "i == 5")
    #[serde(default)]
    pub condition: Option<String>,
}

// ============================================================================
// gdb_run / gdb_continue / gdb_finish / gdb_interrupt / gdb_wait_for_stop
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecArgs {
    /// Session ID
    pub session_id: String,
    /// Seconds to wait for the target to stop (default: server stop timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// gdb_step / gdb_next
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StepArgs {
    /// Session ID
    pub session_id: String,
    /// Step one machine instruction instead of one source line (default: false)
    #[serde(default)]
    pub instruction: bool,
    /// Seconds to wait for the target to stop (default: server stop timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

// ============================================================================
// gdb_backtrace
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BacktraceArgs {
    /// Session ID
    pub session_id: String,
    /// Maximum number of frames (default: all)
    #[serde(default)]
    pub limit: Option<u32>,
    /// Also list local variables and arguments of the current frame (default: false)
    #[serde(default)]
    pub full: bool,
}

// ============================================================================
// gdb_print
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PrintArgs {
    /// Session ID
    pub session_id: String,
    /// C expression to evaluate in the current frame
    pub expression: String,
}

// ============================================================================
// gdb_examine
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExamineArgs {
    /// Session ID
    pub session_id: String,
    /// Address expression (e.g., "&i", "0x7fffffffe000")
    pub expression: String,
    /// gdb x/ format letter: x, d, u, o, t, a, c, f, s, i (default: "x")
    #[serde(default = "default_examine_format")]
    pub format: String,
    /// Number of units to display (default: 8)
    #[serde(default = "default_examine_count")]
    pub count: u32,
}

fn default_examine_format() -> String { "x".to_string() }
fn default_examine_count() -> u32 { 8 }

// ============================================================================
// gdb_info_registers
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InfoRegistersArgs {
    /// Session ID
    pub session_id: String,
    /// Register names to show (default: all)
    #[serde(default)]
    pub registers: Option<Vec<String>>,
}
