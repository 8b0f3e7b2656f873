//! RMCP 0.3.2 implementation for gdb debug MCP tools
//!
//! Each tool maps onto one or more GDB/MI commands run through the
//! [`SessionRegistry`]. Results are JSON text documents.

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
};
use serde_json::json;
use tracing::{info, warn};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::commands::{self, ExecAction};
use super::types::*;
use crate::config::Config;
use crate::error::SessionError;
use crate::mi::{AsyncRecord, List, Value};
use crate::registry::SessionRegistry;
use crate::session::{CommandOutcome, GdbSession, RunState, SpawnConfig, StopOutcome};

/// gdb debug tool handler
#[derive(Clone)]
pub struct GdbDebugToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<GdbDebugToolHandler>,
    config: Config,
    registry: Arc<SessionRegistry>,
}

impl GdbDebugToolHandler {
    pub fn new(config: Config, registry: Arc<SessionRegistry>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    async fn session(&self, session_id: &str) -> Result<Arc<GdbSession>, McpError> {
        self.registry.lookup(session_id).await.map_err(to_mcp_error)
    }

    fn stop_timeout(&self, timeout_secs: Option<u64>) -> Duration {
        timeout_secs.map(Duration::from_secs).unwrap_or(self.config.timeouts.stop)
    }

    /// Register for the next stop, send the resume command, then wait.
    async fn resume(
        &self,
        session_id: &str,
        action: ExecAction,
        timeout_secs: Option<u64>,
    ) -> Result<CallToolResult, McpError> {
        let session = self.session(session_id).await?;
        let timeout = self.stop_timeout(timeout_secs);

        let waiter = session.stop_waiter().await.map_err(to_mcp_error)?;
        let outcome = session.execute(action.command()).await.map_err(to_mcp_error)?;
        let mut report = match waiter.poll(timeout).await.map_err(to_mcp_error)? {
            StopOutcome::Stopped(record) => stop_json(&record),
            StopOutcome::StillRunning => no_stop_json(session.run_state().await, timeout),
        };

        report["command"] = json!(action.command());
        report["result"] = json!(outcome.class.as_str());
        if !outcome.output.is_empty() {
            report["output"] = json!(outcome.output);
        }
        json_result(&report)
    }
}

fn to_mcp_error(e: SessionError) -> McpError {
    let data = Some(json!({ "kind": e.kind() }));
    match e {
        SessionError::NotFound(_) | SessionError::NotReady(_) | SessionError::InvalidCommand(_) => {
            McpError::invalid_params(e.to_string(), data)
        }
        _ => McpError::internal_error(e.to_string(), data),
    }
}

fn json_result(value: &serde_json::Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("Serialization error: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn outcome_json(outcome: &CommandOutcome) -> serde_json::Value {
    json!({
        "result": outcome.class.as_str(),
        "payload": outcome.payload.to_json(),
        "output": outcome.output,
    })
}

fn stop_json(record: &AsyncRecord) -> serde_json::Value {
    json!({
        "stopped": true,
        "state": RunState::Stopped,
        "reason": record.reason(),
        "frame": record.payload.get("frame").map(Value::to_json),
        "details": record.payload.to_json(),
    })
}

fn no_stop_json(run_state: RunState, timeout: Duration) -> serde_json::Value {
    json!({
        "stopped": false,
        "state": run_state,
        "message": format!(
            "No stop within {:?}. Use gdb_wait_for_stop to keep waiting or gdb_interrupt to pause.",
            timeout
        ),
    })
}

/// Flatten `[frame={..},frame={..}]` into an array of frame objects
fn unwrap_results_list(value: Option<&Value>) -> serde_json::Value {
    match value {
        Some(Value::List(List::Results(items))) => {
            items.iter().map(|(_, item)| item.to_json()).collect()
        }
        Some(other) => other.to_json(),
        None => json!([]),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value.and_then(Value::as_list) {
        Some(List::Values(items)) => items
            .iter()
            .map(|item| item.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    }
}

#[tool_router]
impl GdbDebugToolHandler {
    // =========================================================================
    // Session Management (3 tools)
    // =========================================================================

    #[tool(description = "Start a gdb session (GDB/MI). Optionally loads a program. Returns session_id for use with other tools.")]
    async fn gdb_start(&self, Parameters(args): Parameters<StartArgs>) -> Result<CallToolResult, McpError> {
        let gdb_path = self.config.find_gdb().map_err(|e| {
            McpError::internal_error(e, Some(json!({ "kind": "spawn_failed" })))
        })?;
        let working_dir = self
            .config
            .resolve_working_dir(args.working_dir.as_deref().map(Path::new));

        let mut spawn = SpawnConfig::new(gdb_path, working_dir)
            .with_extra_args(args.extra_args.unwrap_or_default());
        if let Some(program) = &args.program {
            spawn = spawn.with_program(program);
        }

        let session_id = self.registry.create(spawn).await.map_err(to_mcp_error)?;
        let session = self.session(&session_id).await?;

        // Lets -exec-interrupt reach a running target
        if let Err(e) = session.execute("gdb-set mi-async on").await {
            warn!("Session {}: could not enable mi-async: {}", session_id, e);
        }

        info!("Session {} started", session_id);
        json_result(&json!({
            "session_id": session_id,
            "program": args.program,
            "working_dir": session.working_dir().display().to_string(),
            "state": session.ready_state(),
        }))
    }

    #[tool(description = "Exit gdb and release the session")]
    async fn gdb_terminate(&self, Parameters(args): Parameters<TerminateArgs>) -> Result<CallToolResult, McpError> {
        self.registry.terminate(&args.session_id).await.map_err(to_mcp_error)?;
        json_result(&json!({
            "session_id": args.session_id,
            "terminated": true,
        }))
    }

    #[tool(description = "List active gdb sessions with their run state")]
    async fn gdb_list_sessions(&self, Parameters(_args): Parameters<ListSessionsArgs>) -> Result<CallToolResult, McpError> {
        let sessions = self.registry.list().await;
        json_result(&json!({
            "count": sessions.len(),
            "sessions": sessions,
        }))
    }

    // =========================================================================
    // Raw Commands (2 tools)
    // =========================================================================

    #[tool(description = "Run a gdb CLI command (e.g. \"info frame\") and return its console output")]
    async fn gdb_command(&self, Parameters(args): Parameters<CommandArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let outcome = session
            .execute(&commands::console(&args.command))
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({
            "command": args.command,
            "output": outcome.output,
        }))
    }

    #[tool(description = "Run a raw GDB/MI command and return the decoded result record")]
    async fn gdb_mi_command(&self, Parameters(args): Parameters<MiCommandArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let timeout = args
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.timeouts.command);
        let outcome = session
            .execute_with_timeout(&args.command, timeout)
            .await
            .map_err(to_mcp_error)?;
        json_result(&outcome_json(&outcome))
    }

    // =========================================================================
    // Program Loading (3 tools)
    // =========================================================================

    #[tool(description = "Load an executable and its symbols, optionally setting program arguments")]
    async fn gdb_load(&self, Parameters(args): Parameters<LoadArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let outcome = session
            .execute(&commands::file_exec_and_symbols(&args.program))
            .await
            .map_err(to_mcp_error)?;

        let program_args = args.args.unwrap_or_default();
        if !program_args.is_empty() {
            session
                .execute(&commands::exec_arguments(&program_args))
                .await
                .map_err(to_mcp_error)?;
        }

        info!("Session {}: loaded {}", args.session_id, args.program);
        json_result(&json!({
            "program": args.program,
            "args": program_args,
            "output": outcome.output,
        }))
    }

    #[tool(description = "Attach to a running process by PID. The process stops on attach.")]
    async fn gdb_attach(&self, Parameters(args): Parameters<AttachArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let waiter = session.stop_waiter().await.map_err(to_mcp_error)?;
        let outcome = session
            .execute(&commands::target_attach(args.pid))
            .await
            .map_err(to_mcp_error)?;

        let timeout = self.config.timeouts.stop;
        let mut report = match waiter.poll(timeout).await.map_err(to_mcp_error)? {
            StopOutcome::Stopped(record) => stop_json(&record),
            StopOutcome::StillRunning => no_stop_json(session.run_state().await, timeout),
        };
        report["pid"] = json!(args.pid);
        report["output"] = json!(outcome.output);
        json_result(&report)
    }

    #[tool(description = "Load an executable together with a core dump for post-mortem debugging")]
    async fn gdb_load_core(&self, Parameters(args): Parameters<LoadCoreArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        session
            .execute(&commands::file_exec_and_symbols(&args.program))
            .await
            .map_err(to_mcp_error)?;
        let outcome = session
            .execute(&commands::core_file(&args.core_path))
            .await
            .map_err(to_mcp_error)?;

        json_result(&json!({
            "program": args.program,
            "core": args.core_path,
            "output": outcome.output,
        }))
    }

    // =========================================================================
    // Breakpoints (1 tool)
    // =========================================================================

    #[tool(description = "Insert a breakpoint at a function, file:line or *address, with an optional condition")]
    async fn gdb_set_breakpoint(&self, Parameters(args): Parameters<SetBreakpointArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let outcome = session
            .execute(&commands::break_insert(&args.location, args.condition.as_deref()))
            .await
            .map_err(to_mcp_error)?;

        let bkpt = outcome.payload.get("bkpt").map(Value::to_json);
        info!("Session {}: breakpoint at {}", args.session_id, args.location);
        json_result(&json!({
            "location": args.location,
            "condition": args.condition,
            "breakpoint": bkpt,
        }))
    }

    // =========================================================================
    // Execution Control (5 tools)
    // =========================================================================

    #[tool(description = "Run the loaded program from the start and wait for it to stop (breakpoint, signal or exit)")]
    async fn gdb_run(&self, Parameters(args): Parameters<ExecArgs>) -> Result<CallToolResult, McpError> {
        self.resume(&args.session_id, ExecAction::Run, args.timeout_secs).await
    }

    #[tool(description = "Continue execution and wait for the next stop")]
    async fn gdb_continue(&self, Parameters(args): Parameters<ExecArgs>) -> Result<CallToolResult, McpError> {
        self.resume(&args.session_id, ExecAction::Continue, args.timeout_secs).await
    }

    #[tool(description = "Step one source line (or instruction), entering function calls")]
    async fn gdb_step(&self, Parameters(args): Parameters<StepArgs>) -> Result<CallToolResult, McpError> {
        let action = ExecAction::Step { instruction: args.instruction };
        self.resume(&args.session_id, action, args.timeout_secs).await
    }

    #[tool(description = "Step one source line (or instruction), stepping over function calls")]
    async fn gdb_next(&self, Parameters(args): Parameters<StepArgs>) -> Result<CallToolResult, McpError> {
        let action = ExecAction::Next { instruction: args.instruction };
        self.resume(&args.session_id, action, args.timeout_secs).await
    }

    #[tool(description = "Run until the current function returns")]
    async fn gdb_finish(&self, Parameters(args): Parameters<ExecArgs>) -> Result<CallToolResult, McpError> {
        self.resume(&args.session_id, ExecAction::Finish, args.timeout_secs).await
    }

    // =========================================================================
    // Stop Handling (2 tools)
    // =========================================================================

    #[tool(description = "Interrupt a running program and wait for it to stop")]
    async fn gdb_interrupt(&self, Parameters(args): Parameters<ExecArgs>) -> Result<CallToolResult, McpError> {
        self.resume(&args.session_id, ExecAction::Interrupt, args.timeout_secs).await
    }

    #[tool(description = "Wait for the running program to stop. Returns immediately if it is already stopped.")]
    async fn gdb_wait_for_stop(&self, Parameters(args): Parameters<ExecArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let timeout = self.stop_timeout(args.timeout_secs);

        let waiter = session.stop_waiter().await.map_err(to_mcp_error)?;
        if let Some(record) = session.current_stop().await {
            let mut report = stop_json(&record);
            report["already_stopped"] = json!(true);
            return json_result(&report);
        }

        let report = match waiter.poll(timeout).await.map_err(to_mcp_error)? {
            StopOutcome::Stopped(record) => stop_json(&record),
            StopOutcome::StillRunning => no_stop_json(session.run_state().await, timeout),
        };
        json_result(&report)
    }

    // =========================================================================
    // Inspection (4 tools)
    // =========================================================================

    #[tool(description = "Show the call stack; with full=true also the current frame's locals and arguments")]
    async fn gdb_backtrace(&self, Parameters(args): Parameters<BacktraceArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let frames = session
            .execute(&commands::stack_list_frames(args.limit))
            .await
            .map_err(to_mcp_error)?;

        let mut report = json!({ "frames": unwrap_results_list(frames.payload.get("stack")) });
        if args.full {
            let variables = session
                .execute(&commands::stack_list_variables())
                .await
                .map_err(to_mcp_error)?;
            report["variables"] = variables
                .payload
                .get("variables")
                .map(Value::to_json)
                .unwrap_or_else(|| json!([]));
        }
        json_result(&report)
    }

    #[tool(description = "Evaluate a C expression in the current frame")]
    async fn gdb_print(&self, Parameters(args): Parameters<PrintArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let outcome = session
            .execute(&commands::evaluate(&args.expression))
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({
            "expression": args.expression,
            "value": outcome.payload.get_str("value"),
        }))
    }

    #[tool(description = "Examine memory with gdb's x command (format letter and unit count)")]
    async fn gdb_examine(&self, Parameters(args): Parameters<ExamineArgs>) -> Result<CallToolResult, McpError> {
        if args.format.is_empty() || !args.format.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(McpError::invalid_params(
                format!("Invalid examine format: {:?}", args.format),
                None,
            ));
        }

        let session = self.session(&args.session_id).await?;
        let outcome = session
            .execute(&commands::examine(&args.expression, &args.format, args.count))
            .await
            .map_err(to_mcp_error)?;
        json_result(&json!({
            "expression": args.expression,
            "format": args.format,
            "count": args.count,
            "memory": outcome.output,
        }))
    }

    #[tool(description = "Show register values (hex). Pass register names to limit the output.")]
    async fn gdb_info_registers(&self, Parameters(args): Parameters<InfoRegistersArgs>) -> Result<CallToolResult, McpError> {
        let session = self.session(&args.session_id).await?;
        let names = session
            .execute(&commands::register_names())
            .await
            .map_err(to_mcp_error)?;
        let names = string_list(names.payload.get("register-names"));

        let numbers = match &args.registers {
            Some(wanted) => wanted
                .iter()
                .map(|name| {
                    names
                        .iter()
                        .position(|candidate| candidate == name)
                        .map(|index| index as u32)
                        .ok_or_else(|| {
                            McpError::invalid_params(format!("Unknown register: {}", name), None)
                        })
                })
                .collect::<Result<Vec<u32>, McpError>>()?,
            None => Vec::new(),
        };

        let values = session
            .execute(&commands::register_values(&numbers))
            .await
            .map_err(to_mcp_error)?;

        let registers: Vec<serde_json::Value> = match values.payload.get("register-values").and_then(Value::as_list) {
            Some(List::Values(items)) => items
                .iter()
                .filter_map(|item| {
                    let number = item.get_str("number")?;
                    let name = number
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| names.get(index))
                        .cloned()
                        .unwrap_or_default();
                    Some(json!({
                        "name": name,
                        "number": number,
                        "value": item.get_str("value"),
                    }))
                })
                .collect(),
            _ => Vec::new(),
        };

        json_result(&json!({
            "count": registers.len(),
            "registers": registers,
        }))
    }
}

#[tool_handler]
impl ServerHandler for GdbDebugToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "gdb Debug MCP Server - Debug native programs through gdb's machine interface. \
                 Start with gdb_start (returns session_id), set breakpoints with gdb_set_breakpoint, \
                 then gdb_run / gdb_continue / gdb_step / gdb_next, which wait for the program to stop. \
                 Inspect with gdb_backtrace, gdb_print, gdb_examine, gdb_info_registers. \
                 Finish with gdb_terminate.".to_string()
            ),
        }
    }
}
