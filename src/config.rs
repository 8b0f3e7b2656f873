//! Configuration for the gdb-debug MCP server

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "gdb-debug")]
#[command(about = "MCP server for native debugging via the GDB machine interface")]
#[command(version)]
pub struct Args {
    /// Path to gdb binary (defaults to searching PATH)
    #[arg(long)]
    pub gdb_path: Option<PathBuf>,

    /// Working directory for new sessions (defaults to the current directory)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Maximum number of concurrent gdb sessions
    #[arg(long, default_value_t = 8)]
    pub max_sessions: usize,

    /// Seconds to wait for a new gdb to print its first prompt
    #[arg(long, default_value_t = 10)]
    pub start_timeout_secs: u64,

    /// Seconds to wait for the result of a single MI command
    #[arg(long, default_value_t = 10)]
    pub command_timeout_secs: u64,

    /// Seconds to wait for the target to stop after run/continue/step
    #[arg(long, default_value_t = 5)]
    pub stop_timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Bounds on every suspending session operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub start: Duration,
    pub command: Duration,
    pub stop: Duration,
    /// Grace period for `-gdb-exit` before the process is killed
    pub exit_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(10),
            command: Duration::from_secs(10),
            stop: Duration::from_secs(5),
            exit_grace: Duration::from_millis(500),
        }
    }
}

/// Runtime configuration derived from CLI args
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to gdb binary
    pub gdb_path: Option<PathBuf>,
    /// Default working directory for new sessions
    pub working_dir: Option<PathBuf>,
    pub max_sessions: usize,
    pub timeouts: Timeouts,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        Self {
            gdb_path: args.gdb_path.clone(),
            working_dir: args.working_dir.clone(),
            max_sessions: args.max_sessions,
            timeouts: Timeouts {
                start: Duration::from_secs(args.start_timeout_secs),
                command: Duration::from_secs(args.command_timeout_secs),
                stop: Duration::from_secs(args.stop_timeout_secs),
                ..Timeouts::default()
            },
        }
    }

    /// Find gdb binary path: config, then PATH
    pub fn find_gdb(&self) -> Result<PathBuf, String> {
        if let Some(path) = &self.gdb_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(format!("Configured gdb path does not exist: {}", path.display()));
        }

        which("gdb").map_err(|_| {
            "gdb not found. Install it via your package manager (e.g. apt install gdb)".to_string()
        })
    }

    /// Working directory for a new session: explicit override, then config,
    /// then the server's own working directory
    pub fn resolve_working_dir(&self, requested: Option<&Path>) -> PathBuf {
        requested
            .map(Path::to_path_buf)
            .or_else(|| self.working_dir.clone())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gdb_path: None,
            working_dir: None,
            max_sessions: 8,
            timeouts: Timeouts::default(),
        }
    }
}

/// Find an executable on PATH (simple which implementation)
fn which(name: &str) -> Result<PathBuf, ()> {
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(())
}
