//! One gdb process speaking GDB/MI
//!
//! A session owns the child process and a background reader task. The reader
//! feeds every stdout line through [`crate::mi::try_parse`] into the protocol
//! state machine, which:
//!
//! - resolves pending commands by token,
//! - tracks run/stop state from `*running` / `*stopped`,
//! - collects stream output for the command in flight,
//! - hands `*stopped` records to registered stop waiters.
//!
//! Commands are written as `{token}-{command}\n`.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Timeouts;
use crate::error::{Result, SessionError};
use crate::mi::{self, AsyncRecord, Record, ResultClass, ResultRecord, Results, StreamKind};

/// How long `terminate` lets the reader drain before aborting it
const READER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How to launch gdb for a new session
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub gdb_path: PathBuf,
    /// Program to debug, passed as the last argument
    pub program: Option<PathBuf>,
    pub working_dir: PathBuf,
    /// Additional gdb arguments, placed before the program
    pub extra_args: Vec<String>,
}

impl SpawnConfig {
    pub fn new(gdb_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            gdb_path: gdb_path.into(),
            program: None,
            working_dir: working_dir.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// `gdb --interpreter=mi --quiet [extra args] [program]` with all stdio piped
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.gdb_path);
        cmd.arg("--interpreter=mi").arg("--quiet");
        cmd.args(&self.extra_args);
        if let Some(program) = &self.program {
            cmd.arg(program);
        }
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Lifecycle of the gdb process: `Starting -> Ready -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Starting,
    Ready,
    Terminated,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadyState::Starting => "starting",
            ReadyState::Ready => "ready",
            ReadyState::Terminated => "terminated",
        })
    }
}

/// Execution state of the inferior, driven only by exec async records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
        })
    }
}

/// Successful result of one MI command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub class: ResultClass,
    pub payload: Results,
    /// Stream output gdb printed while the command was in flight
    pub output: String,
}

/// Result of waiting for the target to stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped(AsyncRecord),
    StillRunning,
}

#[derive(Default)]
struct Protocol {
    pending: HashMap<u64, oneshot::Sender<Result<CommandOutcome>>>,
    run_state: RunState,
    output: String,
    stop_waiters: VecDeque<oneshot::Sender<Result<AsyncRecord>>>,
    last_stop: Option<AsyncRecord>,
    /// A ^running result arrived after `last_stop`
    resumed: bool,
}

impl Protocol {
    fn dispatch(&mut self, session_id: &str, line: &str, ready: &watch::Sender<ReadyState>) {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return;
        }

        match mi::try_parse(line) {
            Ok(record) => self.apply(session_id, record, ready),
            Err(e) => {
                warn!("[{}] {}", session_id, e);
                if let Some(tx) = e.token.and_then(|token| self.pending.remove(&token)) {
                    let _ = tx.send(Err(SessionError::Protocol(e)));
                }
            }
        }
    }

    fn apply(&mut self, session_id: &str, record: Record, ready: &watch::Sender<ReadyState>) {
        match record {
            Record::Result(result) => self.resolve(session_id, result, ready),
            Record::Async(record) if record.is_exec("running") => {
                self.run_state = RunState::Running;
            }
            Record::Async(record) if record.is_exec("stopped") => {
                self.run_state = RunState::Stopped;
                self.notify_stop(record);
            }
            Record::Async(record) => {
                debug!("[{}] async {}", session_id, record.class);
            }
            Record::Stream(stream) => {
                if stream.kind == StreamKind::Log {
                    debug!("[{}] gdb log: {}", session_id, stream.text.trim_end());
                }
                self.output.push_str(&stream.text);
            }
            Record::Prompt => mark_ready(ready),
            Record::Unrecognized { raw } => {
                warn!("[{}] unrecognized gdb output: {}", session_id, raw);
            }
        }
    }

    fn resolve(&mut self, session_id: &str, result: ResultRecord, ready: &watch::Sender<ReadyState>) {
        if !result.class.is_error() {
            mark_ready(ready);
        }
        if result.class == ResultClass::Running {
            self.resumed = true;
        }

        let Some(token) = result.token else {
            warn!("[{}] discarding untokened ^{} result", session_id, result.class);
            return;
        };
        let Some(tx) = self.pending.remove(&token) else {
            warn!("[{}] discarding ^{} result for unknown token {}", session_id, result.class, token);
            return;
        };

        let output = std::mem::take(&mut self.output);
        let reply = if result.class.is_error() {
            Err(SessionError::DebuggerReported {
                message: result.payload.get_str("msg").unwrap_or("unknown error").to_string(),
                code: result.payload.get_str("code").map(str::to_string),
            })
        } else {
            Ok(CommandOutcome { class: result.class, payload: result.payload, output })
        };

        if tx.send(reply).is_err() {
            debug!("[{}] drained result for abandoned command {}", session_id, token);
        }
    }

    /// Hand the stop to the oldest waiter still listening
    fn notify_stop(&mut self, record: AsyncRecord) {
        self.last_stop = Some(record.clone());
        self.resumed = false;
        let mut record = Ok(record);
        while let Some(waiter) = self.stop_waiters.pop_front() {
            match waiter.send(record) {
                Ok(()) => return,
                Err(unsent) => record = unsent,
            }
        }
    }

    fn fail_all(&mut self) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(SessionError::ProcessExited));
        }
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(Err(SessionError::ProcessExited));
        }
    }
}

fn mark_ready(ready: &watch::Sender<ReadyState>) {
    ready.send_if_modified(|state| {
        if *state == ReadyState::Starting {
            *state = ReadyState::Ready;
            true
        } else {
            false
        }
    });
}

async fn reader_loop<R>(
    session_id: String,
    stdout: R,
    protocol: Arc<Mutex<Protocol>>,
    ready: Arc<watch::Sender<ReadyState>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("[{}] gdb stdout closed", session_id);
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                protocol.lock().await.dispatch(&session_id, &line, &ready);
            }
            Err(e) => {
                warn!("[{}] error reading gdb stdout: {}", session_id, e);
                break;
            }
        }
    }

    ready.send_replace(ReadyState::Terminated);
    protocol.lock().await.fail_all();
}

async fn stderr_loop<R>(session_id: String, stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => debug!("[{}] gdb stderr: {}", session_id, String::from_utf8_lossy(&buf).trim_end()),
            Err(e) => {
                debug!("[{}] error reading gdb stderr: {}", session_id, e);
                break;
            }
        }
    }
}

fn normalize(command: &str) -> Result<&str> {
    if command.contains(['\n', '\r']) {
        return Err(SessionError::InvalidCommand(format!(
            "command must be a single line: {:?}",
            command
        )));
    }
    let command = command.trim();
    let command = command.strip_prefix('-').unwrap_or(command);
    if command.is_empty() {
        return Err(SessionError::InvalidCommand("empty command".to_string()));
    }
    Ok(command)
}

/// A live gdb process and its protocol state
pub struct GdbSession {
    id: String,
    target: Option<PathBuf>,
    working_dir: PathBuf,
    timeouts: Timeouts,
    next_token: AtomicU64,
    protocol: Arc<Mutex<Protocol>>,
    ready_tx: Arc<watch::Sender<ReadyState>>,
    stdin: Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    child: Mutex<Option<Child>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    /// Held by `execute` so only one command owns the output accumulator
    command_gate: Mutex<()>,
}

impl GdbSession {
    /// Spawn gdb and start reading its output. The session starts in
    /// [`ReadyState::Starting`]; use [`GdbSession::wait_ready`] for the first prompt.
    pub fn spawn(id: String, config: &SpawnConfig, timeouts: Timeouts) -> Result<Self> {
        info!(
            "Starting gdb: {} --interpreter=mi (session {}, cwd {})",
            config.gdb_path.display(),
            id,
            config.working_dir.display()
        );

        let mut child = config.command().spawn().map_err(|e| {
            SessionError::SpawnFailed(format!("{}: {}", config.gdb_path.display(), e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("gdb stdout not captured".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("gdb stdin not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("gdb stderr not captured".to_string()))?;

        let mut session = Self::attach(id, stdout, Box::new(stdin), timeouts);
        session.target = config.program.clone();
        session.working_dir = config.working_dir.clone();
        *session.child.get_mut() = Some(child);
        *session.stderr_task.get_mut() = Some(tokio::spawn(stderr_loop(session.id.clone(), stderr)));
        Ok(session)
    }

    fn attach<R>(
        id: String,
        stdout: R,
        stdin: Box<dyn AsyncWrite + Send + Unpin>,
        timeouts: Timeouts,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let protocol = Arc::new(Mutex::new(Protocol::default()));
        let (ready_tx, _) = watch::channel(ReadyState::Starting);
        let ready_tx = Arc::new(ready_tx);

        let reader = tokio::spawn(reader_loop(
            id.clone(),
            stdout,
            Arc::clone(&protocol),
            Arc::clone(&ready_tx),
        ));

        Self {
            id,
            target: None,
            working_dir: PathBuf::from("."),
            timeouts,
            next_token: AtomicU64::new(1),
            protocol,
            ready_tx,
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(None),
            reader_task: Mutex::new(Some(reader)),
            stderr_task: Mutex::new(None),
            command_gate: Mutex::new(()),
        }
    }

    /// Session over arbitrary pipes, with no process behind it
    #[cfg(test)]
    pub(crate) fn from_io<R, W>(id: &str, stdout: R, stdin: W, timeouts: Timeouts) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::attach(id.to_string(), stdout, Box::new(stdin), timeouts)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.ready_tx.borrow()
    }

    pub async fn run_state(&self) -> RunState {
        self.protocol.lock().await.run_state
    }

    /// Most recent `*stopped` record
    pub async fn last_stop(&self) -> Option<AsyncRecord> {
        self.protocol.lock().await.last_stop.clone()
    }

    /// The stop the target is sitting at, if no resume was acknowledged since.
    /// `run_state` alone can lag behind a `^running` whose `*running` has not
    /// been read yet.
    pub async fn current_stop(&self) -> Option<AsyncRecord> {
        let protocol = self.protocol.lock().await;
        if protocol.resumed || protocol.run_state != RunState::Stopped {
            return None;
        }
        protocol.last_stop.clone()
    }

    /// Commands written whose result has not arrived yet
    pub async fn pending_count(&self) -> usize {
        self.protocol.lock().await.pending.len()
    }

    /// Wait until gdb leaves `Starting`
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.ready_tx.subscribe();
        let state = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state != ReadyState::Starting),
        )
        .await
        .map(|changed| changed.map(|state| *state));

        match state {
            Ok(Ok(ReadyState::Ready)) => Ok(()),
            Ok(Ok(_)) | Ok(Err(_)) => Err(SessionError::ProcessExited),
            Err(_) => Err(SessionError::StartTimeout(timeout)),
        }
    }

    /// Run one MI command with the configured command timeout
    pub async fn execute(&self, command: &str) -> Result<CommandOutcome> {
        self.execute_with_timeout(command, self.timeouts.command).await
    }

    pub async fn execute_with_timeout(&self, command: &str, timeout: Duration) -> Result<CommandOutcome> {
        let state = self.ready_state();
        if state != ReadyState::Ready {
            return Err(SessionError::NotReady(state));
        }

        let _gate = self.command_gate.lock().await;
        self.protocol.lock().await.output.clear();
        let pending = self.submit_within(command, timeout).await?;
        pending.wait(timeout).await
    }

    /// Write a command without waiting for its result.
    ///
    /// Several submissions may be in flight at once and resolve in any order.
    /// The `output` of their outcomes is whatever arrived since the previous
    /// resolution; use [`GdbSession::execute`] when output attribution matters.
    pub async fn submit(&self, command: &str) -> Result<PendingCommand> {
        self.submit_within(command, self.timeouts.command).await
    }

    /// Like [`GdbSession::submit`], giving up on the write after `timeout`
    async fn submit_within(&self, command: &str, timeout: Duration) -> Result<PendingCommand> {
        let command = normalize(command)?;
        let state = self.ready_state();
        if state != ReadyState::Ready {
            return Err(SessionError::NotReady(state));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut protocol = self.protocol.lock().await;
            if self.ready_state() == ReadyState::Terminated {
                return Err(SessionError::ProcessExited);
            }
            protocol.pending.insert(token, tx);
        }

        debug!("[{}] -> {}-{}", self.id, token, command);
        let line = format!("{}-{}\n", token, command);
        let written = tokio::time::timeout(timeout, self.write_line(&line)).await;
        let failure = match written {
            Ok(Ok(())) => None,
            Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => Some(SessionError::ProcessExited),
            Ok(Err(e)) => Some(SessionError::IoError(e)),
            Err(_) => {
                warn!("[{}] gdb is not reading its input, gave up writing {}", self.id, token);
                Some(SessionError::CommandTimeout { command: command.to_string(), timeout })
            }
        };
        if let Some(e) = failure {
            self.protocol.lock().await.pending.remove(&token);
            return Err(e);
        }

        Ok(PendingCommand { token, command: command.to_string(), rx })
    }

    async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        let writer = stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "gdb stdin closed"))?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    /// Register for the next `*stopped` record.
    ///
    /// Register before sending a resume command so a fast stop is not missed.
    pub async fn stop_waiter(&self) -> Result<StopWaiter> {
        let (tx, rx) = oneshot::channel();
        let mut protocol = self.protocol.lock().await;
        if self.ready_state() == ReadyState::Terminated {
            return Err(SessionError::ProcessExited);
        }
        protocol.stop_waiters.retain(|waiter| !waiter.is_closed());
        protocol.stop_waiters.push_back(tx);
        Ok(StopWaiter { rx })
    }

    /// Wait for the first `*stopped` record after this call
    pub async fn await_stop(&self, timeout: Duration) -> Result<AsyncRecord> {
        self.stop_waiter().await?.wait(timeout).await
    }

    /// Shut gdb down: `-gdb-exit`, then kill. Safe to call more than once.
    pub async fn terminate(&self) {
        let grace = self.timeouts.exit_grace;
        let mut exit_sent = false;
        if self.ready_state() == ReadyState::Ready {
            match self.submit_within("gdb-exit", grace).await {
                Ok(pending) => {
                    exit_sent = true;
                    if let Err(e) = pending.wait(grace).await {
                        debug!("[{}] gdb-exit: {}", self.id, e);
                    }
                }
                Err(e) => debug!("[{}] could not send gdb-exit: {}", self.id, e),
            }
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            if exit_sent && matches!(child.try_wait(), Ok(None)) {
                let _ = tokio::time::timeout(grace, child.wait()).await;
            }
            if matches!(child.try_wait(), Ok(None)) {
                warn!("[{}] gdb did not exit, killing", self.id);
                if let Err(e) = child.kill().await {
                    warn!("[{}] kill failed: {}", self.id, e);
                }
            }
        }

        self.stdin.lock().await.take();

        let reader = self.reader_task.lock().await.take();
        if let Some(mut handle) = reader {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        let stderr = self.stderr_task.lock().await.take();
        if let Some(handle) = stderr {
            handle.abort();
        }

        self.ready_tx.send_replace(ReadyState::Terminated);
        self.protocol.lock().await.fail_all();
        info!("Session {} terminated", self.id);
    }
}

/// A submitted command awaiting its result record
#[derive(Debug)]
pub struct PendingCommand {
    token: u64,
    command: String,
    rx: oneshot::Receiver<Result<CommandOutcome>>,
}

impl PendingCommand {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Timing out leaves the token registered; its late result is drained.
    pub async fn wait(self, timeout: Duration) -> Result<CommandOutcome> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SessionError::ProcessExited),
            Err(_) => Err(SessionError::CommandTimeout { command: self.command, timeout }),
        }
    }
}

/// A one-shot registration for the next `*stopped` record
#[derive(Debug)]
pub struct StopWaiter {
    rx: oneshot::Receiver<Result<AsyncRecord>>,
}

impl StopWaiter {
    /// A target that is still running after `timeout` is a normal outcome
    pub async fn poll(self, timeout: Duration) -> Result<StopOutcome> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(reply)) => reply.map(StopOutcome::Stopped),
            Ok(Err(_)) => Err(SessionError::ProcessExited),
            Err(_) => Ok(StopOutcome::StillRunning),
        }
    }

    pub async fn wait(self, timeout: Duration) -> Result<AsyncRecord> {
        match self.poll(timeout).await? {
            StopOutcome::Stopped(record) => Ok(record),
            StopOutcome::StillRunning => Err(SessionError::StopTimeout(timeout)),
        }
    }
}
