//! Integration tests for gdb-debug
//!
//! Drives the session registry against `tests/fixtures/fake_gdb.sh`, a
//! scripted MI peer. The same scenario runs against a real gdb with
//! `--features full-integration`.

use std::sync::Arc;
use std::time::Duration;

use gdb_debug::mi::ResultClass;
use gdb_debug::{
    Config, GdbDebugToolHandler, ReadyState, RunState, SessionError, SessionRegistry, SpawnConfig,
    Timeouts,
};

fn test_timeouts() -> Timeouts {
    Timeouts {
        start: Duration::from_secs(5),
        command: Duration::from_secs(5),
        stop: Duration::from_secs(2),
        exit_grace: Duration::from_millis(200),
    }
}

// --- Handler creation ---

#[test]
fn test_handler_creation() {
    let config = Config::default();
    let registry = Arc::new(SessionRegistry::from_config(&config));
    let _handler = GdbDebugToolHandler::new(config, registry);
}

#[test]
fn test_handler_clone_shares_registry() {
    let config = Config::default();
    let registry = Arc::new(SessionRegistry::from_config(&config));
    let h1 = GdbDebugToolHandler::new(config, Arc::clone(&registry));
    let h2 = h1.clone();
    assert!(Arc::ptr_eq(h1.registry(), h2.registry()));
    assert!(Arc::ptr_eq(h1.registry(), &registry));
}

// --- Errors ---

#[test]
fn test_error_display() {
    assert_eq!(
        SessionError::SessionLimitExceeded(8).to_string(),
        "Session limit exceeded (max: 8)"
    );
    assert_eq!(
        SessionError::NotReady(ReadyState::Starting).to_string(),
        "Session not ready (state: starting)"
    );
    assert_eq!(SessionError::NotFound("abc".to_string()).to_string(), "Session not found: abc");
    assert_eq!(
        SessionError::DebuggerReported {
            message: "No symbol \"foo\" in current context.".to_string(),
            code: None,
        }
        .to_string(),
        "gdb error: No symbol \"foo\" in current context."
    );
}

#[test]
fn test_error_kinds() {
    assert_eq!(SessionError::ProcessExited.kind(), "process_exited");
    assert_eq!(SessionError::StopTimeout(Duration::from_secs(1)).kind(), "stop_timeout");
    assert!(SessionError::StopTimeout(Duration::from_secs(1)).is_timeout());
    assert!(SessionError::CommandTimeout {
        command: "exec-run".to_string(),
        timeout: Duration::from_secs(1),
    }
    .is_timeout());
    assert!(!SessionError::ProcessExited.is_timeout());
    assert!(!SessionError::InvalidCommand("x".to_string()).is_timeout());
}

// --- Sessions against the scripted MI peer ---

#[cfg(unix)]
mod fake_gdb {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    const FAKE_GDB: &str = include_str!("fixtures/fake_gdb.sh");

    /// Install the scripted gdb once per test binary
    fn fake_gdb() -> PathBuf {
        static DIR: OnceLock<TempDir> = OnceLock::new();
        let dir = DIR.get_or_init(|| {
            let dir = TempDir::new().expect("create temp dir");
            let path = dir.path().join("gdb");
            std::fs::write(&path, FAKE_GDB).expect("write fake gdb");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod fake gdb");
            dir
        });
        dir.path().join("gdb")
    }

    fn spawn_config() -> SpawnConfig {
        SpawnConfig::new(fake_gdb(), std::env::temp_dir())
    }

    fn registry(max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new(test_timeouts(), max_sessions)
    }

    #[tokio::test]
    async fn test_create_and_query() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();

        let session = registry.lookup(&id).await.unwrap();
        assert_eq!(session.ready_state(), ReadyState::Ready);
        assert_eq!(session.run_state().await, RunState::Stopped);

        let outcome = registry.execute(&id, "list-features").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Done);
        assert_eq!(
            outcome.payload.get("features").map(|f| f.to_string()),
            Some(r#"["frozen-varobjs","pending-breakpoints","python"]"#.to_string())
        );

        registry.terminate(&id).await.unwrap();
        assert!(registry.is_empty().await);
        assert!(matches!(registry.lookup(&id).await, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_break_at_main_and_run() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();

        let outcome = session.execute("-break-insert main").await.unwrap();
        let bkpt = outcome.payload.get("bkpt").unwrap();
        assert_eq!(bkpt.get_str("number"), Some("1"));
        assert_eq!(bkpt.get_str("func"), Some("main"));

        let waiter = session.stop_waiter().await.unwrap();
        let outcome = session.execute("-exec-run").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Running);

        let stopped = waiter.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stopped.reason(), Some("breakpoint-hit"));
        assert_eq!(
            stopped.payload.get("frame").and_then(|f| f.get_str("func")),
            Some("main")
        );
        assert_eq!(session.run_state().await, RunState::Stopped);

        registry.shutdown().await;
        assert_eq!(session.ready_state(), ReadyState::Terminated);
    }

    #[tokio::test]
    async fn test_out_of_order_results() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();

        let held = session.submit("hold").await.unwrap();
        let released = session.execute("release").await.unwrap();
        assert_eq!(released.payload.get_str("released"), Some("yes"));

        let held = held.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(held.payload.get_str("held"), Some("yes"));
        assert_eq!(session.pending_count().await, 0);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_debugger_error_and_garbled_result() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();

        match registry.execute(&id, "bogus").await {
            Err(SessionError::DebuggerReported { message, code }) => {
                assert_eq!(message, "Undefined MI command: bogus");
                assert_eq!(code.as_deref(), Some("undefined-command"));
            }
            other => panic!("expected DebuggerReported, got {:?}", other),
        }

        let err = registry.execute(&id, "garbled").await.unwrap_err();
        assert_eq!(err.kind(), "protocol_error");

        // One bad line does not end the session
        let outcome = registry.execute(&id, "list-features").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Done);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_terminate_with_command_in_flight() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();

        let in_flight = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.execute("silent").await })
        };
        while session.pending_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        registry.terminate(&id).await.unwrap();
        let outcome = in_flight.await.unwrap();
        assert!(matches!(outcome, Err(SessionError::ProcessExited)));
        assert_eq!(session.ready_state(), ReadyState::Terminated);
        assert_eq!(session.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_process_crash_fails_command() {
        let registry = registry(1);
        let id = registry.create(spawn_config()).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();
        let waiter = session.stop_waiter().await.unwrap();

        let outcome = session.execute("crash").await;
        assert!(matches!(outcome, Err(SessionError::ProcessExited)));
        assert_eq!(session.ready_state(), ReadyState::Terminated);
        assert!(matches!(
            waiter.wait(Duration::from_millis(50)).await,
            Err(SessionError::ProcessExited)
        ));

        // The dead session no longer holds the only slot
        let replacement = registry.create(spawn_config()).await.unwrap();
        assert_ne!(replacement, id);
        assert_eq!(registry.len().await, 1);
        assert!(matches!(registry.lookup(&id).await, Err(SessionError::NotFound(_))));

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_stop_timeout_keeps_run_state() {
        let registry = registry(4);
        let id = registry.create(spawn_config()).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();

        let outcome = session.execute("exec-finish").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Running);
        // Round trip so the *running record has been dispatched
        session.execute("list-features").await.unwrap();
        assert_eq!(session.run_state().await, RunState::Running);

        let err = registry.await_stop(&id, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, SessionError::StopTimeout(_)));
        assert_eq!(session.run_state().await, RunState::Running);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_session_limit() {
        let registry = registry(1);
        let _first = registry.create(spawn_config()).await.unwrap();

        match registry.create(spawn_config()).await {
            Err(SessionError::SessionLimitExceeded(1)) => {}
            other => panic!("expected SessionLimitExceeded, got {:?}", other),
        }
        assert_eq!(registry.len().await, 1);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let registry = registry(4);
        let plain = registry.create(spawn_config()).await.unwrap();
        let with_program = registry
            .create(spawn_config().with_program("/tmp/loop"))
            .await
            .unwrap();

        let sessions = registry.list().await;
        assert_eq!(sessions.len(), 2);

        let info = sessions.iter().find(|s| s.id == with_program).unwrap();
        assert_eq!(info.target.as_deref(), Some("/tmp/loop"));
        assert_eq!(info.ready_state, ReadyState::Ready);
        assert_eq!(info.run_state, RunState::Stopped);

        let info = sessions.iter().find(|s| s.id == plain).unwrap();
        assert!(info.target.is_none());

        registry.shutdown().await;
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_ids_are_unique_uuids() {
        let registry = registry(4);
        let a = registry.create(spawn_config()).await.unwrap();
        let b = registry.create(spawn_config()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);

        registry.shutdown().await;
    }
}

// --- Real gdb ---

#[cfg(all(unix, feature = "full-integration"))]
mod real_gdb {
    use super::*;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn build_loop(dir: &Path) -> std::path::PathBuf {
        let source = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/loop.c");
        let binary = dir.join("loop");
        let status = Command::new("cc")
            .args(["-g", "-O0", "-o"])
            .arg(&binary)
            .arg(&source)
            .status()
            .expect("run cc");
        assert!(status.success(), "failed to compile loop.c");
        binary
    }

    #[tokio::test]
    async fn test_breakpoint_hit_in_real_gdb() {
        let dir = TempDir::new().unwrap();
        let program = build_loop(dir.path());
        let gdb = Config::default().find_gdb().expect("gdb on PATH");

        let registry = SessionRegistry::new(test_timeouts(), 2);
        let config = SpawnConfig::new(gdb, dir.path())
            .with_extra_args(vec!["-nx".to_string()])
            .with_program(&program);
        let id = registry.create(config).await.unwrap();
        let session = registry.lookup(&id).await.unwrap();

        let outcome = session.execute("gdb-set confirm off").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Done);
        assert!(outcome.payload.is_empty());

        let outcome = session.execute("break-insert main").await.unwrap();
        assert_eq!(
            outcome.payload.get("bkpt").and_then(|b| b.get_str("func")),
            Some("main")
        );

        let waiter = session.stop_waiter().await.unwrap();
        let outcome = session.execute("exec-run").await.unwrap();
        assert_eq!(outcome.class, ResultClass::Running);

        let stopped = waiter.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stopped.reason(), Some("breakpoint-hit"));
        assert_eq!(session.run_state().await, RunState::Stopped);

        registry.shutdown().await;
        assert_eq!(session.ready_state(), ReadyState::Terminated);
    }
}
