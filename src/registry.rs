//! Session registry
//!
//! Owns every live [`GdbSession`]. Creation and teardown go through the
//! registry; lookups hand out shared handles so tools on different sessions
//! never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{Config, Timeouts};
use crate::error::{Result, SessionError};
use crate::mi::AsyncRecord;
use crate::session::{CommandOutcome, GdbSession, ReadyState, RunState, SpawnConfig};

/// Summary of one session for listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub target: Option<String>,
    pub working_dir: String,
    pub ready_state: ReadyState,
    pub run_state: RunState,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<GdbSession>>>,
    timeouts: Timeouts,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(timeouts: Timeouts, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeouts,
            max_sessions,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.timeouts, config.max_sessions)
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Spawn gdb and wait for its first prompt. Returns the new session id.
    pub async fn create(&self, config: SpawnConfig) -> Result<String> {
        self.prune_exited().await;

        let session = {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= self.max_sessions {
                return Err(SessionError::SessionLimitExceeded(self.max_sessions));
            }

            let mut id = uuid::Uuid::new_v4().to_string();
            while sessions.contains_key(&id) {
                id = uuid::Uuid::new_v4().to_string();
            }

            let session = Arc::new(GdbSession::spawn(id.clone(), &config, self.timeouts)?);
            sessions.insert(id, Arc::clone(&session));
            session
        };

        if let Err(e) = session.wait_ready(self.timeouts.start).await {
            warn!("Session {} failed to start: {}", session.id(), e);
            self.sessions.write().await.remove(session.id());
            session.terminate().await;
            return Err(e);
        }

        info!("Session {} created", session.id());
        Ok(session.id().to_string())
    }

    /// Drop sessions whose gdb is gone so they stop counting against the limit
    async fn prune_exited(&self) -> usize {
        let exited: Vec<Arc<GdbSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, session)| session.ready_state() == ReadyState::Terminated)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &exited {
            info!("Removing exited session {}", session.id());
            session.terminate().await;
        }
        exited.len()
    }

    pub async fn lookup(&self, id: &str) -> Result<Arc<GdbSession>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub async fn execute(&self, id: &str, command: &str) -> Result<CommandOutcome> {
        self.lookup(id).await?.execute(command).await
    }

    pub async fn await_stop(&self, id: &str, timeout: Duration) -> Result<AsyncRecord> {
        self.lookup(id).await?.await_stop(timeout).await
    }

    /// Terminate a session and forget it
    pub async fn terminate(&self, id: &str) -> Result<()> {
        let session = self.lookup(id).await?;
        session.terminate().await;
        self.sessions.write().await.remove(id);
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<GdbSession>> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(SessionInfo {
                id: session.id().to_string(),
                target: session.target().map(|p| p.display().to_string()),
                working_dir: session.working_dir().display().to_string(),
                ready_state: session.ready_state(),
                run_state: session.run_state().await,
            });
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Terminate every session. Used on server exit.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<GdbSession>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        if !sessions.is_empty() {
            info!("Terminating {} gdb session(s)", sessions.len());
        }
        for session in sessions {
            session.terminate().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
