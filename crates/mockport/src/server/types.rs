use crate::engine::EngineError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a mock listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Stopped,
}

/// Public view of one registered mock server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub mock_id: String,
    /// `http(s)://127.0.0.1:<port>` while running, empty once stopped
    pub url: String,
    pub status: ServerStatus,
}

impl ServerState {
    pub fn is_running(&self) -> bool {
        self.status == ServerStatus::Running
    }
}

/// Errors that can occur while managing mock servers
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("mock {0} not found")]
    NotFound(String),

    #[error("mock server {0} is already running")]
    AlreadyRunning(String),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
