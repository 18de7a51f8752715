//! ServerManager - lifecycle management for mock servers.
//!
//! Each registered mock owns one listener and one accept task. Connections are
//! served on their own tasks with hyper's HTTP/1.1 server and finish gracefully
//! when the mock is stopped.

use super::tls::build_tls_acceptor;
use super::types::{ServerError, ServerState, ServerStatus};
use crate::engine::MockEngine;
use crate::mock::MockDefinition;
use crate::store::Store;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

const BIND_HOST: &str = "0.0.0.0";

/// One-shot stop signal plus the accept task it ends
struct ShutdownHandle {
    trigger: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct RegisteredServer {
    state: ServerState,
    engine: Arc<MockEngine>,
    /// Taken on the first stop
    shutdown: Option<ShutdownHandle>,
}

/// Registry of mock servers keyed by mock id
pub struct ServerManager {
    store: Arc<dyn Store>,
    servers: Mutex<HashMap<String, RegisteredServer>>,
}

impl ServerManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            servers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Store a definition and start serving it
    pub async fn new_mock_server(&self, mock: MockDefinition) -> Result<ServerState, ServerError> {
        let mock = mock.with_generated_ids();
        let mock_id = mock.id.clone();
        self.ensure_not_running(&mock_id)?;

        self.store.set_mock(mock).await?;
        let mock = self
            .store
            .get_mock(&mock_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(mock_id.clone()))?;
        self.start(&mock).await
    }

    /// Start serving a definition already held in the store
    pub async fn new_mock_server_by_id(&self, mock_id: &str) -> Result<ServerState, ServerError> {
        let mock = self
            .store
            .get_mock(mock_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(mock_id.to_string()))?;
        self.ensure_not_running(mock_id)?;
        self.start(&mock).await
    }

    fn ensure_not_running(&self, mock_id: &str) -> Result<(), ServerError> {
        match self.servers.lock().get(mock_id) {
            Some(server) if server.state.is_running() => {
                Err(ServerError::AlreadyRunning(mock_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn start(&self, mock: &MockDefinition) -> Result<ServerState, ServerError> {
        let acceptor = match mock.tls.as_ref().filter(|t| t.enabled) {
            Some(tls) => Some(build_tls_acceptor(tls)?),
            None => None,
        };
        let engine = Arc::new(MockEngine::new(mock.id.clone(), Arc::clone(&self.store))?);

        let port = mock.port.unwrap_or(0);
        let listener = TcpListener::bind((BIND_HOST, port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let bound_port = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?
            .port();

        let scheme = if acceptor.is_some() { "https" } else { "http" };
        let state = ServerState {
            mock_id: mock.id.clone(),
            url: format!("{scheme}://127.0.0.1:{bound_port}"),
            status: ServerStatus::Running,
        };

        let (trigger, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            acceptor,
            Arc::clone(&engine),
            shutdown_rx,
        ));

        let mut servers = self.servers.lock();
        if servers.get(&mock.id).is_some_and(|s| s.state.is_running()) {
            // Lost a race with a concurrent start of the same mock
            let _ = trigger.send(());
            return Err(ServerError::AlreadyRunning(mock.id.clone()));
        }
        servers.insert(
            mock.id.clone(),
            RegisteredServer {
                state: state.clone(),
                engine,
                shutdown: Some(ShutdownHandle { trigger, task }),
            },
        );

        info!("Mock server {} listening on {}", mock.id, state.url);
        Ok(state)
    }

    /// Stop a mock server and wait until its listener is released
    pub async fn stop_mock_server(&self, mock_id: &str) -> Result<ServerState, ServerError> {
        let (state, handle) = {
            let mut servers = self.servers.lock();
            let server = servers
                .get_mut(mock_id)
                .ok_or_else(|| ServerError::NotFound(mock_id.to_string()))?;
            server.state.status = ServerStatus::Stopped;
            server.state.url.clear();
            (server.state.clone(), server.shutdown.take())
        };

        if let Some(handle) = handle {
            let _ = handle.trigger.send(());
            if let Err(e) = handle.task.await {
                warn!("Accept loop of mock {} ended abnormally: {}", mock_id, e);
            }
            info!("Mock server {} stopped", mock_id);
        }
        Ok(state)
    }

    /// Stop every registered server
    pub async fn stop_all_servers(&self) -> Vec<ServerState> {
        let ids: Vec<String> = self.servers.lock().keys().cloned().collect();

        let mut states = Vec::with_capacity(ids.len());
        for id in ids {
            match self.stop_mock_server(&id).await {
                Ok(state) => states.push(state),
                Err(e) => warn!("Failed to stop mock {}: {}", id, e),
            }
        }
        states
    }

    /// Snapshot of all registered servers by mock id
    pub fn get_mock_server_states(&self) -> HashMap<String, ServerState> {
        self.servers
            .lock()
            .iter()
            .map(|(id, s)| (id.clone(), s.state.clone()))
            .collect()
    }

    /// URLs of running servers, sorted
    pub fn get_mock_server_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .servers
            .lock()
            .values()
            .filter(|s| s.state.is_running())
            .map(|s| s.state.url.clone())
            .collect();
        urls.sort();
        urls
    }

    fn engine(&self, mock_id: &str) -> Result<Arc<MockEngine>, ServerError> {
        self.servers
            .lock()
            .get(mock_id)
            .map(|s| Arc::clone(&s.engine))
            .ok_or_else(|| ServerError::NotFound(mock_id.to_string()))
    }

    pub fn pause_mock_server(&self, mock_id: &str) -> Result<(), ServerError> {
        self.engine(mock_id)?.pause();
        info!("Mock server {} paused", mock_id);
        Ok(())
    }

    pub fn resume_mock_server(&self, mock_id: &str) -> Result<(), ServerError> {
        self.engine(mock_id)?.resume();
        info!("Mock server {} resumed", mock_id);
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    engine: Arc<MockEngine>,
    mut shutdown: oneshot::Receiver<()>,
) {
    // Dropping the sender tells open connections to finish gracefully
    let (closing_tx, closing_rx) = watch::channel(());

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let engine = Arc::clone(&engine);
                        let acceptor = acceptor.clone();
                        let closing = closing_rx.clone();
                        tokio::spawn(async move {
                            match acceptor {
                                Some(acceptor) => match acceptor.accept(stream).await {
                                    Ok(tls) => serve_connection(tls, engine, closing, addr).await,
                                    Err(e) => debug!("TLS handshake with {} failed: {}", addr, e),
                                },
                                None => serve_connection(stream, engine, closing, addr).await,
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error for mock {}: {}", engine.mock_id(), e);
                    }
                }
            }
            _ = &mut shutdown => {
                debug!("Mock {} accept loop shutting down", engine.mock_id());
                break;
            }
        }
    }

    drop(listener);
    drop(closing_tx);
}

async fn serve_connection<S>(
    stream: S,
    engine: Arc<MockEngine>,
    mut closing: watch::Receiver<()>,
    addr: SocketAddr,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let engine = Arc::clone(&engine);
        async move { engine.handle(req).await }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing_seen = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!("Connection error from {}: {}", addr, e);
                }
                break;
            }
            _ = closing.changed(), if !closing_seen => {
                closing_seen = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn hello_mock(id: &str) -> MockDefinition {
        let mut mock = MockDefinition::from_yaml(
            "routes:\n  - path: /hello\n    responses:\n      - body: world\n",
        )
        .unwrap();
        mock.id = id.to_string();
        mock
    }

    fn manager() -> ServerManager {
        ServerManager::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_start_registers_running_state() {
        let manager = manager();
        let state = manager.new_mock_server(hello_mock("m1")).await.unwrap();

        assert_eq!(state.status, ServerStatus::Running);
        assert!(state.url.starts_with("http://127.0.0.1:"));
        let port: u16 = state.url.rsplit(':').next().unwrap().parse().unwrap();
        assert_ne!(port, 0);

        let states = manager.get_mock_server_states();
        assert_eq!(states.len(), 1);
        assert_eq!(states.get("m1"), Some(&state));
        assert_eq!(manager.get_mock_server_urls(), vec![state.url.clone()]);

        manager.stop_all_servers().await;
    }

    #[tokio::test]
    async fn test_duplicate_start_is_rejected() {
        let manager = manager();
        manager.new_mock_server(hello_mock("m1")).await.unwrap();

        let err = manager.new_mock_server(hello_mock("m1")).await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning(_)));
        let err = manager.new_mock_server_by_id("m1").await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning(_)));

        manager.stop_all_servers().await;
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let manager = manager();
        assert!(matches!(
            manager.new_mock_server_by_id("nope").await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            manager.stop_mock_server("nope").await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            manager.pause_mock_server("nope"),
            Err(ServerError::NotFound(_))
        ));
        assert!(manager.get_mock_server_states().is_empty());
    }

    #[tokio::test]
    async fn test_stop_twice_and_restart() {
        let manager = manager();
        manager.new_mock_server(hello_mock("m1")).await.unwrap();

        let stopped = manager.stop_mock_server("m1").await.unwrap();
        assert_eq!(stopped.status, ServerStatus::Stopped);
        assert!(stopped.url.is_empty());
        assert!(manager.get_mock_server_urls().is_empty());
        assert_eq!(
            manager.get_mock_server_states()["m1"].status,
            ServerStatus::Stopped
        );

        let again = manager.stop_mock_server("m1").await.unwrap();
        assert_eq!(again.status, ServerStatus::Stopped);

        let restarted = manager.new_mock_server_by_id("m1").await.unwrap();
        assert_eq!(restarted.status, ServerStatus::Running);
        assert_eq!(manager.get_mock_server_states().len(), 1);

        manager.stop_all_servers().await;
    }

    #[tokio::test]
    async fn test_urls_list_running_servers_only() {
        let manager = manager();
        let a = manager.new_mock_server(hello_mock("a")).await.unwrap();
        let b = manager.new_mock_server(hello_mock("b")).await.unwrap();

        let mut expected = vec![a.url.clone(), b.url.clone()];
        expected.sort();
        assert_eq!(manager.get_mock_server_urls(), expected);

        manager.stop_mock_server("a").await.unwrap();
        assert_eq!(manager.get_mock_server_urls(), vec![b.url.clone()]);

        let states = manager.get_mock_server_states();
        assert_eq!(states.len(), 2);
        assert!(!states["a"].is_running());
        assert!(states["b"].is_running());

        manager.stop_all_servers().await;
    }

    #[tokio::test]
    async fn test_pause_resume_forward_to_engine() {
        let manager = manager();
        manager.new_mock_server(hello_mock("m1")).await.unwrap();

        manager.pause_mock_server("m1").unwrap();
        assert!(manager.engine("m1").unwrap().is_paused());
        manager.resume_mock_server("m1").unwrap();
        assert!(!manager.engine("m1").unwrap().is_paused());

        manager.stop_all_servers().await;
    }

    #[tokio::test]
    async fn test_generates_missing_id() {
        let manager = manager();
        let state = manager.new_mock_server(hello_mock("")).await.unwrap();
        assert!(!state.mock_id.is_empty());
        assert!(manager
            .store()
            .get_mock(&state.mock_id)
            .await
            .unwrap()
            .is_some());

        manager.stop_all_servers().await;
    }
}
