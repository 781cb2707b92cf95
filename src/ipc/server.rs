//! Unix socket server for the daemon.
//!
//! One task per client reads JSON lines, routes them to a [`RequestHandler`],
//! and forwards broadcast events once the client has sent `subscribe`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, broadcast, watch};

use crate::error::{LeadflowError, Result};
use crate::ipc::messages::{DaemonError, DaemonEvent, DaemonRequest, DaemonResponse, Methods};

/// Configuration for the IPC server
#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    pub socket_path: PathBuf,
    /// Connections beyond this are answered with an error and closed
    pub max_clients: usize,
    pub event_channel_capacity: usize,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/leadflow.sock"),
            max_clients: 10,
            event_channel_capacity: 256,
        }
    }
}

impl IpcServerConfig {
    pub fn with_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }
}

/// Handler trait for processing requests
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: DaemonRequest) -> impl std::future::Future<Output = DaemonResponse> + Send;
}

#[derive(Debug)]
struct ClientState {
    subscribed: bool,
}

type Clients = Arc<RwLock<HashMap<u64, ClientState>>>;

/// IPC server owned by the daemon
pub struct IpcServer {
    config: IpcServerConfig,
    clients: Clients,
    event_tx: broadcast::Sender<DaemonEvent>,
    next_client_id: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
}

impl IpcServer {
    pub fn with_config(config: IpcServerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            next_client_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Sender handlers use to publish events
    pub fn event_sender(&self) -> broadcast::Sender<DaemonEvent> {
        self.event_tx.clone()
    }

    /// Broadcast an event; returns how many client tasks received it
    pub fn broadcast(&self, event: DaemonEvent) -> usize {
        self.event_tx.send(event).unwrap_or(0)
    }

    /// Bind the socket and serve until [`IpcServer::shutdown`]
    pub async fn run<H: RequestHandler + 'static>(&self, handler: Arc<H>) -> Result<()> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }
        if let Some(parent) = self.config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)
            .map_err(|e| LeadflowError::Ipc(format!("Failed to bind socket: {}", e)))?;
        log::info!("IPC server listening on {}", self.config.socket_path.display());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => self.accept(stream, Arc::clone(&handler)).await,
                        Err(e) => log::error!("Accept error: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.config.socket_path);
        log::info!("IPC server stopped");
        Ok(())
    }

    async fn accept<H: RequestHandler + 'static>(&self, stream: UnixStream, handler: Arc<H>) {
        if self.clients.read().await.len() >= self.config.max_clients {
            log::warn!("Rejecting client, {} already connected", self.config.max_clients);
            let (_, mut writer) = stream.into_split();
            let response = DaemonResponse::error(0, DaemonError::internal_error("Too many clients"));
            let _ = write_line(&mut writer, &response).await;
            return;
        }

        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.clients
            .write()
            .await
            .insert(client_id, ClientState { subscribed: false });
        log::debug!("Client {} connected", client_id);

        let clients = Arc::clone(&self.clients);
        let event_rx = self.event_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, client_id, handler, Arc::clone(&clients), event_rx).await {
                log::debug!("Client {} ended with error: {}", client_id, e);
            }
            clients.write().await.remove(&client_id);
            log::debug!("Client {} disconnected", client_id);
        });
    }

    /// Signal the server to stop accepting and return from `run`
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn write_line<T: serde::Serialize>(writer: &mut OwnedWriteHalf, message: &T) -> Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}

/// Handle a single client connection
async fn handle_client<H: RequestHandler>(
    stream: UnixStream,
    client_id: u64,
    handler: Arc<H>,
    clients: Clients,
    mut event_rx: broadcast::Receiver<DaemonEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        tokio::select! {
            read_result = reader.read_line(&mut line) => {
                if read_result? == 0 {
                    break;
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    line.clear();
                    continue;
                }

                let response = match parse_request(trimmed) {
                    Ok(request) if request.method == Methods::SUBSCRIBE => {
                        if let Some(state) = clients.write().await.get_mut(&client_id) {
                            state.subscribed = true;
                        }
                        DaemonResponse::success(request.id, serde_json::json!({ "subscribed": true }))
                    }
                    Ok(request) => handler.handle(request).await,
                    Err(response) => response,
                };
                line.clear();
                write_line(&mut writer, &response).await?;
            }
            event_result = event_rx.recv() => {
                match event_result {
                    Ok(event) => {
                        let subscribed = clients.read().await.get(&client_id).is_some_and(|s| s.subscribed);
                        if subscribed {
                            write_line(&mut writer, &event).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Client {} lagged, dropped {} events", client_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

/// Decode one request line; the error is the response to send back
fn parse_request(line: &str) -> std::result::Result<DaemonRequest, DaemonResponse> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| DaemonResponse::error(0, DaemonError::parse_error(format!("Parse error: {}", e))))?;
    let id = value["id"].as_u64().unwrap_or(0);
    serde_json::from_value(value)
        .map_err(|e| DaemonResponse::error(id, DaemonError::invalid_request(format!("Invalid request: {}", e))))
}
