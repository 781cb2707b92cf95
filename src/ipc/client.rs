//! IPC client for talking to a running daemon.
//!
//! A reader task demultiplexes the socket: responses go to the waiting
//! request by id, push events go to an mpsc queue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::error::{LeadflowError, Result};
use crate::ipc::messages::{DaemonEvent, DaemonRequest, DaemonResponse, Methods};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<DaemonResponse>>>>;

/// Client side of the daemon socket
pub struct IpcClient {
    socket_path: PathBuf,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Pending,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    event_sender: mpsc::Sender<DaemonEvent>,
    event_receiver: Mutex<mpsc::Receiver<DaemonEvent>>,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        let (event_sender, event_receiver) = mpsc::channel(100);
        Self {
            socket_path: socket_path.into(),
            writer: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            connected: Arc::new(AtomicBool::new(false)),
            event_sender,
            event_receiver: Mutex::new(event_receiver),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn connect(&self) -> Result<()> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| LeadflowError::Ipc(format!("Failed to connect to {}: {}", self.socket_path.display(), e)))?;
        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        let pending = Arc::clone(&self.pending);
        let events = self.event_sender.clone();
        let connected = Arc::clone(&self.connected);

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Ok(response) = serde_json::from_str::<DaemonResponse>(line) {
                    if let Some(waiter) = pending.lock().await.remove(&response.id) {
                        let _ = waiter.send(response);
                    }
                } else if let Ok(event) = serde_json::from_str::<DaemonEvent>(line) {
                    let _ = events.send(event).await;
                } else {
                    log::debug!("Ignoring unrecognized daemon message: {}", line);
                }
            }
            connected.store(false, Ordering::SeqCst);
            pending.lock().await.clear();
        });

        Ok(())
    }

    /// Send a request and wait for its response
    pub async fn request(&self, method: &str, params: serde_json::Value) -> Result<DaemonResponse> {
        if !self.is_connected() {
            return Err(LeadflowError::Ipc("Not connected".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut json = serde_json::to_string(&DaemonRequest::new(id, method, params))?;
        json.push('\n');
        {
            let mut writer = self.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                self.pending.lock().await.remove(&id);
                return Err(LeadflowError::Ipc("Writer not available".into()));
            };
            w.write_all(json.as_bytes())
                .await
                .map_err(|e| LeadflowError::Ipc(format!("Failed to write: {}", e)))?;
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(LeadflowError::Ipc("Connection closed before response".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(LeadflowError::Ipc(format!("Request {} timed out", method)))
            }
        }
    }

    /// Ask the daemon to push events to this connection
    pub async fn subscribe(&self) -> Result<()> {
        let response = self.request(Methods::SUBSCRIBE, serde_json::json!({})).await?;
        match response.error {
            None => Ok(()),
            Some(e) => Err(LeadflowError::Ipc(e.message)),
        }
    }

    /// Next pushed event; None once the connection is gone
    pub async fn recv_event(&self) -> Option<DaemonEvent> {
        self.event_receiver.lock().await.recv().await
    }
}
