//! IPC client for talking to the daemon.
//!
//! Provides async connection to the daemon Unix socket with
//! request/response correlation and a per-request timeout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, oneshot};

use crate::config::default_socket_path;
use crate::error::{CrunnerError, Result};
use crate::ipc::messages::{DaemonRequest, DaemonResponse, Methods};

/// Configuration for IPC client.
#[derive(Debug, Clone)]
pub struct IpcClientConfig {
    /// Path to daemon Unix socket.
    pub socket_path: PathBuf,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for IpcClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: 90_000,
        }
    }
}

impl IpcClientConfig {
    /// Create config with custom socket path.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<DaemonResponse>>;

/// IPC client for communicating with daemon.
pub struct IpcClient {
    config: IpcClientConfig,
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
}

impl IpcClient {
    /// Create a new IPC client with config.
    pub fn new(config: IpcClientConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create client with socket path.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self::new(IpcClientConfig::with_socket(path))
    }

    /// Connect to daemon.
    pub async fn connect(&self) -> Result<()> {
        let stream = UnixStream::connect(&self.config.socket_path)
            .await
            .map_err(|e| CrunnerError::Ipc(format!("Failed to connect to {}: {}", self.config.socket_path.display(), e)))?;

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);

        // Reader task routes responses to their waiting requests
        let pending = Arc::clone(&self.pending);
        let connected = Arc::clone(&self.connected);
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<DaemonResponse>(trimmed) {
                            Ok(response) => {
                                if let Some(sender) = pending.lock().await.remove(&response.id) {
                                    let _ = sender.send(response);
                                }
                            }
                            Err(e) => log::debug!("Ignoring unparseable daemon message: {}", e),
                        }
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            // Wake every waiter; their senders drop here
            pending.lock().await.clear();
        });

        Ok(())
    }

    /// Disconnect from daemon.
    pub async fn disconnect(&self) -> Result<()> {
        *self.writer.lock().await = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get socket path.
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Send a request and wait for response.
    pub async fn request(&self, method: &str, params: Value) -> Result<DaemonResponse> {
        if !self.is_connected() {
            return Err(CrunnerError::Ipc("Not connected".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = DaemonRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        {
            let mut writer = self.writer.lock().await;
            let Some(w) = writer.as_mut() else {
                self.pending.lock().await.remove(&id);
                return Err(CrunnerError::Ipc("Writer not available".into()));
            };
            if let Err(e) = w.write_all(json.as_bytes()).await {
                self.pending.lock().await.remove(&id);
                return Err(CrunnerError::Ipc(format!("Failed to write: {}", e)));
            }
            w.flush()
                .await
                .map_err(|e| CrunnerError::Ipc(format!("Failed to flush: {}", e)))?;
        }

        let timeout = tokio::time::Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CrunnerError::Ipc("Connection closed before response".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CrunnerError::Ipc("Request timeout".into()))
            }
        }
    }

    /// Send ping request.
    pub async fn ping(&self) -> Result<bool> {
        let response = self.request(Methods::PING, serde_json::json!({})).await?;
        Ok(response.is_success())
    }

    /// Submit source text for compilation.
    pub async fn compile(&self, source: &str) -> Result<DaemonResponse> {
        self.request(Methods::COMPILE, serde_json::json!({ "source": source }))
            .await
    }

    /// Start running a compiled job.
    pub async fn start_run(&self, job_id: &str) -> Result<DaemonResponse> {
        self.request(Methods::RUN_START, serde_json::json!({ "jobId": job_id }))
            .await
    }

    /// Fetch the current snapshot of a job.
    pub async fn poll_run(&self, job_id: &str) -> Result<DaemonResponse> {
        self.request(Methods::RUN_POLL, serde_json::json!({ "jobId": job_id }))
            .await
    }
}
