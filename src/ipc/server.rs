//! IPC Server - Unix socket server for client-daemon communication
//!
//! Provides:
//! - Unix stream socket listener
//! - Client connection handling
//! - Request routing and response sending

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{RwLock, watch};

use crate::config::{ServerConfig, default_socket_path};
use crate::error::{CrunnerError, Result};
use crate::ipc::messages::{DaemonError, DaemonRequest, DaemonResponse};

/// Configuration for the IPC server
#[derive(Debug, Clone)]
pub struct IpcServerConfig {
    /// Path to the Unix socket
    pub socket_path: PathBuf,
    /// Maximum number of concurrent clients
    pub max_clients: usize,
}

impl Default for IpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_clients: 64,
        }
    }
}

impl From<&ServerConfig> for IpcServerConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            max_clients: config.max_clients,
        }
    }
}

impl IpcServerConfig {
    /// Create config with custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    /// Set max clients
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }
}

/// Handler trait for processing requests
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    fn handle(&self, request: DaemonRequest) -> impl std::future::Future<Output = DaemonResponse> + Send;
}

/// IPC Server for daemon communication
pub struct IpcServer {
    config: IpcServerConfig,
    /// Connected client IDs
    clients: Arc<RwLock<HashSet<u64>>>,
    /// Next client ID
    next_client_id: AtomicU64,
    /// Shutdown signal
    shutdown_tx: watch::Sender<bool>,
}

impl IpcServer {
    /// Create a new IPC server with default config
    pub fn new() -> Self {
        Self::with_config(IpcServerConfig::default())
    }

    /// Create a new IPC server with custom config
    pub fn with_config(config: IpcServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            clients: Arc::new(RwLock::new(HashSet::new())),
            next_client_id: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Get count of connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Run the server with a request handler until `shutdown` is called
    pub async fn run<H: RequestHandler + 'static>(&self, handler: Arc<H>) -> Result<()> {
        // Remove existing socket if present
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)
            .map_err(|e| CrunnerError::Ipc(format!("Failed to bind socket: {}", e)))?;
        log::info!("Listening on {}", self.config.socket_path.display());

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        while !*shutdown_rx.borrow_and_update() {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let client_count = self.clients.read().await.len();
                            if client_count >= self.config.max_clients {
                                log::warn!("Rejecting connection, {} clients connected", client_count);
                                continue;
                            }

                            let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                            self.clients.write().await.insert(client_id);

                            let handler_clone = Arc::clone(&handler);
                            let clients = Arc::clone(&self.clients);

                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, handler_clone).await {
                                    log::debug!("Client {} connection error: {}", client_id, e);
                                }
                                clients.write().await.remove(&client_id);
                            });
                        }
                        Err(e) => {
                            log::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        // Cleanup socket
        let _ = std::fs::remove_file(&self.config.socket_path);
        log::info!("Server stopped");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl Default for IpcServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle a single client connection
async fn handle_client<H: RequestHandler>(stream: UnixStream, handler: Arc<H>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break; // EOF - client disconnected
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<DaemonRequest>(trimmed) {
            Ok(request) => handler.handle(request).await,
            Err(e) => DaemonResponse::error(0, DaemonError::parse_error(format!("Parse error: {}", e))),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}
