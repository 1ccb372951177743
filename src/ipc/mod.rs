//! IPC Layer - Unix socket transport for the polling gateway
//!
//! This module provides:
//! - Message types for requests and responses
//! - Unix socket server for the daemon
//! - Client for the CLI

pub mod client;
pub mod messages;
pub mod server;

pub use client::{IpcClient, IpcClientConfig};
pub use messages::{DaemonError, DaemonRequest, DaemonResponse, ErrorCode, Methods};
pub use server::{IpcServer, IpcServerConfig, RequestHandler};
