//! Daemon Core - request routing for the polling gateway
//!
//! The daemon is the long-running process that:
//! - Accepts compile requests and answers them synchronously
//! - Starts runs and returns immediately
//! - Serves run snapshots to pollers until reclamation

pub mod context;
pub mod handlers;

use std::sync::Arc;

use serde_json::json;

use crate::ipc::messages::{DaemonError, DaemonRequest, DaemonResponse, Methods};
use crate::ipc::server::RequestHandler;

pub use context::DaemonContext;

/// Routes IPC methods to their handlers
#[derive(Debug, Clone)]
pub struct DaemonRouter {
    ctx: Arc<DaemonContext>,
}

impl DaemonRouter {
    pub fn new(ctx: Arc<DaemonContext>) -> Self {
        Self { ctx }
    }

    /// Dispatch one request
    pub async fn dispatch(&self, request: DaemonRequest) -> DaemonResponse {
        let DaemonRequest { id, method, params } = request;
        log::debug!("Request {} method={}", id, method);

        match method.as_str() {
            Methods::PING => DaemonResponse::success(
                id,
                json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") }),
            ),
            Methods::COMPILE => handlers::handle_compile(id, &params, &self.ctx).await,
            Methods::RUN_START => handlers::handle_run_start(id, &params, &self.ctx).await,
            Methods::RUN_POLL => handlers::handle_run_poll(id, &params, &self.ctx).await,
            other => DaemonResponse::error(id, DaemonError::method_not_found(other)),
        }
    }
}

impl RequestHandler for DaemonRouter {
    fn handle(&self, request: DaemonRequest) -> impl std::future::Future<Output = DaemonResponse> + Send {
        self.dispatch(request)
    }
}
