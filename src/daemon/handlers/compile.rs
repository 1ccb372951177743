//! Compile request handler
//!
//! Handles the `compile` IPC method: persist the source, run the toolchain,
//! and report the outcome. A rejected program is a successful response with
//! `success: false`; only workspace failures produce an error response.

use serde_json::{Value, json};

use crate::compiler::CompileOutcome;
use crate::daemon::context::DaemonContext;
use crate::ipc::messages::{DaemonError, DaemonResponse};

/// Handle compile - persist and compile submitted source
pub async fn handle_compile(id: u64, params: &Value, ctx: &DaemonContext) -> DaemonResponse {
    let source = match params["source"].as_str() {
        Some(s) if !s.trim().is_empty() => s,
        _ => return DaemonResponse::error(id, DaemonError::invalid_params("Missing 'source' parameter")),
    };

    let (job_id, source_path) = match ctx.workspace.allocate(source).await {
        Ok(allocated) => allocated,
        Err(e) => {
            log::error!("Failed to persist source: {}", e);
            return DaemonResponse::error(id, DaemonError::from(&e));
        }
    };

    let artifact = ctx.workspace.artifact_path(&job_id);
    let outcome = ctx.compiler.compile(&source_path, &artifact).await;
    log::info!("Compiled job {} (success: {})", job_id, outcome.is_success());

    match outcome {
        CompileOutcome::Success { output, .. } => DaemonResponse::success(
            id,
            json!({
                "success": true,
                "output": output,
                "jobId": job_id,
            }),
        ),
        CompileOutcome::Failure { diagnostics } => DaemonResponse::success(
            id,
            json!({
                "success": false,
                "output": diagnostics,
                "jobId": null,
            }),
        ),
    }
}
