//! Run request handlers
//!
//! Handles run.* IPC methods by delegating to the Supervisor and JobRegistry.

use serde_json::Value;

use crate::daemon::context::DaemonContext;
use crate::error::{CrunnerError, Result};
use crate::id::JobId;
use crate::ipc::messages::{DaemonError, DaemonResponse};
use crate::jobs::JobSnapshot;

/// Extract and validate the `jobId` parameter
fn job_id_param(params: &Value) -> Result<JobId> {
    match params["jobId"].as_str() {
        Some(raw) => JobId::parse(raw),
        None => Err(CrunnerError::InvalidInput("Missing 'jobId' parameter".to_string())),
    }
}

fn snapshot_response(id: u64, snapshot: &JobSnapshot) -> DaemonResponse {
    match serde_json::to_value(snapshot) {
        Ok(value) => DaemonResponse::success(id, value),
        Err(e) => DaemonResponse::error(id, DaemonError::internal_error(e.to_string())),
    }
}

/// Handle run.start - launch a compiled job, or report the existing run
pub async fn handle_run_start(id: u64, params: &Value, ctx: &DaemonContext) -> DaemonResponse {
    let job_id = match job_id_param(params) {
        Ok(job_id) => job_id,
        Err(e) => return DaemonResponse::error(id, DaemonError::from(&e)),
    };

    match ctx.supervisor.start_run(&job_id).await {
        Ok(outcome) => {
            if !outcome.started {
                log::debug!("Job {} already has a record, returning snapshot", job_id);
            }
            snapshot_response(id, &outcome.snapshot)
        }
        Err(e) => {
            if !e.is_client_error() {
                log::error!("Failed to start job {}: {}", job_id, e);
            }
            DaemonResponse::error(id, DaemonError::from(&e))
        }
    }
}

/// Handle run.poll - report the current snapshot of a job
pub async fn handle_run_poll(id: u64, params: &Value, ctx: &DaemonContext) -> DaemonResponse {
    let job_id = match job_id_param(params) {
        Ok(job_id) => job_id,
        Err(e) => return DaemonResponse::error(id, DaemonError::from(&e)),
    };

    match ctx.registry.snapshot(&job_id) {
        Some(snapshot) => snapshot_response(id, &snapshot),
        None => DaemonResponse::error(id, DaemonError::from(&CrunnerError::JobNotFound(job_id.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ipc::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> DaemonContext {
        let mut config = Config::default();
        config.workspace.dir = temp.path().to_path_buf();
        DaemonContext::new(&config).unwrap()
    }

    #[test]
    fn test_job_id_param_validation() {
        assert!(job_id_param(&json!({"jobId": "1700000000000-abcd0123"})).is_ok());
        assert!(matches!(
            job_id_param(&json!({})),
            Err(CrunnerError::InvalidInput(_))
        ));
        assert!(matches!(
            job_id_param(&json!({"jobId": "../../bin/sh"})),
            Err(CrunnerError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_artifact_is_not_found() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let response = handle_run_start(1, &json!({"jobId": "1700000000000-abcd0123"}), &ctx).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::ARTIFACT_NOT_FOUND);
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_poll_never_started_is_not_found() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let response = handle_run_poll(2, &json!({"jobId": "1700000000000-abcd0123"}), &ctx).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::JOB_NOT_FOUND);
        assert_eq!(error.data.unwrap()["jobId"], "1700000000000-abcd0123");
    }

    #[tokio::test]
    async fn test_missing_job_id_is_invalid_params() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let start = handle_run_start(3, &json!({}), &ctx).await;
        let poll = handle_run_poll(4, &json!({"jobId": 7}), &ctx).await;
        assert_eq!(start.error.unwrap().code, ErrorCode::INVALID_PARAMS);
        assert_eq!(poll.error.unwrap().code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_start_then_poll_reports_running_shape() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let job_id = JobId::generate();
        let artifact = ctx.workspace.artifact_path(&job_id);
        std::fs::write(&artifact, "#!/bin/sh\nexec sleep 2\n").unwrap();
        std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o755)).unwrap();

        let params = json!({"jobId": job_id.as_str()});
        let started = handle_run_start(5, &params, &ctx).await.result.unwrap();
        assert_eq!(started["jobId"], job_id.as_str());
        assert_eq!(started["status"], "running");
        assert_eq!(started["output"], "");

        let polled = handle_run_poll(6, &params, &ctx).await.result.unwrap();
        assert_eq!(polled["status"], "running");
        assert!(polled["exitCode"].is_null());
        assert!(polled["elapsedMs"].is_u64());
    }
}
