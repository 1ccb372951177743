//! Daemon context - shared state for request handlers
//!
//! DaemonContext owns all the components needed for daemon operations:
//! the workspace, the compiler, the job registry and the supervisor that
//! feeds it. One instance is built at startup and shared by every connection.

use std::sync::Arc;

use crate::compiler::Compiler;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{JobRegistry, Supervisor};
use crate::workspace::WorkspaceStore;

/// Shared context for all daemon request handlers
#[derive(Debug)]
pub struct DaemonContext {
    /// Scratch directory for sources and artifacts
    pub workspace: WorkspaceStore,
    /// Native toolchain wrapper
    pub compiler: Compiler,
    /// Running and recently finished jobs
    pub registry: Arc<JobRegistry>,
    /// Launches artifacts into the registry
    pub supervisor: Supervisor,
}

impl DaemonContext {
    /// Create a new DaemonContext with all components initialized
    pub fn new(config: &Config) -> Result<Self> {
        let workspace = WorkspaceStore::new(&config.workspace.dir);
        workspace.ensure()?;

        let compiler = Compiler::new(config.toolchain.clone());

        let registry = Arc::new(JobRegistry::new(
            config.registry.retention(),
            config.execution.max_output_bytes,
        ));

        let supervisor = Supervisor::new(
            Arc::clone(&registry),
            workspace.clone(),
            config.execution.clone(),
        );

        Ok(Self {
            workspace,
            compiler,
            registry,
            supervisor,
        })
    }

    /// Cancel pending reclamation timers
    pub fn shutdown(&self) {
        let cancelled = self.registry.shutdown();
        log::debug!("Cancelled {} reclamation timers", cancelled);
    }
}
