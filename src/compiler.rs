//! Compiler invoker - turns a persisted source file into an executable artifact
//!
//! A failed compile is ordinary output for the caller, so `compile` never
//! returns an error: toolchain diagnostics, a missing toolchain and a hung
//! toolchain all become `CompileOutcome::Failure`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ToolchainConfig;

/// Message reported when the compiler succeeded silently
pub const CLEAN_COMPILE_MESSAGE: &str = "Compilation successful.";

/// Result of a compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Artifact is ready; `output` carries warnings if there were any
    Success { artifact: PathBuf, output: String },
    /// Toolchain rejected the source or could not run
    Failure { diagnostics: String },
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text shown to the caller in either case
    pub fn output(&self) -> &str {
        match self {
            Self::Success { output, .. } => output,
            Self::Failure { diagnostics } => diagnostics,
        }
    }
}

/// Native toolchain wrapper
#[derive(Debug, Clone)]
pub struct Compiler {
    config: ToolchainConfig,
}

impl Compiler {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// Build the command line without running it
    fn command(&self, source: &Path, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.config.compiler);
        cmd.args(&self.config.flags)
            .arg("-o")
            .arg(artifact)
            .arg(source)
            .env_clear()
            .env("PATH", &self.config.search_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Compile `source` into `artifact`
    pub async fn compile(&self, source: &Path, artifact: &Path) -> CompileOutcome {
        let child = match self.command(source, artifact).spawn() {
            Ok(child) => child,
            Err(e) => {
                log::error!("Failed to invoke {}: {}", self.config.compiler.display(), e);
                return CompileOutcome::Failure {
                    diagnostics: format!("Failed to invoke compiler {}: {}", self.config.compiler.display(), e),
                };
            }
        };

        let timeout = self.config.compile_timeout();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                log::error!("Compiler wait failed for {}: {}", source.display(), e);
                return CompileOutcome::Failure {
                    diagnostics: format!("Compiler failed: {}", e),
                };
            }
            Err(_) => {
                log::warn!("Compilation of {} timed out after {:?}", source.display(), timeout);
                return CompileOutcome::Failure {
                    diagnostics: format!("Compilation timed out after {}ms", self.config.compile_timeout_ms),
                };
            }
        };

        let text = combine_streams(&output.stdout, &output.stderr);

        if !output.status.success() {
            let diagnostics = if text.is_empty() {
                format!("Compiler exited with {}", output.status)
            } else {
                text
            };
            log::debug!("Compilation of {} failed", source.display());
            return CompileOutcome::Failure { diagnostics };
        }

        if let Err(e) = mark_executable(artifact) {
            // The run will fail instead and report it then
            log::warn!("Failed to mark {} executable: {}", artifact.display(), e);
        }

        CompileOutcome::Success {
            artifact: artifact.to_path_buf(),
            output: if text.is_empty() {
                CLEAN_COMPILE_MESSAGE.to_string()
            } else {
                text
            },
        }
    }
}

fn combine_streams(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.into_owned(),
        (true, false) => stderr.into_owned(),
        (false, false) => format!("{}{}", stdout, stderr),
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
