use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Search path handed to the compiler and to every spawned program.
/// Nothing else from the daemon's environment is inherited.
pub const DEFAULT_SEARCH_PATH: &str = "/usr/bin:/bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub workspace: WorkspaceConfig,
    pub toolchain: ToolchainConfig,
    pub execution: ExecutionConfig,
    pub registry: RegistryConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("c-compiler"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub compiler: PathBuf,
    pub flags: Vec<String>,
    pub search_path: String,
    pub compile_timeout_ms: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("/usr/bin/gcc"),
            flags: vec!["-Wall".to_string()],
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            compile_timeout_ms: 60_000,
        }
    }
}

impl ToolchainConfig {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub search_path: String,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    pub drain_grace_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            timeout_ms: 30_000,
            max_output_bytes: 1024 * 1024,
            drain_grace_ms: 1_000,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub retention_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { retention_secs: 300 }
    }
}

impl RegistryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_clients: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            request_timeout_ms: 90_000,
        }
    }
}

/// Default daemon socket under the runtime (or local data) directory
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("crunner")
        .join("daemon.sock")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            workspace: WorkspaceConfig::default(),
            toolchain: ToolchainConfig::default(),
            execution: ExecutionConfig::default(),
            registry: RegistryConfig::default(),
            server: ServerConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
