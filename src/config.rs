use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the credentials file under the workspace root
const ENV_FILE_NAME: &str = ".env";

/// Sidecar configuration
///
/// Resolved once at startup and passed down explicitly; the gateway never
/// reads ambient process state, so tests can inject temporary directories.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server
    pub bind_addr: SocketAddr,

    /// Directory holding the deploy scripts
    pub scripts_dir: PathBuf,

    /// Workspace root handed to every script via WORKSPACE_DIR
    pub workspace_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let scripts_dir = env_or("SCRIPTS_DIR", "/deploy-scripts");
        let workspace_dir = env_or("WORKSPACE_DIR", "/workspace");

        let bind_addr = std::env::var("BIND_ADDR")
            .ok()
            .and_then(|addr| match addr.parse() {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(addr = %addr, error = %e, "Invalid BIND_ADDR, using default");
                    None
                }
            })
            .unwrap_or_else(default_bind_addr);

        Self {
            bind_addr,
            scripts_dir: PathBuf::from(scripts_dir),
            workspace_dir: PathBuf::from(workspace_dir),
        }
    }

    /// Construct a config with explicit directories (tests, embedding).
    pub fn new(
        bind_addr: SocketAddr,
        scripts_dir: impl AsRef<Path>,
        workspace_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            bind_addr,
            scripts_dir: scripts_dir.as_ref().to_path_buf(),
            workspace_dir: workspace_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the credentials file read by secure deploys.
    pub fn env_file(&self) -> PathBuf {
        self.workspace_dir.join(ENV_FILE_NAME)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            scripts_dir: PathBuf::from("/deploy-scripts"),
            workspace_dir: PathBuf::from("/workspace"),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:5000".parse().expect("valid default bind address")
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
