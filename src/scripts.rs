//! Script execution gateway
//!
//! The sole path from an HTTP request to a subprocess. Scripts are resolved
//! inside a fixed directory and launched as `bash <script> <args...>` with
//! discrete argument tokens, so caller input is never re-interpreted by a
//! shell. Every outcome, including launch failures and timeouts, is
//! normalized into an [`ExecutionResult`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Timeout for stop/status/logs scripts
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for the deploy script, which runs a full image build
pub const DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);

/// Separator between stdout and stderr in the combined output
const STDERR_SEPARATOR: &str = "\n--- stderr ---\n";

/// Normalized outcome of a script invocation
///
/// Returned verbatim as the HTTP response body. `exit_code` is the real
/// subprocess exit code, or `-1` for outcomes that never produced one
/// (missing script, timeout, launch failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    /// An internal failure that never produced a real exit code
    pub fn internal(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            exit_code: -1,
        }
    }
}

/// Build a subprocess environment from a base environment and ordered
/// overrides. Overrides win over the base, and later overrides win over
/// earlier ones.
pub fn merged_env(
    base: impl IntoIterator<Item = (String, String)>,
    overrides: &[(String, String)],
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = base.into_iter().collect();
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Executes deploy scripts under a timeout with a controlled environment.
///
/// Both directories are injected at construction; the runner never consults
/// ambient process state, so tests run it against a temp scripts directory.
pub struct ScriptRunner {
    scripts_dir: PathBuf,
    workspace_dir: PathBuf,
}

impl ScriptRunner {
    pub fn new(scripts_dir: impl Into<PathBuf>, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            workspace_dir: workspace_dir.into(),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Run a named script with positional arguments and extra environment
    /// entries, bounded by a wall-clock timeout.
    ///
    /// The subprocess environment is the sidecar's own environment with
    /// `WORKSPACE_DIR` forced to the configured value and `env_extra`
    /// applied last. On timeout the script's whole process group is killed
    /// so nothing outlives the request.
    pub async fn run(
        &self,
        script_name: &str,
        args: &[String],
        timeout: Duration,
        env_extra: &[(String, String)],
    ) -> ExecutionResult {
        let script_path = self.scripts_dir.join(script_name);

        if !script_path.is_file() {
            warn!(script = %script_name, path = %script_path.display(), "Script not found");
            return ExecutionResult::internal(format!("Script not found: {}", script_name));
        }

        let mut overrides = vec![(
            "WORKSPACE_DIR".to_string(),
            self.workspace_dir.display().to_string(),
        )];
        overrides.extend_from_slice(env_extra);
        let env = merged_env(std::env::vars(), &overrides);

        let mut cmd = Command::new("bash");
        cmd.arg(&script_path)
            .args(args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down the script's children too
        #[cfg(unix)]
        cmd.process_group(0);

        info!(script = %script_name, args = ?args, "Running script");
        debug!(script = %script_name, timeout_secs = timeout.as_secs(), "Script timeout");

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(script = %script_name, error = %e, "Failed to launch script");
                return ExecutionResult::internal(format!("Error running script: {}", e));
            }
        };
        let pid = child.id();

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let combined = combine_output(&output.stdout, &output.stderr);

                if output.status.success() {
                    info!(script = %script_name, "Script completed");
                } else {
                    warn!(script = %script_name, exit_code, "Script failed");
                }

                ExecutionResult {
                    success: output.status.success(),
                    output: combined,
                    exit_code,
                }
            }
            Ok(Err(e)) => {
                warn!(script = %script_name, error = %e, "Error collecting script output");
                ExecutionResult::internal(format!("Error running script: {}", e))
            }
            Err(_) => {
                // The dropped child is killed and reaped by the runtime;
                // the group kill catches anything the script spawned.
                kill_process_group(pid);
                warn!(
                    script = %script_name,
                    timeout_secs = timeout.as_secs(),
                    "Script timed out, process group killed"
                );
                ExecutionResult::internal(format!(
                    "Script timed out after {}s",
                    timeout.as_secs()
                ))
            }
        }
    }
}

/// Combined stdout/stderr text, stderr behind a literal separator, trimmed.
fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        output.push_str(STDERR_SEPARATOR);
        output.push_str(&String::from_utf8_lossy(stderr));
    }
    output.trim().to_string()
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
