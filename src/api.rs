//! HTTP API for the deploy sidecar
//!
//! This module exposes the endpoints the orchestrating agent calls to
//! deploy, stop, and inspect apps. Handlers validate caller input, hand the
//! work to the script runner, and map every outcome to the same JSON body
//! shape: `{success, output, exit_code}`.

use crate::auth;
use crate::config::Config;
use crate::scripts::{ExecutionResult, ScriptRunner, DEFAULT_TIMEOUT, DEPLOY_TIMEOUT};
use crate::secrets::{self, BASIC_AUTH_PASS, BASIC_AUTH_USER};
use crate::validate::{is_valid_app_name, is_valid_port};
use anyhow::Result;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Version information for the sidecar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

// Scripts the sidecar is allowed to invoke (collaborator contract)
const DEPLOY_SCRIPT: &str = "deploy-app.sh";
const STOP_SCRIPT: &str = "stop-app.sh";
const STATUS_SCRIPT: &str = "status-app.sh";
const LOGS_SCRIPT: &str = "logs-app.sh";

/// Argument token telling the deploy script that auth is requested
const BASIC_AUTH_ARG: &str = "basic_auth";
/// Environment entry carrying the generated credential to the deploy script
const BASIC_AUTH_HASH_ENV: &str = "BASIC_AUTH_HASH";
/// Fallback for the logs line count
const DEFAULT_LOG_LINES: &str = "50";

/// Request to deploy an app
#[derive(Debug, Default, Deserialize)]
struct DeployRequest {
    #[serde(default)]
    app_name: String,
    /// Number or string; coerced to a string before validation
    #[serde(default)]
    port: serde_json::Value,
    #[serde(default)]
    basic_auth: bool,
    /// Accepted alias for `basic_auth`
    #[serde(default)]
    secure: bool,
}

impl DeployRequest {
    fn secure_requested(&self) -> bool {
        self.basic_auth || self.secure
    }
}

/// Request to stop an app
#[derive(Debug, Default, Deserialize)]
struct StopRequest {
    #[serde(default)]
    app_name: String,
}

/// The sidecar API server
pub struct ApiServer {
    config: Config,
    runner: ScriptRunner,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    pub fn new(config: Config, shutdown_rx: watch::Receiver<bool>) -> Self {
        let runner = ScriptRunner::new(&config.scripts_dir, &config.workspace_dir);
        Self {
            config,
            runner,
            shutdown_rx,
        }
    }

    /// Run the API server until shutdown is signalled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            scripts_dir = %self.config.scripts_dir.display(),
            "Deploy sidecar listening"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let api = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = api.serve_connection(stream, addr).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Deploy sidecar shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn serve_connection<S>(self: Arc<Self>, stream: S, _addr: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req| {
            let api = Arc::clone(&self);
            async move { api.handle_request(req).await }
        });

        AutoBuilder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
            .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

        Ok(())
    }

    async fn handle_request(
        self: Arc<Self>,
        req: Request<hyper::body::Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        debug!(%method, %path, "API request");

        let response = match (method, path.as_str()) {
            (Method::GET, "/health") => Ok(json_response(StatusCode::OK, r#"{"status":"ok"}"#)),
            (Method::GET, "/version") => {
                let version = serde_json::json!({
                    "name": PKG_NAME,
                    "version": VERSION,
                });
                Ok(json_response(StatusCode::OK, version.to_string()))
            }
            (Method::POST, "/deploy") => self.deploy(req).await,
            (Method::POST, "/stop") => self.stop(req).await,
            (Method::GET, "/status") => {
                let app_name = query_param(req.uri().query(), "app_name");
                self.status(app_name).await
            }
            (Method::GET, path) if path.starts_with("/logs/") => {
                let app_name = path.strip_prefix("/logs/").unwrap_or("").to_string();
                let lines = query_param(req.uri().query(), "lines");
                self.logs(&app_name, lines).await
            }
            _ => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
        };

        response.or_else(|e| {
            error!(error = %e, "API error");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ))
        })
    }

    /// Deploy an app. Expects JSON: `{"app_name": "my-app", "port": 80}`
    /// plus an optional `basic_auth`/`secure` flag.
    async fn deploy(&self, req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>> {
        let body = req.collect().await?.to_bytes();
        let deploy_req: DeployRequest = serde_json::from_slice(&body).unwrap_or_default();

        if !is_valid_app_name(&deploy_req.app_name) {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "Invalid app_name. Must be lowercase, start with a letter, \
                 use only letters/numbers/hyphens, max 63 chars.",
            ));
        }

        let port = coerce_to_string(&deploy_req.port);
        if !is_valid_port(&port) {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid port: {}. Must be a number.", port),
            ));
        }

        let mut args = vec![deploy_req.app_name.clone(), port];
        let mut env_extra = Vec::new();

        if deploy_req.secure_requested() {
            let env_file = self.config.env_file();
            let pairs = secrets::load_env_file(&env_file);
            let user = pairs.get(BASIC_AUTH_USER).map(String::as_str).unwrap_or("").trim();
            let pass = pairs.get(BASIC_AUTH_PASS).map(String::as_str).unwrap_or("").trim();

            if user.is_empty() || pass.is_empty() {
                return Ok(error_response(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "Basic auth requested but {} or {} is not set in {}",
                        BASIC_AUTH_USER,
                        BASIC_AUTH_PASS,
                        env_file.display()
                    ),
                ));
            }

            let credential = match auth::basic_auth_credential(user, pass) {
                Ok(credential) => credential,
                Err(e) => {
                    error!(app = %deploy_req.app_name, error = %e, "Credential generation failed");
                    return Ok(result_response(&ExecutionResult::internal(format!(
                        "Error generating credentials: {}",
                        e
                    ))));
                }
            };

            env_extra.push((BASIC_AUTH_HASH_ENV.to_string(), credential));
            args.push(BASIC_AUTH_ARG.to_string());
            info!(app = %deploy_req.app_name, "Basic auth enabled for deploy");
        }

        info!(app = %deploy_req.app_name, "Deploying app");
        let result = self
            .runner
            .run(DEPLOY_SCRIPT, &args, DEPLOY_TIMEOUT, &env_extra)
            .await;
        Ok(result_response(&result))
    }

    /// Stop an app. Expects JSON: `{"app_name": "my-app"}`
    async fn stop(&self, req: Request<hyper::body::Incoming>) -> Result<Response<Full<Bytes>>> {
        let body = req.collect().await?.to_bytes();
        let stop_req: StopRequest = serde_json::from_slice(&body).unwrap_or_default();

        if !is_valid_app_name(&stop_req.app_name) {
            return Ok(error_response(StatusCode::BAD_REQUEST, "Invalid app_name."));
        }

        info!(app = %stop_req.app_name, "Stopping app");
        let result = self
            .runner
            .run(STOP_SCRIPT, &[stop_req.app_name], DEFAULT_TIMEOUT, &[])
            .await;
        Ok(result_response(&result))
    }

    /// App status; lists all apps when no filter is given.
    async fn status(&self, app_name: Option<String>) -> Result<Response<Full<Bytes>>> {
        let args = match app_name.as_deref() {
            Some(name) if !name.is_empty() => {
                if !is_valid_app_name(name) {
                    return Ok(error_response(StatusCode::BAD_REQUEST, "Invalid app_name."));
                }
                vec![name.to_string()]
            }
            _ => Vec::new(),
        };

        let result = self
            .runner
            .run(STATUS_SCRIPT, &args, DEFAULT_TIMEOUT, &[])
            .await;
        Ok(result_response(&result))
    }

    /// App container logs. A non-numeric `lines` silently falls back to 50.
    async fn logs(&self, app_name: &str, lines: Option<String>) -> Result<Response<Full<Bytes>>> {
        if !is_valid_app_name(app_name) {
            return Ok(error_response(StatusCode::BAD_REQUEST, "Invalid app_name."));
        }

        let lines = match lines {
            Some(lines) if is_valid_port(&lines) => lines,
            _ => DEFAULT_LOG_LINES.to_string(),
        };

        let args = vec![app_name.to_string(), lines];
        let result = self.runner.run(LOGS_SCRIPT, &args, DEFAULT_TIMEOUT, &[]).await;
        Ok(result_response(&result))
    }
}

// ==================== Helper Functions ====================

/// Extract a query parameter without percent-decoding; every value the API
/// accepts is plain `[a-z0-9-]` or digits.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Coerce a JSON value to the string form used as a script argument.
fn coerce_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body.into()))
        .expect("valid response")
}

/// Map a script result to its HTTP response: 200 on success, 500 otherwise.
fn result_response(result: &ExecutionResult) -> Response<Full<Bytes>> {
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    json_response(status, serde_json::to_string(result).expect("result serializes"))
}

/// An error in the same body shape as a script result, with the given status.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let result = ExecutionResult::internal(message.into());
    json_response(status, serde_json::to_string(&result).expect("result serializes"))
}
