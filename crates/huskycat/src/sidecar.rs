//! JSON-RPC client for the GPL tool sidecar.
//!
//! The sidecar is a separate process hosting copyleft-licensed tools; the
//! core never links its code and speaks to it only over a Unix-domain
//! stream socket. One request per connection: write the request JSON,
//! half-close, read the response until end-of-stream.
//!
//! Transport failures never escape [`SidecarClient::execute`]: timeouts
//! become a synthetic exit-code-124 result and other errors an
//! exit-code-1 result, so callers need no special-case code.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::process::TIMEOUT_EXIT_CODE;

/// Size cap per direction on the wire.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Environment variable naming the socket path.
pub const SOCKET_ENV: &str = "HUSKYCAT_GPL_SOCKET";

/// Budget for the availability probe.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-invocation execution budget, mirrored by the server.
pub const EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// `/tmp/huskycat-gpl-<uid>.sock`
pub fn default_socket_path() -> PathBuf {
    let uid = nix::unistd::Uid::current().as_raw();
    PathBuf::from(format!("/tmp/huskycat-gpl-{uid}.sock"))
}

/// Socket path from `HUSKYCAT_GPL_SOCKET`, falling back to the default.
pub fn socket_path_from_env() -> PathBuf {
    std::env::var_os(SOCKET_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_socket_path)
}

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("sidecar connection failed: {0}")]
    Connection(String),
    #[error("sidecar request timed out: {0}")]
    Timeout(String),
    #[error("sidecar protocol error: {0}")]
    Protocol(String),
    #[error("sidecar rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// One entry from `list_tools`.
#[derive(Debug, Clone, Deserialize)]
pub struct SidecarToolInfo {
    pub name: String,
    pub path: String,
    pub available: bool,
    #[serde(default)]
    pub version: String,
}

/// Uniform execution outcome, synthesized on transport failure.
#[derive(Debug, Clone)]
pub struct SidecarExecution {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

pub struct SidecarClient {
    socket_path: PathBuf,
    next_id: AtomicU64,
}

impl SidecarClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_env() -> Self {
        Self::new(socket_path_from_env())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// A sidecar is available iff `health` answers "healthy" within 2 s.
    pub fn is_available(&self) -> bool {
        match self.send_request("health", None, HEALTH_TIMEOUT) {
            Ok(result) => result.get("status").and_then(Value::as_str) == Some("healthy"),
            Err(err) => {
                tracing::debug!(%err, "gpl sidecar not available");
                false
            }
        }
    }

    pub fn list_tools(&self) -> Result<Vec<SidecarToolInfo>, SidecarError> {
        let result = self.send_request("list_tools", None, HEALTH_TIMEOUT)?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| SidecarError::Protocol("missing 'tools' in result".to_string()))?;
        serde_json::from_value(tools)
            .map_err(|e| SidecarError::Protocol(format!("bad list_tools payload: {e}")))
    }

    /// Execute a GPL tool. Infallible by construction: every transport
    /// failure is folded into the result.
    pub fn execute(&self, tool: &str, args: &[String], cwd: Option<&Path>) -> SidecarExecution {
        let start = Instant::now();

        let mut params = json!({ "tool": tool, "args": args });
        if let Some(cwd) = cwd {
            params["cwd"] = json!(cwd.display().to_string());
        }

        match self.send_request("execute", Some(params), EXECUTE_TIMEOUT) {
            Ok(result) => SidecarExecution {
                success: result
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                exit_code: result
                    .get("exit_code")
                    .and_then(Value::as_i64)
                    .unwrap_or(1) as i32,
                stdout: result
                    .get("stdout")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                stderr: result
                    .get("stderr")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(SidecarError::Timeout(msg)) => SidecarExecution {
                success: false,
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: msg,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            Err(err) => SidecarExecution {
                success: false,
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("sidecar error: {err}"),
                duration_ms: start.elapsed().as_millis() as u64,
            },
        }
    }

    /// One request, one connection. Client half-closes after writing; the
    /// response runs until end-of-stream, capped at 1 MiB.
    fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SidecarError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            request["params"] = params;
        }

        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            SidecarError::Connection(format!(
                "{}: {e}. Is the sidecar running?",
                self.socket_path.display()
            ))
        })?;
        stream.set_read_timeout(Some(timeout)).ok();
        stream.set_write_timeout(Some(timeout)).ok();

        let bytes = serde_json::to_vec(&request)
            .map_err(|e| SidecarError::Protocol(format!("request encode: {e}")))?;

        let mut stream = stream;
        stream.write_all(&bytes).map_err(|e| io_to_error(e, timeout))?;
        stream.shutdown(Shutdown::Write).ok();

        let mut response = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    if response.len() > MAX_MESSAGE_BYTES {
                        return Err(SidecarError::Protocol("response too large (>1MiB)".into()));
                    }
                }
                Err(e) => return Err(io_to_error(e, timeout)),
            }
        }

        if response.is_empty() {
            return Err(SidecarError::Protocol("empty response".to_string()));
        }

        let value: Value = serde_json::from_slice(&response)
            .map_err(|e| SidecarError::Protocol(format!("invalid JSON response: {e}")))?;

        if let Some(error) = value.get("error") {
            return Err(SidecarError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        value
            .get("result")
            .cloned()
            .ok_or_else(|| SidecarError::Protocol("missing 'result' in response".to_string()))
    }
}

fn io_to_error(e: std::io::Error, timeout: Duration) -> SidecarError {
    if matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    ) {
        SidecarError::Timeout(format!(
            "request timed out after {}",
            humantime::format_duration(timeout)
        ))
    } else {
        SidecarError::Connection(e.to_string())
    }
}
