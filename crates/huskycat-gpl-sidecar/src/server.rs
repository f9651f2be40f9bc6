//! JSON-RPC 2.0 server over a Unix-domain socket.
//!
//! Single-threaded and sequential: accept, read the full request (the
//! client half-closes after writing), handle, write the response, close.
//! 1 MiB cap each direction; each tool invocation gets a 30 second budget.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde_json::{Value, json};

/// Size cap per direction on the wire.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Wall-clock budget per tool invocation.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Socket-level read/write budget, matching the tool budget.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

pub const SERVER_NAME: &str = "huskycat-gpl-sidecar";

/// Closed allow-list: tool name to absolute path. Anything else is
/// rejected at the protocol layer.
pub const SUPPORTED_TOOLS: [(&str, &str); 3] = [
    ("shellcheck", "/usr/bin/shellcheck"),
    ("hadolint", "/usr/bin/hadolint"),
    ("yamllint", "/usr/bin/yamllint"),
];

fn tool_path(tool: &str) -> Option<&'static str> {
    SUPPORTED_TOOLS
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, path)| *path)
}

/// Accept loop. One connection at a time; concurrent clients queue in the
/// listener backlog.
pub fn serve(listener: UnixListener) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().context("accept failed")?;
        if let Err(err) = handle_connection(stream) {
            tracing::warn!(%err, "connection handling failed");
        }
    }
}

/// One request, one response, then close.
pub fn handle_connection(mut stream: UnixStream) -> Result<()> {
    stream.set_read_timeout(Some(SOCKET_TIMEOUT)).ok();
    stream.set_write_timeout(Some(SOCKET_TIMEOUT)).ok();

    let mut data = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                data.extend_from_slice(&chunk[..n]);
                if data.len() > MAX_MESSAGE_BYTES {
                    tracing::warn!("request too large, dropping connection");
                    return Ok(());
                }
            }
            Err(err) => return Err(err).context("request read failed"),
        }
    }

    if data.is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_slice::<Value>(&data) {
        Ok(request) => handle_request(&request),
        Err(_) => error_response(Value::Null, -32700, "Parse error"),
    };

    let bytes = serde_json::to_vec(&response).context("response encode failed")?;
    stream.write_all(&bytes).context("response write failed")?;
    Ok(())
}

/// Route one JSON-RPC 2.0 request.
pub fn handle_request(request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return error_response(id, -32600, "Invalid JSON-RPC version");
    }

    let method = match request.get("method").and_then(Value::as_str) {
        Some(method) => method,
        None => return error_response(id, -32600, "Missing method"),
    };
    let params = request.get("params").cloned().unwrap_or(json!({}));

    tracing::info!(%method, "handling request");

    match method {
        "health" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "status": "healthy", "server": SERVER_NAME },
        }),
        "list_tools" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": list_tools() },
        }),
        "execute" => handle_execute(id, &params),
        other => error_response(id, -32601, &format!("Method not found: {other}")),
    }
}

fn handle_execute(id: Value, params: &Value) -> Value {
    let tool = match params.get("tool").and_then(Value::as_str) {
        Some(tool) => tool,
        None => return error_response(id, -32602, "Missing 'tool' parameter"),
    };
    let args: Vec<String> = match params.get("args") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(_) => return error_response(id, -32602, "'args' must be a list"),
    };

    let Some(path) = tool_path(tool) else {
        return error_response(id, -32601, &format!("Unsupported tool: {tool}"));
    };

    let cwd = params
        .get("cwd")
        .and_then(Value::as_str)
        .unwrap_or("/workspace");

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": execute_tool(path, &args, cwd),
    })
}

/// Execute an allow-listed tool. Every failure shape is a result, so the
/// client never needs transport-level special cases for tool problems.
fn execute_tool(path: &str, args: &[String], cwd: &str) -> Value {
    if !Path::new(path).exists() {
        return json!({
            "success": false,
            "stdout": "",
            "stderr": format!("Tool not found: {path}"),
            "exit_code": 127,
        });
    }

    tracing::info!(%path, ?args, %cwd, "executing tool");

    let start = Instant::now();
    let mut child = match Command::new(path)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            return json!({
                "success": false,
                "stdout": "",
                "stderr": format!("Execution error: {err}"),
                "exit_code": 1,
            });
        }
    };

    let deadline = start + TOOL_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let exit_code = status.code().unwrap_or(1);
                return json!({
                    "success": exit_code == 0,
                    "stdout": read_pipe(child.stdout.take()),
                    "stderr": read_pipe(child.stderr.take()),
                    "exit_code": exit_code,
                });
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return json!({
                        "success": false,
                        "stdout": "",
                        "stderr": format!("Tool execution timed out after {}s", TOOL_TIMEOUT.as_secs()),
                        "exit_code": 124,
                    });
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                return json!({
                    "success": false,
                    "stdout": "",
                    "stderr": format!("Execution error: {err}"),
                    "exit_code": 1,
                });
            }
        }
    }
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn list_tools() -> Vec<Value> {
    SUPPORTED_TOOLS
        .iter()
        .map(|(name, path)| {
            let available = Path::new(path).exists();
            let version = if available {
                probe_version(path)
            } else {
                "unknown".to_string()
            };
            json!({
                "name": name,
                "path": path,
                "available": available,
                "version": version,
            })
        })
        .collect()
}

/// First line of `<tool> --version`, best effort with a 5 s budget.
fn probe_version(path: &str) -> String {
    let child = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();

    let Ok(mut child) = child else {
        return "unknown".to_string();
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                let out = read_pipe(child.stdout.take());
                return out.lines().next().unwrap_or("unknown").trim().to_string();
            }
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return "unknown".to_string();
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(20)),
            Err(_) => return "unknown".to_string(),
        }
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_reports_identity() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "health"
        }));
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["status"], "healthy");
        assert_eq!(response["result"]["server"], SERVER_NAME);
    }

    #[test]
    fn wrong_jsonrpc_version_is_invalid_request() {
        let response = handle_request(&json!({ "id": 1, "method": "health" }));
        assert_eq!(response["error"]["code"], -32600);

        let response = handle_request(&json!({
            "jsonrpc": "1.0", "id": 1, "method": "health"
        }));
        assert_eq!(response["error"]["code"], -32600);
    }

    #[test]
    fn missing_method_is_invalid_request() {
        let response = handle_request(&json!({ "jsonrpc": "2.0", "id": 2 }));
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["error"]["message"], "Missing method");
    }

    #[test]
    fn unknown_method_is_not_found() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 3, "method": "reboot"
        }));
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn execute_without_tool_param_is_invalid_params() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 4, "method": "execute", "params": {}
        }));
        assert_eq!(response["error"]["code"], -32602);
    }

    #[test]
    fn execute_with_non_list_args_is_invalid_params() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 5, "method": "execute",
            "params": { "tool": "shellcheck", "args": "not-a-list" }
        }));
        assert_eq!(response["error"]["code"], -32602);
    }

    #[test]
    fn tools_outside_the_allow_list_are_rejected() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 6, "method": "execute",
            "params": { "tool": "rm", "args": ["-rf", "/"] }
        }));
        assert_eq!(response["error"]["code"], -32601);
        assert!(
            response["error"]["message"]
                .as_str()
                .expect("message")
                .contains("Unsupported tool")
        );
    }

    #[test]
    fn list_tools_covers_the_allow_list() {
        let response = handle_request(&json!({
            "jsonrpc": "2.0", "id": 7, "method": "list_tools"
        }));
        let tools = response["result"]["tools"].as_array().expect("tools");
        assert_eq!(tools.len(), 3);
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().expect("name"))
            .collect();
        assert_eq!(names, vec!["shellcheck", "hadolint", "yamllint"]);
        for tool in tools {
            assert!(tool["path"].as_str().expect("path").starts_with('/'));
            assert!(tool["available"].is_boolean());
        }
    }

    #[test]
    fn request_id_echoes_strings_and_null() {
        for id in [json!("abc"), json!(null), json!(42)] {
            let response = handle_request(&json!({
                "jsonrpc": "2.0", "id": id, "method": "health"
            }));
            assert_eq!(response["id"], id);
        }
    }

    #[test]
    fn connection_round_trip_speaks_half_close() {
        let (client, server) = UnixStream::pair().expect("socketpair");

        let handle = std::thread::spawn(move || handle_connection(server));

        let mut client = client;
        let request = json!({ "jsonrpc": "2.0", "id": 9, "method": "health" });
        client
            .write_all(&serde_json::to_vec(&request).expect("encode"))
            .expect("write");
        client
            .shutdown(std::net::Shutdown::Write)
            .expect("half-close");

        let mut data = Vec::new();
        client.read_to_end(&mut data).expect("read");
        handle.join().expect("join").expect("handler");

        let response: Value = serde_json::from_slice(&data).expect("parse");
        assert_eq!(response["id"], 9);
        assert_eq!(response["result"]["status"], "healthy");
    }

    #[test]
    fn malformed_request_bytes_yield_parse_error() {
        let (client, server) = UnixStream::pair().expect("socketpair");
        let handle = std::thread::spawn(move || handle_connection(server));

        let mut client = client;
        client.write_all(b"{nope").expect("write");
        client
            .shutdown(std::net::Shutdown::Write)
            .expect("half-close");

        let mut data = Vec::new();
        client.read_to_end(&mut data).expect("read");
        handle.join().expect("join").expect("handler");

        let response: Value = serde_json::from_slice(&data).expect("parse");
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }
}
