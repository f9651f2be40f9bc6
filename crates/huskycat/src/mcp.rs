//! JSON-RPC tool server for AI-assistant clients.
//!
//! Newline-delimited JSON-RPC 2.0 on stdin/stdout: exactly one request
//! object per line, exactly one response object per line. The first message
//! must be `initialize`; after that the client drives `tools/list`,
//! `resources/list`, `prompts/list`, and `tools/call`.
//!
//! A misbehaving tool never crashes the server: handler failures are
//! wrapped into a result carrying `isError`, and only protocol-level
//! problems (unknown method, bad params, malformed JSON) map to JSON-RPC
//! error codes.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use crate::adapter::McpAdapter;
use crate::engine::{Engine, gather_files};
use crate::output::render_json;
use crate::runstore::HISTORY_LIMIT_MAX;
use crate::tasks::{TaskStatus, TaskTable};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "huskycat";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Tools a single `validate_<tool>` shortcut exists for.
const SHORTCUT_TOOLS: [&str; 6] = [
    "black",
    "flake8",
    "mypy",
    "yamllint",
    "hadolint",
    "shellcheck",
];

pub struct McpServer {
    engine: Arc<Engine>,
    tasks: TaskTable,
    adapter: McpAdapter,
}

impl McpServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tasks: TaskTable::new(),
            adapter: McpAdapter::new(),
        }
    }

    /// Serve until the reader closes. One request per line, one response
    /// per line; notifications produce no output.
    pub fn serve(&self, reader: impl BufRead, mut writer: impl Write) -> Result<()> {
        for line in reader.lines() {
            let line = line.context("failed to read request frame")?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_frame(&line) {
                serde_json::to_writer(&mut writer, &response)
                    .context("failed to write response frame")?;
                writer.write_all(b"\n").context("failed to write frame delimiter")?;
                writer.flush().ok();
            }
        }
        Ok(())
    }

    /// Handle one raw frame. `None` means a notification with no reply.
    pub fn handle_frame(&self, line: &str) -> Option<Value> {
        let request: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => return Some(error_response(Value::Null, PARSE_ERROR, "Parse error")),
        };

        // The response id echoes the request id, whatever its type.
        let id = request.get("id").cloned();
        let method = request.get("method").and_then(Value::as_str);

        let Some(method) = method else {
            return Some(error_response(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Missing method",
            ));
        };

        // Notifications carry no id and get no response.
        let id = match id {
            Some(id) => id,
            None => return None,
        };

        let params = request.get("params").cloned().unwrap_or(Value::Null);
        match self.dispatch_method(method, &params) {
            Ok(result) => Some(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
            Err(rpc_err) => Some(error_response(id, rpc_err.code, &rpc_err.message)),
        }
    }

    fn dispatch_method(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "tools/list" => Ok(json!({ "tools": tool_descriptors() })),
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "tools/call" => self.handle_tool_call(params),
            other => Err(RpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {other}"),
            }),
        }
    }

    fn handle_tool_call(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing 'name'"))?;
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let outcome = self.call_tool(name, &args);
        Ok(match outcome {
            Ok(payload) => tool_result(&payload, false),
            // Tool-level failures stay inside the result so one misbehaving
            // tool cannot take the server down.
            Err(ToolError::Params(message)) => {
                return Err(RpcError::invalid_params(&message));
            }
            Err(ToolError::Execution(message)) => tool_result(&json!({ "error": message }), true),
        })
    }

    fn call_tool(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        match name {
            "validate" => {
                let path = required_str(args, "path")?;
                let fix = args.get("fix").and_then(Value::as_bool).unwrap_or(false);
                self.validate_paths(&resolve_path_files(Path::new(path))?, fix)
            }
            "batch_validate" => {
                let files = args
                    .get("files")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ToolError::Params("missing 'files'".to_string()))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect::<Vec<_>>();
                let fix = args.get("fix").and_then(Value::as_bool).unwrap_or(false);
                self.validate_paths(&files, fix)
            }
            "validate_project" => {
                let path = required_str(args, "path")?;
                let files = gather_files(Path::new(path))
                    .map_err(|e| ToolError::Execution(format!("{e:#}")))?;
                self.validate_paths(&files, false)
            }
            "validate_async" => {
                let path = required_str(args, "path")?.to_string();
                let fix = args.get("fix").and_then(Value::as_bool).unwrap_or(false);
                let engine = Arc::clone(&self.engine);

                let task_id = self.tasks.spawn(&path.clone(), move |cancel| {
                    let files = resolve_path_files(Path::new(&path))
                        .map_err(|e| anyhow!("{}", e.message()))?;
                    let adapter = McpAdapter::new();
                    let outcome = engine.run_validation_cancellable(
                        &files,
                        &adapter,
                        fix,
                        None,
                        Some(cancel),
                    )?;
                    Ok(serde_json::from_str(&render_json(
                        &outcome.results_by_file,
                        &outcome.summary,
                    ))?)
                });

                Ok(json!({ "task_id": task_id }))
            }
            "get_task_status" => {
                let task_id = required_str(args, "task_id")?;
                match self.tasks.get(task_id) {
                    Some(snapshot) => Ok(serde_json::to_value(snapshot)
                        .map_err(|e| ToolError::Execution(e.to_string()))?),
                    None => Err(ToolError::Execution(format!("task not found: {task_id}"))),
                }
            }
            "list_async_tasks" => {
                let status = match args.get("status").and_then(Value::as_str) {
                    Some("running") => Some(TaskStatus::Running),
                    Some("completed") => Some(TaskStatus::Completed),
                    Some("failed") => Some(TaskStatus::Failed),
                    Some("cancelled") => Some(TaskStatus::Cancelled),
                    Some(other) => {
                        return Err(ToolError::Params(format!("unknown status: {other}")));
                    }
                    None => None,
                };
                Ok(json!({ "tasks": self.tasks.list(status) }))
            }
            "cancel_async_task" => {
                let task_id = required_str(args, "task_id")?;
                if self.tasks.cancel(task_id) {
                    Ok(json!({ "cancelled": task_id }))
                } else {
                    Err(ToolError::Execution(format!("task not found: {task_id}")))
                }
            }
            "get_last_run" => {
                let run = self
                    .engine
                    .manager()
                    .store()
                    .last_run()
                    .map_err(|e| ToolError::Execution(format!("{e:#}")))?;
                Ok(match run {
                    Some(run) => serde_json::to_value(run)
                        .map_err(|e| ToolError::Execution(e.to_string()))?,
                    None => json!({}),
                })
            }
            "get_run_history" => {
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .unwrap_or(HISTORY_LIMIT_MAX as u64) as usize;
                let runs = self
                    .engine
                    .manager()
                    .store()
                    .history(limit)
                    .map_err(|e| ToolError::Execution(format!("{e:#}")))?;
                Ok(json!({ "runs": runs }))
            }
            "get_run_results" => {
                let run_id = required_str(args, "run_id")?;
                match self
                    .engine
                    .manager()
                    .store()
                    .load_run(run_id)
                    .map_err(|e| ToolError::Execution(format!("{e:#}")))?
                {
                    Some(run) => Ok(serde_json::to_value(run)
                        .map_err(|e| ToolError::Execution(e.to_string()))?),
                    None => Err(ToolError::Execution(format!("run not found: {run_id}"))),
                }
            }
            "get_running_validations" => {
                let running = self
                    .engine
                    .manager()
                    .store()
                    .running_validations()
                    .map_err(|e| ToolError::Execution(format!("{e:#}")))?;
                Ok(json!({ "running": running }))
            }
            shortcut if shortcut.starts_with("validate_") => {
                let tool = &shortcut["validate_".len()..];
                if !SHORTCUT_TOOLS.contains(&tool) {
                    return Err(ToolError::Execution(format!("unknown tool: {shortcut}")));
                }
                let path = required_str(args, "path")?;
                let files = resolve_path_files(Path::new(path))?;
                let result = self.engine.dispatcher().run_tool(tool, &files, false);
                serde_json::to_value(result).map_err(|e| ToolError::Execution(e.to_string()))
            }
            other => Err(ToolError::Execution(format!("unknown tool: {other}"))),
        }
    }

    fn validate_paths(&self, files: &[PathBuf], fix: bool) -> Result<Value, ToolError> {
        let outcome = self
            .engine
            .run_validation(files, &self.adapter, fix, None)
            .map_err(|e| ToolError::Execution(format!("{e:#}")))?;
        serde_json::from_str(&render_json(&outcome.results_by_file, &outcome.summary))
            .map_err(|e| ToolError::Execution(e.to_string()))
    }
}

struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_params(message: &str) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: format!("Invalid params: {message}"),
        }
    }
}

enum ToolError {
    /// Missing or malformed arguments: surfaces as JSON-RPC -32602.
    Params(String),
    /// Everything else: wrapped into an `isError` result.
    Execution(String),
}

impl ToolError {
    fn message(&self) -> &str {
        match self {
            ToolError::Params(m) | ToolError::Execution(m) => m,
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::Params(format!("missing '{key}'")))
}

fn resolve_path_files(path: &Path) -> Result<Vec<PathBuf>, ToolError> {
    if path.is_dir() {
        gather_files(path).map_err(|e| ToolError::Execution(format!("{e:#}")))
    } else if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(ToolError::Execution(format!(
            "path does not exist: {}",
            path.display()
        )))
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

fn tool_result(payload: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
    let mut result = json!({ "content": [{ "type": "text", "text": text }] });
    if is_error {
        result["isError"] = json!(true);
    }
    result
}

fn tool_descriptors() -> Vec<Value> {
    let path_schema = json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "File or directory to validate" },
            "fix": { "type": "boolean", "description": "Apply safe auto-fixes" }
        },
        "required": ["path"]
    });
    let task_schema = json!({
        "type": "object",
        "properties": { "task_id": { "type": "string" } },
        "required": ["task_id"]
    });

    let mut tools = vec![
        json!({
            "name": "validate",
            "description": "Validate a file or directory with every applicable tool. \
                Runs formatters, linters, and config checkers in dependency order and \
                returns aggregated per-file findings.",
            "inputSchema": path_schema,
        }),
        json!({
            "name": "batch_validate",
            "description": "Validate an explicit list of files and aggregate the results.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "files": { "type": "array", "items": { "type": "string" } },
                    "fix": { "type": "boolean" }
                },
                "required": ["files"]
            },
        }),
        json!({
            "name": "validate_project",
            "description": "Walk a directory tree and validate everything in it.",
            "inputSchema": {
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            },
        }),
        json!({
            "name": "validate_async",
            "description": "Start a background validation task and return its task id. \
                Poll with get_task_status; results match what a synchronous \
                validate_project would have produced.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "fix": { "type": "boolean" }
                },
                "required": ["path"]
            },
        }),
        json!({
            "name": "get_task_status",
            "description": "Status and, once finished, results of an async validation task.",
            "inputSchema": task_schema,
        }),
        json!({
            "name": "list_async_tasks",
            "description": "Summaries of async validation tasks, optionally filtered by status.",
            "inputSchema": {
                "type": "object",
                "properties": { "status": { "type": "string" } }
            },
        }),
        json!({
            "name": "cancel_async_task",
            "description": "Cancel a running async validation task.",
            "inputSchema": {
                "type": "object",
                "properties": { "task_id": { "type": "string" } },
                "required": ["task_id"]
            },
        }),
        json!({
            "name": "get_last_run",
            "description": "The most recent validation run record, or an empty object.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
        json!({
            "name": "get_run_history",
            "description": "Validation run records, newest first. Limit 1-100.",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer", "minimum": 1, "maximum": 100 } }
            },
        }),
        json!({
            "name": "get_run_results",
            "description": "The full record of one validation run by run id.",
            "inputSchema": {
                "type": "object",
                "properties": { "run_id": { "type": "string" } },
                "required": ["run_id"]
            },
        }),
        json!({
            "name": "get_running_validations",
            "description": "Live background validation runs, liveness-checked.",
            "inputSchema": { "type": "object", "properties": {} },
        }),
    ];

    for tool in SHORTCUT_TOOLS {
        tools.push(json!({
            "name": format!("validate_{tool}"),
            "description": format!("Validate a file or directory with {tool} only."),
            "inputSchema": {
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            },
        }));
    }

    tools
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::config::Config;
    use crate::dispatch::Dispatcher;
    use crate::manager::ProcessManager;
    use crate::registry::ToolRegistry;
    use crate::runstore::RunStore;

    fn server_in(td: &tempfile::TempDir) -> McpServer {
        let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::builtin(), Config::default()));
        let store = RunStore::new(td.path().join("runs"));
        McpServer::new(Arc::new(Engine::new(dispatcher, ProcessManager::new(store))))
    }

    fn call(server: &McpServer, frame: Value) -> Value {
        server
            .handle_frame(&frame.to_string())
            .expect("expected a response")
    }

    fn call_tool(server: &McpServer, name: &str, arguments: Value) -> Value {
        call(
            server,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": name, "arguments": arguments }
            }),
        )
    }

    /// Unpack the text payload of a tools/call result.
    fn tool_payload(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        serde_json::from_str(text).expect("payload JSON")
    }

    #[test]
    fn initialize_returns_identity_and_capabilities() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = call(
            &server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": { "protocolVersion": PROTOCOL_VERSION } }),
        );
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(response["result"]["capabilities"]["tools"].is_object());
    }

    #[test]
    fn request_ids_echo_unchanged_for_every_type() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        for id in [json!(7), json!("abc"), json!(null)] {
            let response = call(
                &server,
                json!({ "jsonrpc": "2.0", "id": id, "method": "tools/list" }),
            );
            assert_eq!(response["id"], id);
        }
    }

    #[test]
    fn tools_list_includes_sync_async_and_history_tools() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = call(
            &server,
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        );
        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .map(|t| t["name"].as_str().expect("name"))
            .collect();

        for expected in [
            "validate",
            "batch_validate",
            "validate_project",
            "validate_async",
            "get_task_status",
            "list_async_tasks",
            "cancel_async_task",
            "get_last_run",
            "get_run_history",
            "get_run_results",
            "get_running_validations",
            "validate_black",
            "validate_shellcheck",
            "validate_yamllint",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn unknown_method_maps_to_32601() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = call(
            &server,
            json!({ "jsonrpc": "2.0", "id": 3, "method": "bogus/method" }),
        );
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn malformed_json_maps_to_32700_with_null_id() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = server.handle_frame("{not json").expect("response");
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }

    #[test]
    fn missing_required_param_maps_to_32602() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = call_tool(&server, "validate", json!({}));
        assert_eq!(response["error"]["code"], -32602);
        assert!(
            response["error"]["message"]
                .as_str()
                .expect("message")
                .contains("path")
        );
    }

    #[test]
    fn notifications_get_no_response() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let frame = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(server.handle_frame(&frame.to_string()).is_none());
    }

    #[test]
    fn validate_runs_tools_and_returns_results() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let file = td.path().join("app.yaml");
        fs::write(&file, "name: demo\n").expect("write");

        let response = call_tool(
            &server,
            "validate",
            json!({ "path": file.display().to_string() }),
        );
        let payload = tool_payload(&response);
        assert_eq!(payload["summary"]["errors"], 0);
        assert!(payload["results"].is_object());
    }

    #[test]
    fn nonexistent_path_is_an_is_error_result_not_a_crash() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let response = call_tool(&server, "validate", json!({ "path": "/no/such/path" }));
        assert_eq!(response["result"]["isError"], true);
        let payload = tool_payload(&response);
        assert!(
            payload["error"]
                .as_str()
                .expect("error")
                .contains("does not exist")
        );
    }

    #[test]
    fn async_round_trip_matches_sync_results() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let dir = td.path().join("proj");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("a.yaml"), "a: 1\n").expect("write");
        fs::write(dir.join("b.yaml"), "b: 2\n").expect("write");

        let start = call_tool(
            &server,
            "validate_async",
            json!({ "path": dir.display().to_string() }),
        );
        let task_id = tool_payload(&start)["task_id"]
            .as_str()
            .expect("task id")
            .to_string();
        assert_eq!(task_id, "T1");

        // Poll until terminal.
        let mut status = Value::Null;
        for _ in 0..100 {
            let response = call_tool(&server, "get_task_status", json!({ "task_id": task_id }));
            status = tool_payload(&response);
            if status["status"] != "running" {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(status["status"], "completed", "{status}");

        let sync = call_tool(
            &server,
            "validate_project",
            json!({ "path": dir.display().to_string() }),
        );
        let sync_payload = tool_payload(&sync);
        assert_eq!(
            status["result"]["summary"]["errors"],
            sync_payload["summary"]["errors"]
        );
        assert_eq!(
            status["result"]["summary"]["total_files"],
            sync_payload["summary"]["total_files"]
        );
    }

    #[test]
    fn task_listing_and_cancel_acknowledge() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let dir = td.path().join("proj");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("a.yaml"), "a: 1\n").expect("write");

        let start = call_tool(
            &server,
            "validate_async",
            json!({ "path": dir.display().to_string() }),
        );
        let task_id = tool_payload(&start)["task_id"].as_str().expect("id").to_string();

        let listed = call_tool(&server, "list_async_tasks", json!({}));
        assert_eq!(tool_payload(&listed)["tasks"].as_array().expect("tasks").len(), 1);

        let cancelled = call_tool(&server, "cancel_async_task", json!({ "task_id": task_id }));
        assert_eq!(tool_payload(&cancelled)["cancelled"], task_id);

        let missing = call_tool(&server, "cancel_async_task", json!({ "task_id": "T99" }));
        assert_eq!(missing["result"]["isError"], true);
    }

    #[test]
    fn history_tools_read_the_run_store() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        // Empty store: last run is an empty object.
        let empty = call_tool(&server, "get_last_run", json!({}));
        assert_eq!(tool_payload(&empty), json!({}));

        // Populate via a real validation.
        let file = td.path().join("app.yaml");
        fs::write(&file, "name: demo\n").expect("write");
        call_tool(&server, "validate", json!({ "path": file.display().to_string() }));

        let last = tool_payload(&call_tool(&server, "get_last_run", json!({})));
        let run_id = last["run_id"].as_str().expect("run id").to_string();
        assert_eq!(last["success"], true);

        let history = tool_payload(&call_tool(&server, "get_run_history", json!({ "limit": 10 })));
        assert_eq!(history["runs"].as_array().expect("runs").len(), 1);

        let by_id = tool_payload(&call_tool(&server, "get_run_results", json!({ "run_id": run_id })));
        assert_eq!(by_id["run_id"], last["run_id"]);

        let missing = call_tool(&server, "get_run_results", json!({ "run_id": "nope" }));
        assert_eq!(missing["result"]["isError"], true);

        let running = tool_payload(&call_tool(&server, "get_running_validations", json!({})));
        assert_eq!(running["running"].as_array().expect("running").len(), 0);
    }

    #[test]
    fn serve_speaks_line_delimited_frames() {
        let td = tempdir().expect("tempdir");
        let server = server_in(&td);

        let input = format!(
            "{}\n{}\n",
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize",
                    "params": { "protocolVersion": PROTOCOL_VERSION } }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
        );
        let mut output = Vec::new();
        server
            .serve(std::io::BufReader::new(input.as_bytes()), &mut output)
            .expect("serve");

        let lines: Vec<&str> = std::str::from_utf8(&output)
            .expect("utf8")
            .lines()
            .collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let value: Value = serde_json::from_str(line).expect("each line is one JSON object");
            assert_eq!(value["jsonrpc"], "2.0");
        }
    }
}
