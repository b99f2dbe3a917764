//! Concrete [`Tool`] implementations needed to exercise the loop
//! end-to-end.
//!
//! Wraps the free functions in [`crate::file_ops`] and [`crate::exec`] —
//! unchanged — behind the [`Tool`] trait so they can be registered.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::exec::{self, ExecRequest};
use crate::process::{self, ProcessRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};
use crate::manager::ProcessManager;
use crate::registry::{Tool, ToolContext};

fn to_string_result(r: Result<Value, String>) -> String {
    match r {
        Ok(v) => serde_json::to_string(&v).unwrap_or_else(|_| v.to_string()),
        Err(e) => format!("Error: {e}"),
    }
}

fn arg_err(name: &str, err: serde_json::Error) -> String {
    format!("Error: invalid arguments for '{name}': {err}")
}

pub struct ReadFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read a text file from the workspace, optionally a line range."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"}
            },
            "required": ["path"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileReadRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_read(&self.workspace_root, req).await)
    }
}

pub struct WriteFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write (overwrite) a text file in the workspace."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileWriteRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_write(&self.workspace_root, req).await)
    }
}

pub struct AppendFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "append_file"
    }
    fn description(&self) -> &str {
        "Append text to a file in the workspace, creating it if absent."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}, "content": {"type": "string"}},
            "required": ["path", "content"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileAppendRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_append(&self.workspace_root, req).await)
    }
}

pub struct MoveFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }
    fn description(&self) -> &str {
        "Move or rename a file within the workspace."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"source": {"type": "string"}, "destination": {"type": "string"}},
            "required": ["source", "destination"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileMoveRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_move(&self.workspace_root, req).await)
    }
}

pub struct DeleteFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }
    fn description(&self) -> &str {
        "Delete a file within the workspace."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileDeleteRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_delete(&self.workspace_root, req).await)
    }
}

pub struct ListFilesTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }
    fn description(&self) -> &str {
        "List files and directories under a workspace path."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: FileListRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        to_string_result(file_ops::file_list(&self.workspace_root, req).await)
    }
}

/// Shell exec tool. Defaults to a 60s timeout; a timed-out or failed
/// command is surfaced as a tool failure rather than a loop failure.
///
/// Commands are checked against `denied_commands` (compiled from
/// `tools.exec_security.denied_patterns`) before they ever reach the
/// process manager; a match is rejected as a tool failure, never executed.
pub struct ExecTool {
    pub manager: Arc<ProcessManager>,
    pub denied_commands: Arc<regex::RegexSet>,
    pub audit_log: bool,
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }
    fn description(&self) -> &str {
        "Run a shell command. Runs in the foreground up to yield_ms, then \
         automatically backgrounds; poll long-running commands with the \
         process tool."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "background": {"type": "boolean"},
                "yield_ms": {"type": "integer"},
                "timeout_sec": {"type": "integer"},
                "workdir": {"type": "string"}
            },
            "required": ["command"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: ExecRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        if self.denied_commands.is_match(&req.command) {
            tracing::warn!(command = %req.command, "exec blocked by denied_patterns");
            return "Error: command blocked by security policy".to_string();
        }
        if self.audit_log {
            tracing::info!(command = %req.command, background = req.background, "exec invoked");
        }
        let resp = exec::exec(&self.manager, req).await;
        serde_json::to_string(&resp).unwrap_or_else(|_| "Error: exec response not serializable".into())
    }
}

/// Companion to [`ExecTool`]: poll/log/write/kill background sessions it
/// created.
pub struct ProcessTool {
    pub manager: Arc<ProcessManager>,
}

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        "process"
    }
    fn description(&self) -> &str {
        "Manage background processes started by exec: list, poll, log, \
         write to stdin, kill, clear, or remove a session."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["list", "poll", "log", "write", "kill", "clear", "remove"]},
                "session_id": {"type": "string"},
                "offset": {"type": "integer"},
                "limit": {"type": "integer"},
                "tail_lines": {"type": "integer"},
                "data": {"type": "string"},
                "eof": {"type": "boolean"}
            },
            "required": ["action"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let req: ProcessRequest = match serde_json::from_value(args) {
            Ok(r) => r,
            Err(e) => return arg_err(self.name(), e),
        };
        let resp = process::handle_process(&self.manager, req).await;
        serde_json::to_string(&resp).unwrap_or_else(|_| "Error: process response not serializable".into())
    }
}

/// `web_fetch` — retrieve a URL and return its body as text, truncated.
/// The worked tool standing in for "HTTP search/fetch".
pub struct WebFetchTool {
    pub client: reqwest::Client,
    pub max_response_chars: usize,
}

impl WebFetchTool {
    pub fn new(max_response_chars: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            max_response_chars,
        }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }
    fn description(&self) -> &str {
        "Fetch a URL over HTTP(S) and return the response body as text."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"]
        })
    }
    async fn execute(&self, _ctx: &ToolContext, args: Value) -> String {
        let Some(url) = args.get("url").and_then(Value::as_str) else {
            return "Error: 'url' argument is required".to_string();
        };
        match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => {
                        let total_chars = body.chars().count();
                        if total_chars > self.max_response_chars {
                            let head: String = body.chars().take(self.max_response_chars).collect();
                            format!(
                                "[HTTP {status}] {head}...\n[truncated — showed {} of {} chars]",
                                self.max_response_chars, total_chars
                            )
                        } else {
                            format!("[HTTP {status}] {body}")
                        }
                    }
                    Err(e) => format!("Error: reading response body: {e}"),
                }
            }
            Err(e) => format!("Error: fetching '{url}': {e}"),
        }
    }
}
