//! In-process tool provider for tests.
//!
//! Serves the MCP handshake, `tools/list` and `tools/call` over a
//! `tokio::io::duplex` pipe so clients can be exercised without a child
//! process.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::client::McpClient;
use crate::error::Result;
use crate::types::{CallToolResult, ToolInfo};

type Handler = Arc<dyn Fn(&Value) -> CallToolResult + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Reply(Handler),
    Raw(Value),
    HangUp,
}

#[derive(Clone)]
struct FakeTool {
    info: ToolInfo,
    behavior: Behavior,
    delay: Option<Duration>,
}

/// Scriptable tool provider
#[derive(Clone, Default)]
pub struct FakeToolServer {
    tools: Vec<FakeTool>,
    calls: Arc<std::sync::Mutex<Vec<(String, Value)>>>,
    silent: bool,
}

impl FakeToolServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tool answered by `handler`
    pub fn tool<F>(mut self, name: &str, description: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> CallToolResult + Send + Sync + 'static,
    {
        self.tools.push(FakeTool {
            info: info(name, description),
            behavior: Behavior::Reply(Arc::new(handler)),
            delay: None,
        });
        self
    }

    /// A tool whose `result` member is sent verbatim
    pub fn raw_tool(mut self, name: &str, description: &str, result: Value) -> Self {
        self.tools.push(FakeTool {
            info: info(name, description),
            behavior: Behavior::Raw(result),
            delay: None,
        });
        self
    }

    /// A tool whose invocation makes the server hang up without answering
    pub fn hang_up_tool(mut self, name: &str, description: &str) -> Self {
        self.tools.push(FakeTool {
            info: info(name, description),
            behavior: Behavior::HangUp,
            delay: None,
        });
        self
    }

    /// Delay answers for `name`
    pub fn delay(mut self, name: &str, delay: Duration) -> Self {
        for tool in self.tools.iter_mut().filter(|t| t.info.name == name) {
            tool.delay = Some(delay);
        }
        self
    }

    /// Never answer `initialize`
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Every `tools/call` received so far, in arrival order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Start serving; returns the client side of the pipe
    pub fn serve(&self) -> (BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        tokio::spawn(self.clone().run(server_side));
        let (read, write) = tokio::io::split(client_side);
        (BufReader::new(read), write)
    }

    /// Start serving and complete the client handshake
    pub async fn connect(&self) -> Result<McpClient> {
        let (reader, writer) = self.serve();
        McpClient::connect(reader, writer, Duration::from_secs(5)).await
    }

    async fn run(self, stream: DuplexStream) {
        let (read, write) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(write));
        let tools: HashMap<String, FakeTool> = self
            .tools
            .iter()
            .map(|t| (t.info.name.clone(), t.clone()))
            .collect();
        let mut lines = BufReader::new(read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let Some(id) = request.get("id").cloned() else {
                continue;
            };
            let method = request["method"].as_str().unwrap_or_default();

            let reply = match method {
                "initialize" if self.silent => continue,
                "initialize" => json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "fake-inventory", "version": "0.0.1" }
                }),
                "tools/list" => {
                    let infos: Vec<&ToolInfo> = self.tools.iter().map(|t| &t.info).collect();
                    json!({ "tools": infos })
                }
                "tools/call" => {
                    let name = request["params"]["name"].as_str().unwrap_or_default();
                    let args = request["params"]["arguments"].clone();
                    if let Ok(mut calls) = self.calls.lock() {
                        calls.push((name.to_string(), args.clone()));
                    }

                    let Some(tool) = tools.get(name).cloned() else {
                        send(&writer, error_reply(&id, -32602, "Unknown tool")).await;
                        continue;
                    };

                    let result = match &tool.behavior {
                        Behavior::HangUp => return,
                        Behavior::Raw(value) => value.clone(),
                        Behavior::Reply(handler) => {
                            serde_json::to_value(handler(&args)).unwrap_or(Value::Null)
                        }
                    };

                    let writer = Arc::clone(&writer);
                    let response = json!({ "jsonrpc": "2.0", "id": id, "result": result });
                    tokio::spawn(async move {
                        if let Some(delay) = tool.delay {
                            tokio::time::sleep(delay).await;
                        }
                        send(&writer, response).await;
                    });
                    continue;
                }
                _ => {
                    send(&writer, error_reply(&id, -32601, "Method not found")).await;
                    continue;
                }
            };

            send(&writer, json!({ "jsonrpc": "2.0", "id": id, "result": reply })).await;
        }
    }
}

fn info(name: &str, description: &str) -> ToolInfo {
    ToolInfo {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}

fn error_reply(id: &Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

async fn send(writer: &Arc<Mutex<WriteHalf<DuplexStream>>>, message: Value) {
    let mut writer = writer.lock().await;
    let _ = writer.write_all(format!("{}\n", message).as_bytes()).await;
    let _ = writer.flush().await;
}
