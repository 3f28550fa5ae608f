//! MCP client over a child process's stdio.
//!
//! A background task reads newline-delimited JSON-RPC replies and routes each
//! one to the caller waiting on its id, so several `tools/call` requests can
//! be in flight at once.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{McpError, Result};
use crate::params::ServerParams;
use crate::types::*;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callers waiting for a reply, keyed by request id
#[derive(Default)]
struct PendingTable {
    waiters: HashMap<i64, oneshot::Sender<JsonRpcResponse>>,
    closed: bool,
}

impl PendingTable {
    fn close(&mut self) {
        self.closed = true;
        // dropping the senders wakes every waiter with a RecvError
        self.waiters.clear();
    }
}

/// A live session with one tool provider.
///
/// Owns the provider process; `close` (or dropping the client) terminates it.
pub struct McpClient {
    writer: Mutex<BoxedWriter>,
    pending: Arc<Mutex<PendingTable>>,
    next_id: AtomicI64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
    server_info: Option<ServerInfo>,
}

impl McpClient {
    /// Launch the provider described by `params` and complete the handshake
    /// within `handshake_timeout`.
    pub async fn open(params: &ServerParams, handshake_timeout: Duration) -> Result<Self> {
        params.check_available()?;

        info!(command = %params.command, "◆ LAUNCHING TOOL PROVIDER");

        let mut child = params.build_command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                McpError::ProviderUnavailable(params.command.clone().into())
            } else {
                McpError::Io(e)
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Communication("provider stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Communication("provider stdout not captured".to_string()))?;
        let stderr = child.stderr.take();

        let client = Self::from_parts(BufReader::new(stdout), stdin, Some(child));

        if let Some(stderr) = stderr {
            client.tasks.lock().await.push(tokio::spawn(drain_stderr(stderr)));
        }

        client.handshake(handshake_timeout).await
    }

    /// Run the handshake over an existing stream pair.
    pub async fn connect<R, W>(reader: R, writer: W, handshake_timeout: Duration) -> Result<Self>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(reader, writer, None)
            .handshake(handshake_timeout)
            .await
    }

    fn from_parts<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(PendingTable::default()));
        let reader_task = tokio::spawn(read_loop(reader, Arc::clone(&pending)));

        Self {
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicI64::new(1),
            tasks: Mutex::new(vec![reader_task]),
            child: Mutex::new(child),
            closed: AtomicBool::new(false),
            server_info: None,
        }
    }

    async fn handshake(mut self, handshake_timeout: Duration) -> Result<Self> {
        let outcome = tokio::time::timeout(handshake_timeout, self.initialize()).await;
        match outcome {
            Ok(Ok(())) => Ok(self),
            Ok(Err(e)) => {
                warn!("◆ TOOL PROVIDER HANDSHAKE FAILED: {}", e);
                self.close().await;
                Err(e)
            }
            Err(_) => {
                warn!("◆ TOOL PROVIDER HANDSHAKE TIMED OUT AFTER {:?}", handshake_timeout);
                self.close().await;
                Err(McpError::StartupTimeout(handshake_timeout))
            }
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "catalyst-assist".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("malformed initialize result: {}", e)))?;

        self.notify("notifications/initialized", None).await?;

        info!(
            server = ?result.server_info.as_ref().map(|s| s.name.as_str()),
            protocol = %result.protocol_version,
            "◆ TOOL PROVIDER READY"
        );
        self.server_info = result.server_info;
        Ok(())
    }

    /// Identity the provider reported during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Fetch every tool the provider exposes, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("malformed tools/list result: {}", e)))?;

            for tool in &page.tools {
                debug!(name = %tool.name, "◆ DISCOVERED TOOL");
            }
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        info!(count = tools.len(), "◆ TOOL DISCOVERY COMPLETE");
        Ok(tools)
    }

    /// Invoke one tool and wait for its result.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .request("tools/call", Some(serde_json::to_value(params)?))
            .await?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("malformed tools/call result: {}", e)))
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut table = self.pending.lock().await;
            if table.closed {
                return Err(McpError::Communication(format!(
                    "cannot send {}: session closed",
                    method
                )));
            }
            table.waiters.insert(id, tx);
        }

        let request = JsonRpcRequest::new(RpcId::Number(id), method, params);
        let line = serde_json::to_string(&request)?;
        trace!(id, method, "◆ MCP REQUEST: {}", line);

        if let Err(e) = self.send_line(&line).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| {
            McpError::Communication(format!("provider closed before answering {}", method))
        })?;

        if let Some(err) = response.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::Protocol(format!("{} response has no result", method)))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        trace!(method, "◆ MCP NOTIFICATION: {}", line);
        self.send_line(&line).await
    }

    async fn send_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        write
            .await
            .map_err(|e| McpError::Communication(format!("write failed: {}", e)))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Terminate the provider and fail any pending calls. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.pending.lock().await.close();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("◆ TOOL PROVIDER ALREADY GONE: {}", e);
            }
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let _ = self.writer.lock().await.shutdown().await;

        info!("◆ TOOL PROVIDER SESSION CLOSED");
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        // the child itself is reaped by kill_on_drop
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn read_loop<R>(mut reader: R, pending: Arc<Mutex<PendingTable>>)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("◆ TOOL PROVIDER CLOSED ITS OUTPUT");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("◆ TOOL PROVIDER READ FAILED: {}", e);
                break;
            }
        }

        // undecodable bytes never form valid JSON, so the line is skipped below
        let line = String::from_utf8_lossy(&buf);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        trace!("◆ MCP INCOMING: {}", trimmed);

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                debug!("◆ IGNORING NON-JSON OUTPUT: {}", trimmed);
                continue;
            }
        };

        if let Some(method) = value.get("method").and_then(Value::as_str) {
            debug!(method, "◆ IGNORING SERVER MESSAGE");
            continue;
        }

        let response: JsonRpcResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!("◆ MALFORMED RESPONSE FROM TOOL PROVIDER: {}", e);
                continue;
            }
        };

        let id = match &response.id {
            RpcId::Number(n) => *n,
            RpcId::String(s) => match s.parse::<i64>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(id = %s, "◆ RESPONSE WITH UNKNOWN ID");
                    continue;
                }
            },
        };

        let waiter = pending.lock().await.waiters.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(id, "◆ UNSOLICITED RESPONSE"),
        }
    }

    pending.lock().await.close();
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "catalyst_mcp::provider", "{}", line);
    }
}
