//! Newline-delimited JSON tool protocol.
//!
//! One request per line, one response per line:
//!
//! ```text
//! {"id": 1, "tool": "search_documents", "arguments": {"query": "refund policy"}}
//! {"id": 1, "result": {...}}
//! {"type": "list_tools"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::KnowledgeServer;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Request {
    ListTools {
        #[serde(default)]
        id: Option<Value>,
        #[serde(rename = "type")]
        kind: ListToolsKind,
    },
    CallTool {
        #[serde(default)]
        id: Option<Value>,
        tool: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListToolsKind {
    ListTools,
}

impl Request {
    pub fn id(&self) -> Option<&Value> {
        match self {
            Request::ListTools { id, .. } | Request::CallTool { id, .. } => id.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: None,
            result: None,
            error: Some(message.into()),
        }
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = serde_json::to_vec(msg)?;
    buf.push(b'\n');
    Ok(buf)
}

pub async fn handle_line(server: &KnowledgeServer, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Response::error(format!("invalid request: {}", e)),
    };

    let id = request.id().cloned();
    match request {
        Request::ListTools { .. } => Response::result(id, server.list_tools()),
        Request::CallTool {
            tool,
            arguments,
            user_id,
            ..
        } => {
            let result = server
                .call_tool(&tool, arguments, user_id.as_deref())
                .await;
            Response::result(id, result)
        }
    }
}

/// Serve until `reader` reaches EOF. Requests are handled one at a time, in order.
pub async fn serve_lines<R, W>(
    server: &KnowledgeServer,
    reader: R,
    mut writer: W,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(server, &line).await;
        served += 1;

        if let Ok(encoded) = encode_message(&response) {
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
    }

    Ok(served)
}

/// Serve on stdin/stdout until EOF or Ctrl-C, then flush the event log.
pub async fn serve_stdio(server: &KnowledgeServer) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    server.log_server_start();
    let config = server.config_handle();
    let rotation = server
        .event_log()
        .spawn_rotation(move || config.snapshot().logging.rotate_days);
    tracing::info!("serving tools on stdio");

    let outcome = tokio::select! {
        result = serve_lines(server, stdin, stdout) => result.map(|served| {
            tracing::info!(served, "stdin closed");
        }),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            Ok(())
        }
    };

    if let Some(handle) = rotation {
        handle.abort();
    }
    server.event_log().shutdown().await;
    outcome
}
