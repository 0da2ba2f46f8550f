//! Newline-delimited JSON-RPC 2.0 messages spoken with the database-admin server.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const INITIALIZE_ID: u64 = 1;
pub const APPLY_ID: u64 = 2;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn call(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params: Some(params),
        }
    }

    pub fn notification(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        }
    }

    /// One protocol line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }
}

/// Parse one line from the server. Blank lines and non-JSON chatter yield `None`.
pub fn parse_line(line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version },
    })
}

pub fn apply_migration_params(name: &str, query: &str) -> Value {
    json!({
        "name": "apply_migration",
        "arguments": { "name": name, "query": query },
    })
}

/// Text of a tool result flagged with `isError`, if any.
pub fn tool_error(result: &Value) -> Option<String> {
    if !result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| result.to_string());
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shape() {
        let line = Request::call(1, "initialize", initialize_params("m", "1.0.0"))
            .to_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        let v: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], 1);
        assert_eq!(v["params"]["protocolVersion"], PROTOCOL_VERSION);

        let note = Request::notification("notifications/initialized").to_line().unwrap();
        let v: Value = serde_json::from_str(note.trim()).unwrap();
        assert!(v.get("id").is_none());
        assert!(v.get("params").is_none());
    }

    #[test]
    fn ignores_non_json_lines() {
        assert!(parse_line("Starting server...").is_none());
        assert!(parse_line("   ").is_none());
        let r = parse_line(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"bad"}}"#)
            .unwrap();
        assert_eq!(r.id(), Some(2));
        assert_eq!(r.error.unwrap().message, "bad");
    }

    #[test]
    fn tool_error_collects_text() {
        let ok = json!({"content": [{"type": "text", "text": "done"}]});
        assert_eq!(tool_error(&ok), None);
        let bad = json!({"isError": true, "content": [{"type": "text", "text": "syntax error"}]});
        assert_eq!(tool_error(&bad).as_deref(), Some("syntax error"));
    }
}
