//! HTTP JSON-RPC client for Tendermint-style nodes

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::{
    client::Client,
    error::ClientError,
    types::{Block, Tx},
};

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,

    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,

    #[serde(default)]
    data: Option<Value>,
}

/// Node client speaking JSON-RPC over HTTP
#[derive(Debug)]
pub struct HttpClient {
    remote: Url,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpClient {
    /// Create a new client for the given node address
    pub fn new(remote: &str) -> Result<Self, ClientError> {
        let remote =
            Url::parse(remote).map_err(|e| ClientError::InvalidRemote(format!("{remote}: {e}")))?;

        Ok(Self {
            remote,
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Node address this client talks to
    pub fn remote(&self) -> &Url {
        &self.remote
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Sending RPC request");

        let response: RpcResponse = self
            .http
            .post(self.remote.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        unwrap_response(response)
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn get_latest_block_number(&self) -> Result<u64, ClientError> {
        let status = self.call("status", json!({})).await?;
        parse_latest_height(&status)
    }

    async fn get_block_transactions(&self, height: u64) -> Result<Block, ClientError> {
        let result = self
            .call("block", json!({ "height": height.to_string() }))
            .await?;
        parse_block(height, &result)
    }

    async fn submit_transaction(&self, tx: &Tx) -> Result<(), ClientError> {
        let result = self
            .call("broadcast_tx_commit", json!({ "tx": tx }))
            .await?;
        check_broadcast(&result)
    }
}

fn unwrap_response(response: RpcResponse) -> Result<Value, ClientError> {
    if let Some(err) = response.error {
        let message = match err.data {
            Some(Value::String(data)) if !data.is_empty() => format!("{}: {}", err.message, data),
            _ => err.message,
        };
        return Err(ClientError::Rpc {
            code: err.code,
            message,
        });
    }

    response
        .result
        .ok_or_else(|| ClientError::invalid_response("response carries neither result nor error"))
}

/// Heights are encoded as decimal strings by most nodes, plain numbers by some
fn parse_height(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn parse_latest_height(status: &Value) -> Result<u64, ClientError> {
    status
        .pointer("/sync_info/latest_block_height")
        .and_then(parse_height)
        .ok_or_else(|| {
            ClientError::invalid_response("status is missing sync_info.latest_block_height")
        })
}

fn parse_block(height: u64, result: &Value) -> Result<Block, ClientError> {
    let block = result
        .get("block")
        .ok_or_else(|| {
            ClientError::invalid_response(format!("block {height} missing from response"))
        })?;

    let timestamp = match block.pointer("/header/time").and_then(Value::as_str) {
        Some(time) => Some(
            DateTime::parse_from_rfc3339(time)
                .map_err(|e| {
                    ClientError::invalid_response(format!("invalid block time {time}: {e}"))
                })?
                .timestamp_millis(),
        ),
        None => None,
    };

    let txs = match block.pointer("/data/txs") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .cloned()
            .map(|item| {
                Tx::from_value(item).ok_or_else(|| {
                    ClientError::invalid_response(format!(
                        "block {height} contains a non-object transaction"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ClientError::invalid_response(format!(
                "block {height} has a malformed transaction list"
            )))
        }
    };

    Ok(Block {
        height,
        timestamp,
        txs,
    })
}

fn check_broadcast(result: &Value) -> Result<(), ClientError> {
    for phase in ["check_tx", "deliver_tx"] {
        let Some(outcome) = result.get(phase) else {
            continue;
        };

        let code = outcome.get("code").and_then(Value::as_u64).unwrap_or(0);
        if code != 0 {
            let log = outcome
                .get("log")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(ClientError::Rejected { code, log });
        }
    }

    Ok(())
}
