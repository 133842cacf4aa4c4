//! JSON-RPC 2.0 message types
//!
//! Only the client side of the protocol is modelled: the request envelope
//! we send and the response shape we consume.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

/// Protocol version tag carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    /// Build a request envelope with the given id
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC response
///
/// Server notifications share this shape with `id` absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// Unwrap the `result` field, turning an error object into an `Err`
    ///
    /// A response with neither field yields `null`.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error for a batch answered with the wrong number of entries
///
/// Nodes that refuse a whole batch (too large, rate limited) answer with
/// an error entry instead of one response per request; that error is
/// surfaced as-is.
pub fn batch_size_mismatch(responses: Vec<JsonRpcResponse>, expected: usize) -> Error {
    let count = responses.len();
    match responses.into_iter().find_map(|r| r.error) {
        Some(error) => error.into(),
        None => Error::Protocol(format!(
            "Batch response has {} entries, expected {}",
            count, expected
        )),
    }
}

/// Arguments of an EIP-1193 `request` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

impl RequestArguments {
    /// Arguments for a method without parameters
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    /// Arguments for a method with parameters
    pub fn with_params(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
        }
    }
}

/// One entry of a batched call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl BatchRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl From<RequestArguments> for BatchRequest {
    fn from(args: RequestArguments) -> Self {
        Self {
            method: args.method,
            params: args.params.unwrap_or_default(),
        }
    }
}
