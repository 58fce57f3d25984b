//! JSON-RPC envelope and result decoding

use crate::error::{RpcError, RpcResult};
use forksim_primitives::{H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    /// Always "2.0"
    pub jsonrpc: &'static str,
    /// Request ID
    pub id: u64,
    /// Method name
    pub method: &'a str,
    /// Positional parameters
    pub params: Vec<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    /// Create a new request
    pub fn new(id: u64, method: &'a str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// Request ID echoed back
    #[serde(default)]
    pub id: Value,
    /// Success payload
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result, or the node's error
    pub fn into_result(self, method: &str) -> RpcResult<Value> {
        if let Some(error) = self.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        match self.result {
            Some(Value::Null) | None => Err(RpcError::MissingResult(method.to_string())),
            Some(result) => Ok(result),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(default)]
    pub data: Option<Value>,
}

fn as_hex_str(value: &Value) -> RpcResult<&str> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::Decode(format!("expected hex string, got {}", value)))?;
    Ok(s.strip_prefix("0x").unwrap_or(s))
}

/// Decode hex data such as `eth_getCode` output
pub fn parse_hex_bytes(value: &Value) -> RpcResult<Vec<u8>> {
    Ok(hex::decode(as_hex_str(value)?)?)
}

/// Decode a storage word, left-padding short values to 32 bytes
pub fn parse_storage_word(value: &Value) -> RpcResult<H256> {
    let digits = as_hex_str(value)?;
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    let bytes = hex::decode(digits)?;
    if bytes.len() > H256::LEN {
        return Err(RpcError::Decode(format!(
            "storage word is {} bytes long",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[H256::LEN - bytes.len()..].copy_from_slice(&bytes);
    Ok(H256::from_bytes(word))
}

/// Decode a hex quantity such as `eth_getBalance` output
pub fn parse_quantity(value: &Value) -> RpcResult<U256> {
    let digits = as_hex_str(value)?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("invalid quantity: {:?}", e)))
}
