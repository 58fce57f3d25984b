//! Blocking JSON-RPC state source

use crate::error::{RpcError, RpcResult};
use crate::source::{BlockTag, StateSource};
use crate::types::{parse_hex_bytes, parse_quantity, parse_storage_word, JsonRpcRequest, JsonRpcResponse};
use forksim_primitives::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Remote node connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8545".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// [`StateSource`] backed by a node's `eth_*` JSON-RPC methods
pub struct HttpStateSource {
    client: reqwest::blocking::Client,
    url: String,
    request_id: AtomicU64,
}

impl HttpStateSource {
    /// Create a client for the configured endpoint
    pub fn new(config: &RpcConfig) -> RpcResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.endpoint.clone(),
            request_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one request and return its `result`
    pub fn request(&self, method: &str, params: Vec<Value>) -> RpcResult<Value> {
        let request = JsonRpcRequest::new(self.next_id(), method, params);
        debug!(method, id = request.id, "rpc request");

        let response = self.client.post(&self.url).json(&request).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body: JsonRpcResponse = response
            .json()
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        body.into_result(method)
    }
}

impl StateSource for HttpStateSource {
    fn get_code(&self, address: &Address, block: BlockTag) -> RpcResult<Vec<u8>> {
        let result = self.request("eth_getCode", vec![json!(address.to_hex()), json!(block.to_wire())])?;
        parse_hex_bytes(&result)
    }

    fn get_storage_at(&self, address: &Address, slot: &H256, block: BlockTag) -> RpcResult<H256> {
        let result = self.request(
            "eth_getStorageAt",
            vec![json!(address.to_hex()), json!(slot.to_hex()), json!(block.to_wire())],
        )?;
        parse_storage_word(&result)
    }

    fn get_balance(&self, address: &Address, block: BlockTag) -> RpcResult<U256> {
        let result = self.request("eth_getBalance", vec![json!(address.to_hex()), json!(block.to_wire())])?;
        parse_quantity(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serve one HTTP exchange on a loopback port, returning the request body
    fn serve_once(status: &'static str, body: String) -> (RpcConfig, JoinHandle<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request = vec![0u8; content_length];
            reader.read_exact(&mut request).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
            serde_json::from_slice(&request).unwrap()
        });
        let config = RpcConfig {
            endpoint: format!("http://127.0.0.1:{}", port),
            timeout_secs: 5,
        };
        (config, handle)
    }

    #[test]
    fn test_config_defaults() {
        let config: RpcConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RpcConfig::default());
        assert_eq!(config.endpoint, "http://localhost:8545");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_get_storage_at_over_http() {
        let (config, server) = serve_once("200 OK", r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#.to_string());
        let source = HttpStateSource::new(&config).unwrap();
        let address = Address::from_low_u64_be(0xaa);

        let value = source
            .get_storage_at(&address, &H256::from_low_u64_be(1), BlockTag::Number(16))
            .unwrap();
        assert_eq!(value, H256::from_low_u64_be(42));

        let request = server.join().unwrap();
        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["id"], 1);
        assert_eq!(request["method"], "eth_getStorageAt");
        assert_eq!(request["params"][0], address.to_hex());
        assert_eq!(request["params"][1], H256::from_low_u64_be(1).to_hex());
        assert_eq!(request["params"][2], "0x10");
    }

    #[test]
    fn test_rpc_error_object_is_surfaced() {
        let (config, server) = serve_once(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"missing trie node"}}"#.to_string(),
        );
        let source = HttpStateSource::new(&config).unwrap();
        let err = source.get_balance(&Address::ZERO, BlockTag::Latest).unwrap_err();
        assert_eq!(
            err,
            RpcError::Rpc {
                code: -32000,
                message: "missing trie node".to_string()
            }
        );
        let request = server.join().unwrap();
        assert_eq!(request["params"][1], "latest");
    }

    #[test]
    fn test_http_status_error() {
        let (config, server) = serve_once("503 Service Unavailable", String::new());
        let source = HttpStateSource::new(&config).unwrap();
        let err = source.get_code(&Address::ZERO, BlockTag::Latest).unwrap_err();
        assert_eq!(err, RpcError::Status(503));
        server.join().unwrap();
    }

    #[test]
    fn test_request_ids_increase() {
        let source = HttpStateSource::new(&RpcConfig::default()).unwrap();
        assert_eq!(source.next_id(), 1);
        assert_eq!(source.next_id(), 2);
    }
}
