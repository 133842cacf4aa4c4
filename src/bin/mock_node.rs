//! Mock Ethereum node for integration testing
//!
//! Serves a minimal JSON-RPC API on an IPC socket so the provider can be
//! tested without a real node.
//!
//! Usage: `mock_node <socket-path>`

use std::sync::atomic::{AtomicU64, Ordering};

use interprocess::local_socket::traits::tokio::Listener as _;
use ipc_provider::ipc::codec::{self, JsonStreamDecoder};
use ipc_provider::ipc::transport::{self, Stream};
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;

/// Connections accepted so far, used to hand out connection ids
static CONNECTIONS: AtomicU64 = AtomicU64::new(0);

#[tokio::main]
async fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: mock_node <socket-path>");
        std::process::exit(2);
    };

    let listener = match transport::bind(&path) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("mock_node: failed to listen on {}: {}", path, e);
            std::process::exit(1);
        }
    };

    loop {
        match listener.accept().await {
            Ok(stream) => {
                let connection_id = CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(serve(stream, connection_id));
            }
            Err(e) => eprintln!("mock_node: accept error: {}", e),
        }
    }
}

async fn serve(stream: Stream, connection_id: u64) {
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut decoder = JsonStreamDecoder::default();
    let mut state = MockState::new(connection_id);
    let mut chunk = vec![0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        decoder.extend(&chunk[..n]);

        loop {
            let message = match decoder.next_value() {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => return,
            };

            match state.process_message(&message) {
                Reply::Send(response) => {
                    let body = serde_json::to_vec(&response).unwrap_or_default();
                    if codec::write_message(&mut writer, &body).await.is_err() {
                        return;
                    }
                }
                Reply::Silent => {}
                Reply::Disconnect => return,
            }
        }
    }
}

enum Reply {
    Send(Value),
    Silent,
    Disconnect,
}

struct MockState {
    connection_id: u64,
    served: u64,
}

impl MockState {
    fn new(connection_id: u64) -> Self {
        Self {
            connection_id,
            served: 0,
        }
    }

    fn process_message(&mut self, message: &Value) -> Reply {
        match message {
            // Batches are answered in reverse order; clients must match by id
            Value::Array(requests) => {
                let mut responses = Vec::with_capacity(requests.len());
                for request in requests.iter().rev() {
                    match self.process_request(request) {
                        Reply::Send(response) => responses.push(response),
                        Reply::Silent => return Reply::Silent,
                        Reply::Disconnect => return Reply::Disconnect,
                    }
                }
                Reply::Send(Value::Array(responses))
            }
            request => self.process_request(request),
        }
    }

    fn process_request(&mut self, request: &Value) -> Reply {
        self.served += 1;

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or_else(|| json!([]));

        let result = match method {
            "eth_chainId" => json!("0x7a69"),
            "eth_blockNumber" => json!("0x10"),
            "eth_gasPrice" => json!("0x3b9aca00"),
            "mock_echo" => params,
            "mock_connectionId" => json!(self.connection_id),
            "mock_served" => json!(self.served),
            "mock_hang" => return Reply::Silent,
            "mock_disconnect" => return Reply::Disconnect,
            _ => {
                return Reply::Send(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("the method {} does not exist/is not available", method)
                    }
                }))
            }
        };

        Reply::Send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }
}
