//! EIP-1193 provider over a node's IPC socket
//!
//! [`IpcProvider`] turns `request(args)` and batched calls into JSON-RPC
//! envelopes, forwards them to the client registered for its socket path,
//! waits at most the configured timeout, and returns only the `result`
//! values. Socket handling belongs to the client.

pub mod registry;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::{Error, Result};
use crate::ipc::IpcClient;
use crate::rpc::{
    self, BatchRequest, JsonRpcRequest, JsonRpcResponse, JsonRpcTransport, RequestArguments,
    RequestIdSequence, SequentialIds,
};

pub use registry::ClientRegistry;

/// Time to wait for a response when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

/// The EIP-1193 request interface
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Perform one JSON-RPC call and return its `result`
    async fn request(&self, args: RequestArguments) -> Result<Value>;
}

/// Provider for a node reachable over IPC
pub struct IpcProvider<C = IpcClient> {
    path: String,
    timeout: Duration,
    client: Arc<C>,
    ids: Arc<dyn RequestIdSequence>,
}

impl IpcProvider<IpcClient> {
    /// Provider on the process-wide registry and id sequence
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_timeout(path, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(path: impl Into<String>, timeout: Duration) -> Self {
        Self::with_registry(
            path,
            timeout,
            ClientRegistry::global(),
            SequentialIds::shared(),
        )
    }
}

impl<C: JsonRpcTransport> IpcProvider<C> {
    /// Provider using an explicit registry and id sequence
    pub fn with_registry(
        path: impl Into<String>,
        timeout: Duration,
        registry: &ClientRegistry<C>,
        ids: Arc<dyn RequestIdSequence>,
    ) -> Self {
        let path = path.into();
        let client = registry.client(&path);
        Self {
            path,
            timeout,
            client,
            ids,
        }
    }

    /// The socket path this provider talks to
    pub fn url(&self) -> &str {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The client shared by every provider on this path
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Send several calls as one JSON-RPC batch
    ///
    /// Results come back in input order. The batch succeeds or fails as a
    /// whole: one failed entry fails the call.
    pub async fn send_batch(&self, batch: Vec<BatchRequest>) -> Result<Vec<Value>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let expected = batch.len();
        let envelopes: Vec<JsonRpcRequest> = batch
            .into_iter()
            .map(|entry| self.envelope(entry.method, entry.params))
            .collect();

        let responses = self
            .with_deadline(self.client.request_batch(envelopes))
            .await?;

        if responses.len() != expected {
            return Err(rpc::batch_size_mismatch(responses, expected));
        }

        responses
            .into_iter()
            .map(JsonRpcResponse::into_result)
            .collect()
    }

    fn envelope(&self, method: String, params: Vec<Value>) -> JsonRpcRequest {
        JsonRpcRequest::new(method, params, self.ids.next_id())
    }

    async fn with_deadline<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                Error::Timeout(millis)
            })?
    }
}

#[async_trait]
impl<C: JsonRpcTransport> Eip1193Provider for IpcProvider<C> {
    async fn request(&self, args: RequestArguments) -> Result<Value> {
        let envelope = self.envelope(args.method, args.params.unwrap_or_default());
        let response = self.with_deadline(self.client.request(envelope)).await?;
        response.into_result()
    }
}

impl<C> fmt::Debug for IpcProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcProvider")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}
