//! JSON-RPC envelopes and the client interface the provider consumes

pub mod ids;
pub mod types;

use async_trait::async_trait;

use crate::common::Result;

pub use ids::{RequestIdSequence, SequentialIds};
pub use types::*;

/// A client able to carry JSON-RPC envelopes to a node
#[async_trait]
pub trait JsonRpcTransport: Send + Sync {
    /// Send one request and wait for its response
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a batch and wait for all of its responses
    ///
    /// Responses come back in the order the requests were given.
    async fn request_batch(&self, batch: Vec<JsonRpcRequest>) -> Result<Vec<JsonRpcResponse>>;
}
