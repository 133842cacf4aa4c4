//! JSON-RPC client over a node's IPC socket
//!
//! One socket per client. A writer task drains the outgoing queue and a
//! reader task decodes incoming values and hands each response to the
//! caller waiting on its id. Callers never write to the socket directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::rpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JsonRpcTransport};

use super::codec::{self, JsonStreamDecoder, DEFAULT_MAX_MESSAGE_SIZE};
use super::transport::{self, Stream};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Options for an [`IpcClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Open a fresh connection when the previous one has gone away
    pub auto_reconnect: bool,
    /// Largest incoming message accepted before the connection is dropped
    pub max_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

type SingleReply = oneshot::Sender<Result<JsonRpcResponse>>;
type BatchReply = oneshot::Sender<Result<Vec<JsonRpcResponse>>>;

struct PendingBatch {
    ids: Vec<u64>,
    reply: BatchReply,
}

enum OrphanWaiter {
    Single(SingleReply),
    Batch(BatchReply),
}

/// Identifies a registered request so it can be withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKey {
    Single(u64),
    /// Keyed by the first id of the batch
    Batch(u64),
}

#[derive(Default)]
struct PendingState {
    singles: HashMap<u64, SingleReply>,
    batches: HashMap<u64, PendingBatch>,
    /// Request id -> key of the batch it belongs to
    batch_of: HashMap<u64, u64>,
}

impl PendingState {
    fn ensure_free(&self, id: u64) -> Result<()> {
        if self.singles.contains_key(&id) || self.batch_of.contains_key(&id) {
            return Err(Error::Protocol(format!("Request id {} is already in flight", id)));
        }
        Ok(())
    }
}

/// Requests waiting for a response
#[derive(Default)]
pub(crate) struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request; an id already in flight is refused
    pub fn insert_single(&self, id: u64, reply: SingleReply) -> Result<PendingKey> {
        let mut state = self.lock();
        state.ensure_free(id)?;
        state.singles.insert(id, reply);
        Ok(PendingKey::Single(id))
    }

    /// Register a non-empty batch whose ids are all unused
    pub fn insert_batch(&self, ids: Vec<u64>, reply: BatchReply) -> Result<PendingKey> {
        let key = ids[0];
        let mut state = self.lock();
        for (i, id) in ids.iter().enumerate() {
            state.ensure_free(*id)?;
            if ids[..i].contains(id) {
                return Err(Error::Protocol(format!("Request id {} appears twice in batch", id)));
            }
        }
        for id in &ids {
            state.batch_of.insert(*id, key);
        }
        state.batches.insert(key, PendingBatch { ids, reply });
        Ok(PendingKey::Batch(key))
    }

    /// Withdraw a request; a response arriving later is dropped
    pub fn cancel(&self, key: PendingKey) {
        let mut state = self.lock();
        match key {
            PendingKey::Single(id) => {
                state.singles.remove(&id);
            }
            PendingKey::Batch(key) => {
                if let Some(batch) = state.batches.remove(&key) {
                    for id in &batch.ids {
                        state.batch_of.remove(id);
                    }
                }
            }
        }
    }

    /// Hand a response to the request waiting on its id
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id else {
            return false;
        };
        let reply = self.lock().singles.remove(&id);
        match reply {
            Some(reply) => {
                let _ = reply.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Hand a batch response to the batch containing its ids
    ///
    /// The responses are re-ordered to match the submitted requests.
    pub fn resolve_batch(&self, responses: Vec<JsonRpcResponse>) -> bool {
        let batch = {
            let mut state = self.lock();
            let key = responses
                .iter()
                .filter_map(|r| r.id)
                .find_map(|id| state.batch_of.get(&id).copied());
            let Some(batch) = key.and_then(|key| state.batches.remove(&key)) else {
                return false;
            };
            for id in &batch.ids {
                state.batch_of.remove(id);
            }
            batch
        };

        let ordered = order_batch(&batch.ids, responses);
        let _ = batch.reply.send(ordered);
        true
    }

    /// Deliver an error that carries no id
    ///
    /// Nodes answer requests they could not parse with `"id": null`. With a
    /// single request outstanding the error is unambiguously its answer;
    /// otherwise nobody can claim it. Returns whether a waiter took it.
    pub fn resolve_orphan_error(&self, error: JsonRpcError) -> bool {
        let waiter = {
            let mut state = self.lock();
            if state.singles.len() + state.batches.len() != 1 {
                return false;
            }
            let single = state.singles.keys().next().copied();
            let batch = state.batches.keys().next().copied();
            match (single, batch) {
                (Some(id), _) => state.singles.remove(&id).map(OrphanWaiter::Single),
                (None, Some(key)) => state.batches.remove(&key).map(|batch| {
                    for id in &batch.ids {
                        state.batch_of.remove(id);
                    }
                    OrphanWaiter::Batch(batch.reply)
                }),
                (None, None) => None,
            }
        };

        match waiter {
            Some(OrphanWaiter::Single(reply)) => {
                let _ = reply.send(Err(error.into()));
                true
            }
            Some(OrphanWaiter::Batch(reply)) => {
                let _ = reply.send(Err(error.into()));
                true
            }
            None => false,
        }
    }

    /// Fail every waiting request with `ConnectionClosed`
    pub fn fail_all(&self) {
        let (singles, batches) = {
            let mut state = self.lock();
            state.batch_of.clear();
            (
                std::mem::take(&mut state.singles),
                std::mem::take(&mut state.batches),
            )
        };

        for (_, reply) in singles {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
        for (_, batch) in batches {
            let _ = batch.reply.send(Err(Error::ConnectionClosed));
        }
    }

    pub fn len(&self) -> usize {
        let state = self.lock();
        state.singles.len() + state.batches.len()
    }
}

/// Arrange batch responses in the order of `ids`
fn order_batch(ids: &[u64], responses: Vec<JsonRpcResponse>) -> Result<Vec<JsonRpcResponse>> {
    if responses.len() != ids.len() {
        return Err(rpc::batch_size_mismatch(responses, ids.len()));
    }

    let mut by_id: HashMap<u64, JsonRpcResponse> = responses
        .into_iter()
        .filter_map(|r| r.id.map(|id| (id, r)))
        .collect();

    ids.iter()
        .map(|id| {
            by_id.remove(id).ok_or_else(|| {
                Error::Protocol(format!("Batch response is missing id {}", id))
            })
        })
        .collect()
}

/// Withdraws a pending request if its caller stops waiting
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    key: PendingKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.cancel(self.key);
    }
}

/// The parts of a live connection that callers need
#[derive(Clone)]
struct ConnectionHandle {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
}

impl ConnectionHandle {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn send(&self, message: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.outgoing
            .send(message)
            .map_err(|_| Error::ConnectionClosed)
    }
}

struct Connection {
    handle: ConnectionHandle,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn open(path: &str, options: &ClientOptions) -> Result<Self> {
        let stream = transport::connect(path)
            .await
            .map_err(|e| Error::connection_failed(path, e))?;
        let (reader, writer) = tokio::io::split(stream);

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingRequests::default());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(
            writer,
            outgoing_rx,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));
        let reader = tokio::spawn(read_loop(
            reader,
            JsonStreamDecoder::new(options.max_message_size),
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Ok(Self {
            handle: ConnectionHandle {
                outgoing,
                pending,
                closed,
            },
            reader,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn shut_down(pending: &PendingRequests, closed: &AtomicBool) {
    closed.store(true, Ordering::SeqCst);
    pending.fail_all();
}

async fn write_loop(
    mut writer: WriteHalf<Stream>,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = codec::write_message(&mut writer, &message).await {
            tracing::warn!("IPC write failed: {}", e);
            shut_down(&pending, &closed);
            return;
        }
    }
}

async fn read_loop(
    mut reader: ReadHalf<Stream>,
    mut decoder: JsonStreamDecoder,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
) {
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!("IPC socket closed by node");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("IPC read failed: {}", e);
                break;
            }
        };

        decoder.extend(&chunk[..n]);
        loop {
            match decoder.next_value() {
                Ok(Some(value)) => dispatch(&pending, value),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Dropping IPC connection: {}", e);
                    shut_down(&pending, &closed);
                    return;
                }
            }
        }
    }

    shut_down(&pending, &closed);
}

/// Route one decoded value to whoever is waiting for it
fn dispatch(pending: &PendingRequests, value: Value) {
    if value.is_array() {
        match serde_json::from_value::<Vec<JsonRpcResponse>>(value) {
            Ok(responses) => {
                if !pending.resolve_batch(responses) {
                    tracing::debug!("Dropping batch response with no waiting request");
                }
            }
            Err(e) => tracing::warn!("Ignoring malformed batch response: {}", e),
        }
        return;
    }

    match serde_json::from_value::<JsonRpcResponse>(value) {
        Ok(response) => match response.id {
            Some(id) => {
                if !pending.resolve(response) {
                    tracing::debug!(id, "Dropping response with no waiting request");
                }
            }
            None => match response.error {
                Some(error) => {
                    let message = error.message.clone();
                    let code = error.code;
                    if !pending.resolve_orphan_error(error) {
                        tracing::warn!(code, "Node returned an error without id: {}", message);
                    }
                }
                None => tracing::debug!("Ignoring IPC message without id"),
            },
        },
        Err(e) => tracing::warn!("Ignoring malformed response: {}", e),
    }
}

enum ConnectionState {
    Idle,
    Open(Connection),
    Closed,
}

/// JSON-RPC client bound to one IPC socket path
///
/// The connection is opened on first use. Without `auto_reconnect`, a
/// client whose connection failed or ended stays closed for good.
pub struct IpcClient {
    path: String,
    options: ClientOptions,
    state: tokio::sync::Mutex<ConnectionState>,
}

impl IpcClient {
    pub fn new(path: impl Into<String>, options: ClientOptions) -> Self {
        Self {
            path: path.into(),
            options,
            state: tokio::sync::Mutex::new(ConnectionState::Idle),
        }
    }

    /// Socket path this client talks to
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Open the connection now instead of on the first request
    ///
    /// Fails the same way the first request would: a missing socket is a
    /// `ConnectionFailed` and, without `auto_reconnect`, closes the client.
    pub async fn connect(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// Whether the client can no longer send requests
    pub async fn is_closed(&self) -> bool {
        match &*self.state.lock().await {
            ConnectionState::Idle => false,
            ConnectionState::Open(conn) => conn.handle.is_closed() && !self.options.auto_reconnect,
            ConnectionState::Closed => true,
        }
    }

    async fn connection(&self) -> Result<ConnectionHandle> {
        let mut state = self.state.lock().await;

        if let ConnectionState::Open(conn) = &*state {
            if conn.handle.is_closed() {
                tracing::info!("IPC connection to {} closed", self.path);
                *state = if self.options.auto_reconnect {
                    ConnectionState::Idle
                } else {
                    ConnectionState::Closed
                };
            }
        }

        if let ConnectionState::Idle = &*state {
            match Connection::open(&self.path, &self.options).await {
                Ok(conn) => {
                    tracing::debug!("Connected to IPC socket {}", self.path);
                    *state = ConnectionState::Open(conn);
                }
                Err(e) => {
                    if !self.options.auto_reconnect {
                        *state = ConnectionState::Closed;
                    }
                    return Err(e);
                }
            }
        }

        match &*state {
            ConnectionState::Open(conn) => Ok(conn.handle.clone()),
            _ => Err(Error::ConnectionClosed),
        }
    }
}

#[async_trait]
impl JsonRpcTransport for IpcClient {
    async fn request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let conn = self.connection().await?;
        let json = serde_json::to_vec(&request)?;

        let (tx, rx) = oneshot::channel();
        let key = conn.pending.insert_single(request.id, tx)?;
        let _guard = PendingGuard {
            pending: &conn.pending,
            key,
        };

        tracing::trace!(id = request.id, method = %request.method, "IPC request");
        conn.send(json)?;

        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn request_batch(&self, batch: Vec<JsonRpcRequest>) -> Result<Vec<JsonRpcResponse>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.connection().await?;
        let json = serde_json::to_vec(&batch)?;
        let ids: Vec<u64> = batch.iter().map(|r| r.id).collect();

        let (tx, rx) = oneshot::channel();
        let key = conn.pending.insert_batch(ids, tx)?;
        let _guard = PendingGuard {
            pending: &conn.pending,
            key,
        };

        tracing::trace!(size = batch.len(), first_id = batch[0].id, "IPC batch request");
        conn.send(json)?;

        rx.await.map_err(|_| Error::ConnectionClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(id: u64, result: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(id, result)
    }

    #[tokio::test]
    async fn test_resolve_single() {
        let pending = PendingRequests::default();
        let (tx, rx) = oneshot::channel();
        pending.insert_single(5, tx).unwrap();

        assert!(pending.resolve(ok(5, json!("0x1"))));
        assert_eq!(rx.await.unwrap().unwrap().result, Some(json!("0x1")));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_resolve_unknown_id_is_dropped() {
        let pending = PendingRequests::default();
        assert!(!pending.resolve(ok(9, json!(null))));
    }

    #[tokio::test]
    async fn test_resolve_batch_reorders_by_id() {
        let pending = PendingRequests::default();
        let (tx, rx) = oneshot::channel();
        pending.insert_batch(vec![10, 11, 12], tx).unwrap();

        let responses = vec![ok(12, json!("c")), ok(10, json!("a")), ok(11, json!("b"))];
        assert!(pending.resolve_batch(responses));

        let ordered = rx.await.unwrap().unwrap();
        let ids: Vec<_> = ordered.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![Some(10), Some(11), Some(12)]);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_resolve_batch_with_missing_entry_fails() {
        let pending = PendingRequests::default();
        let (tx, rx) = oneshot::channel();
        pending.insert_batch(vec![1, 2], tx).unwrap();

        assert!(pending.resolve_batch(vec![ok(1, json!("a"))]));
        assert!(matches!(rx.await.unwrap(), Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_fail_all_closes_waiters() {
        let pending = PendingRequests::default();
        let (single_tx, single_rx) = oneshot::channel();
        let (batch_tx, batch_rx) = oneshot::channel();
        pending.insert_single(1, single_tx).unwrap();
        pending.insert_batch(vec![2, 3], batch_tx).unwrap();

        pending.fail_all();

        assert!(matches!(single_rx.await.unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(batch_rx.await.unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_short_batch_surfaces_node_error() {
        let pending = PendingRequests::default();
        let (tx, rx) = oneshot::channel();
        pending.insert_batch(vec![1, 2, 3], tx).unwrap();

        let refused = JsonRpcError {
            code: -32600,
            message: "batch too large".to_string(),
            data: None,
        };
        assert!(pending.resolve_batch(vec![JsonRpcResponse::error(1, refused)]));

        match rx.await.unwrap() {
            Err(Error::JsonRpc { code, message, .. }) => {
                assert_eq!(code, -32600);
                assert_eq!(message, "batch too large");
            }
            other => panic!("Expected JsonRpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_id_is_refused() {
        let pending = PendingRequests::default();
        let (first_tx, first_rx) = oneshot::channel();
        let (second_tx, _second_rx) = oneshot::channel();
        let (batch_tx, _batch_rx) = oneshot::channel();
        pending.insert_single(7, first_tx).unwrap();

        assert!(matches!(
            pending.insert_single(7, second_tx),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            pending.insert_batch(vec![6, 7], batch_tx),
            Err(Error::Protocol(_))
        ));
        assert_eq!(pending.len(), 1);

        // The original waiter still gets its answer
        assert!(pending.resolve(ok(7, json!("first"))));
        assert_eq!(first_rx.await.unwrap().unwrap().result, Some(json!("first")));
        // Nothing of the refused batch was left behind
        assert!(!pending.resolve_batch(vec![ok(6, json!(1)), ok(7, json!(2))]));
    }

    #[test]
    fn test_batch_with_repeated_id_is_refused() {
        let pending = PendingRequests::default();
        let (tx, _rx) = oneshot::channel();
        assert!(matches!(
            pending.insert_batch(vec![1, 2, 1], tx),
            Err(Error::Protocol(_))
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_error_without_id_fails_sole_waiter() {
        let pending = PendingRequests::default();
        let (tx, rx) = oneshot::channel();
        pending.insert_single(3, tx).unwrap();

        dispatch(
            &pending,
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "parse error"}}),
        );

        assert!(matches!(
            rx.await.unwrap(),
            Err(Error::JsonRpc { code: -32700, .. })
        ));
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_error_without_id_is_ambiguous_with_several_waiters() {
        let pending = PendingRequests::default();
        let (first_tx, _first_rx) = oneshot::channel();
        let (second_tx, _second_rx) = oneshot::channel();
        pending.insert_single(1, first_tx).unwrap();
        pending.insert_batch(vec![2, 3], second_tx).unwrap();

        let error = JsonRpcError {
            code: -32700,
            message: "parse error".to_string(),
            data: None,
        };
        assert!(!pending.resolve_orphan_error(error));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_cancel_withdraws_batch() {
        let pending = PendingRequests::default();
        let (tx, _rx) = oneshot::channel();
        let key = pending.insert_batch(vec![4, 5], tx).unwrap();

        pending.cancel(key);

        assert_eq!(pending.len(), 0);
        assert!(!pending.resolve_batch(vec![ok(4, json!(1)), ok(5, json!(2))]));
    }

    #[tokio::test]
    async fn test_dispatch_routes_objects_and_arrays() {
        let pending = PendingRequests::default();
        let (single_tx, single_rx) = oneshot::channel();
        let (batch_tx, batch_rx) = oneshot::channel();
        pending.insert_single(1, single_tx).unwrap();
        pending.insert_batch(vec![2, 3], batch_tx).unwrap();

        dispatch(&pending, json!({"jsonrpc": "2.0", "method": "eth_subscription", "params": {}}));
        dispatch(
            &pending,
            json!([{"jsonrpc": "2.0", "id": 3, "result": "b"}, {"jsonrpc": "2.0", "id": 2, "result": "a"}]),
        );
        dispatch(&pending, json!({"jsonrpc": "2.0", "id": 1, "result": "x"}));

        assert_eq!(single_rx.await.unwrap().unwrap().result, Some(json!("x")));
        let batch = batch_rx.await.unwrap().unwrap();
        assert_eq!(batch[0].result, Some(json!("a")));
        assert_eq!(batch[1].result, Some(json!("b")));
    }

    #[tokio::test]
    async fn test_connect_to_missing_socket_closes_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ipc");
        let client = IpcClient::new(path.to_string_lossy(), ClientOptions::default());

        let err = client
            .request(JsonRpcRequest::new("eth_chainId", Vec::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { .. }));
        assert!(client.is_closed().await);

        let err = client
            .request(JsonRpcRequest::new("eth_chainId", Vec::new(), 2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_eager_connect_to_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ipc");
        let client = IpcClient::new(path.to_string_lossy(), ClientOptions::default());

        assert!(matches!(
            client.connect().await,
            Err(Error::ConnectionFailed { .. })
        ));
        assert!(client.is_closed().await);
        assert!(matches!(client.connect().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_socket() {
        let client = IpcClient::new("/nonexistent/never.ipc", ClientOptions::default());
        assert!(client.request_batch(Vec::new()).await.unwrap().is_empty());
        assert!(!client.is_closed().await);
    }
}
