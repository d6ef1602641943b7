//! Binary transport: persistent multiplexed RPC over framed TCP.
//!
//! One instance owns one long-lived connection. [`BinaryTransport::connect`]
//! performs a Hello handshake, then spawns a reader task that dispatches
//! incoming frames by envelope id: responses wake the pending caller's
//! oneshot, events feed the matching live stream's channel. All request
//! writes share one writer behind a mutex, so concurrent callers interleave
//! at frame granularity.
//!
//! Streaming operations use the channel natively: `batch_insert` writes a
//! client-to-server stream of document frames and closes it to receive the
//! aggregate result; `subscribe`/`watch_memory` open server-to-client streams
//! that yield decoded events until the caller drops the stream.
//!
//! Not everything is wired here: `get_user`, `list_users`, and `sample_graph`
//! are unsupported and say so before any I/O, and `check_permission` is
//! degraded (see the method).

use crate::contract::{EventStream, StorageTransport, TransportKind};
use crate::frame::{
    self, FrameError, WireEvent, WireMessage, WireMessageKind, WireRequest, WireResponse,
    PROTOCOL_VERSION,
};
use async_trait::async_trait;
use dashmap::DashMap;
use engram_types::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, EngramError,
    EngramResult, GraphSample, Health, InsertOptions, InsertResult, NodeId, PermissionSet,
    SdmAddress, SdmValue, SdmVector, SearchOptions, SearchResult, SessionId, StoreEvent,
    SubscribeFilter, SubscribeOptions, TraverseOptions, User, UserId, WriteAck,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const TRANSPORT: &str = "binary";

/// Buffered events per live stream before backpressure reaches the reader.
const STREAM_BUFFER: usize = 256;

/// An established connection: the shared writer and the reader task.
struct Conn {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    reader: tokio::task::JoinHandle<()>,
}

/// The binary transport. See the module docs for the wire model.
pub struct BinaryTransport {
    addr: String,
    token: Option<String>,
    state: Mutex<Option<Conn>>,
    pending: Arc<DashMap<u64, oneshot::Sender<WireResponse>>>,
    streams: Arc<DashMap<u64, mpsc::Sender<WireEvent>>>,
    next_id: AtomicU64,
}

impl BinaryTransport {
    /// Create an unconnected transport for `host:port`.
    pub fn new(host: &str, port: u16, token: Option<String>) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            token,
            state: Mutex::new(None),
            pending: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
            // Id 0 is reserved for the Hello handshake.
            next_id: AtomicU64::new(1),
        }
    }

    /// The remote address this transport dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn writer(&self) -> EngramResult<Arc<Mutex<OwnedWriteHalf>>> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|c| Arc::clone(&c.writer))
            .ok_or_else(|| EngramError::Connection("binary transport is not connected".to_string()))
    }

    /// Send one request and await its correlated response. Remote error
    /// responses are surfaced as [`EngramError::Remote`].
    async fn call(&self, req: WireRequest) -> EngramResult<WireResponse> {
        let writer = self.writer().await?;
        let id = self.alloc_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let msg = WireMessage {
            id,
            kind: WireMessageKind::Request(req),
        };
        {
            let mut w = writer.lock().await;
            if let Err(e) = frame::write_frame(&mut *w, &msg).await {
                self.pending.remove(&id);
                return Err(e.into());
            }
        }

        match rx.await {
            Ok(WireResponse::Error { code, message }) => Err(EngramError::Remote { code, message }),
            Ok(resp) => Ok(resp),
            Err(_) => Err(EngramError::Connection(
                "connection closed while awaiting response".to_string(),
            )),
        }
    }

    /// Open a server-to-client stream: register the event channel first so no
    /// early event can be lost, then send the opening request and await its ack.
    async fn open_stream(&self, req: WireRequest, op: &'static str) -> EngramResult<EventStream> {
        let writer = self.writer().await?;
        let id = self.alloc_id();
        let (etx, erx) = mpsc::channel(STREAM_BUFFER);
        self.streams.insert(id, etx);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let msg = WireMessage {
            id,
            kind: WireMessageKind::Request(req),
        };
        {
            let mut w = writer.lock().await;
            if let Err(e) = frame::write_frame(&mut *w, &msg).await {
                self.pending.remove(&id);
                self.streams.remove(&id);
                return Err(e.into());
            }
        }

        match rx.await {
            Ok(WireResponse::Subscribed) => {}
            Ok(WireResponse::Error { code, message }) => {
                self.streams.remove(&id);
                return Err(EngramError::Remote { code, message });
            }
            Ok(other) => {
                self.streams.remove(&id);
                return Err(unexpected(op, other));
            }
            Err(_) => {
                self.streams.remove(&id);
                return Err(EngramError::Connection(
                    "connection closed while opening stream".to_string(),
                ));
            }
        }

        debug!(id, operation = op, "stream opened");
        Ok(Box::pin(ReceiverStream::new(erx).map(decode_event)))
    }
}

/// Reader task: dispatch every incoming frame by envelope id until the
/// connection ends, then wake all in-flight callers by dropping their senders.
async fn dispatch_loop(
    mut reader: OwnedReadHalf,
    pending: Arc<DashMap<u64, oneshot::Sender<WireResponse>>>,
    streams: Arc<DashMap<u64, mpsc::Sender<WireEvent>>>,
) {
    loop {
        let msg = match frame::read_frame(&mut reader).await {
            Ok(msg) => msg,
            Err(FrameError::Closed) => break,
            Err(e) => {
                warn!(error = %e, "binary transport read failed");
                break;
            }
        };
        match msg.kind {
            WireMessageKind::Response(resp) => {
                if let Some((_, tx)) = pending.remove(&msg.id) {
                    let _ = tx.send(resp);
                } else {
                    warn!(id = msg.id, "response for unknown request id");
                }
            }
            WireMessageKind::Event(ev) => {
                // Clone the sender out so the map entry is not held across
                // the send await.
                let tx = streams.get(&msg.id).map(|entry| entry.value().clone());
                match tx {
                    Some(tx) => {
                        if tx.send(ev).await.is_err() {
                            // Consumer dropped the stream; stop routing to it.
                            streams.remove(&msg.id);
                        }
                    }
                    None => debug!(id = msg.id, "event for a closed stream"),
                }
            }
            WireMessageKind::Request(_) => {
                warn!(id = msg.id, "server sent a request frame; ignoring");
            }
        }
    }
    pending.clear();
    streams.clear();
    debug!("binary transport reader stopped");
}

fn unexpected(op: &'static str, resp: WireResponse) -> EngramError {
    EngramError::Codec(format!("unexpected response to {op}: {resp:?}"))
}

fn decode_metadata(bytes: &[u8]) -> EngramResult<serde_json::Value> {
    if bytes.is_empty() {
        Ok(serde_json::Value::Null)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

fn decode_event(ev: WireEvent) -> EngramResult<StoreEvent> {
    Ok(match ev {
        WireEvent::NodeInserted {
            node_id,
            user_id,
            metadata,
        } => StoreEvent::NodeInserted {
            node_id,
            user_id,
            metadata: decode_metadata(&metadata)?,
        },
        WireEvent::NodeDeleted { node_id } => StoreEvent::NodeDeleted { node_id },
        WireEvent::MemoryWritten { address, user_id } => StoreEvent::MemoryWritten {
            address: SdmVector::from_chunks(address)?,
            user_id,
        },
    })
}

#[async_trait]
impl StorageTransport for BinaryTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Binary
    }

    async fn connect(&self) -> EngramResult<bool> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!(addr = %self.addr, "binary transport already connected");
            return Ok(true);
        }

        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| EngramError::Connection(format!("{}: {e}", self.addr)))?;
        let (mut read_half, mut write_half) = stream.into_split();

        // Hello handshake before multiplexing starts.
        let hello = WireMessage {
            id: 0,
            kind: WireMessageKind::Request(WireRequest::Hello {
                token: self.token.clone(),
                protocol_version: PROTOCOL_VERSION,
            }),
        };
        frame::write_frame(&mut write_half, &hello).await?;
        let ack = frame::read_frame(&mut read_half).await?;
        match ack.kind {
            WireMessageKind::Response(WireResponse::HelloAck {
                protocol_version,
                server_version,
            }) => {
                if protocol_version != PROTOCOL_VERSION {
                    return Err(EngramError::Connection(format!(
                        "protocol version mismatch: local={PROTOCOL_VERSION}, remote={protocol_version}"
                    )));
                }
                debug!(addr = %self.addr, %server_version, "binary transport connected");
            }
            WireMessageKind::Response(WireResponse::Error { code, message }) => {
                return Err(EngramError::Remote { code, message });
            }
            _ => {
                return Err(EngramError::Connection(
                    "unexpected reply to Hello".to_string(),
                ));
            }
        }

        let reader = tokio::spawn(dispatch_loop(
            read_half,
            Arc::clone(&self.pending),
            Arc::clone(&self.streams),
        ));
        *state = Some(Conn {
            writer: Arc::new(Mutex::new(write_half)),
            reader,
        });
        Ok(true)
    }

    async fn disconnect(&self) -> EngramResult<()> {
        let mut state = self.state.lock().await;
        if let Some(conn) = state.take() {
            conn.reader.abort();
            self.pending.clear();
            self.streams.clear();
            debug!(addr = %self.addr, "binary transport disconnected");
        }
        Ok(())
    }

    async fn health(&self) -> EngramResult<Health> {
        match self.call(WireRequest::Health).await? {
            WireResponse::Health { status, version } => Ok(Health { status, version }),
            other => Err(unexpected("health", other)),
        }
    }

    async fn insert(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        opts: InsertOptions,
    ) -> EngramResult<InsertResult> {
        let req = WireRequest::Insert {
            node_id,
            text: text.to_string(),
            metadata: serde_json::to_vec(metadata)?,
            user_id: opts.user_id,
            session_id: opts.session_id.map(|s| s.0),
            embedding: opts.embedding,
            run_id: opts.run_id,
        };
        match self.call(req).await? {
            WireResponse::InsertAck {
                success,
                node_id,
                message,
            } => Ok(InsertResult {
                success,
                node_id,
                message,
            }),
            other => Err(unexpected("insert", other)),
        }
    }

    async fn search(&self, query: &str, opts: SearchOptions) -> EngramResult<Vec<SearchResult>> {
        let filter = match &opts.filter {
            Some(f) => Some(serde_json::to_vec(f)?),
            None => None,
        };
        let req = WireRequest::Search {
            query: query.to_string(),
            user_id: opts.user_id,
            k: opts.k as u64,
            session_id: opts.session_id.map(|s| s.0),
            filter,
            query_embedding: opts.query_embedding,
            run_id: opts.run_id,
        };
        match self.call(req).await? {
            WireResponse::SearchResults { results } => results
                .into_iter()
                .map(|hit| {
                    Ok(SearchResult {
                        id: hit.id,
                        similarity: hit.similarity,
                        metadata: decode_metadata(&hit.metadata)?,
                    })
                })
                .collect(),
            other => Err(unexpected("search", other)),
        }
    }

    async fn delete(&self, node_id: NodeId, session_id: Option<&SessionId>) -> EngramResult<bool> {
        let req = WireRequest::Delete {
            node_id,
            session_id: session_id.map(|s| s.0.clone()),
        };
        match self.call(req).await? {
            WireResponse::Deleted { success } => Ok(success),
            other => Err(unexpected("delete", other)),
        }
    }

    async fn delete_run(&self, run_id: &str) -> EngramResult<DeleteRunResult> {
        let req = WireRequest::DeleteRun {
            run_id: run_id.to_string(),
        };
        match self.call(req).await? {
            WireResponse::RunDeleted {
                success,
                message,
                count,
            } => Ok(DeleteRunResult {
                success,
                message,
                count,
            }),
            other => Err(unexpected("delete_run", other)),
        }
    }

    async fn create_session(&self, user_id: UserId) -> EngramResult<SessionId> {
        match self.call(WireRequest::CreateSession { user_id }).await? {
            WireResponse::SessionCreated { session_id } => Ok(SessionId(session_id)),
            other => Err(unexpected("create_session", other)),
        }
    }

    async fn snapshot_session(&self, session: &SessionId) -> EngramResult<bool> {
        let req = WireRequest::SnapshotSession {
            session_id: session.0.clone(),
        };
        match self.call(req).await? {
            WireResponse::SessionAck { success } => Ok(success),
            other => Err(unexpected("snapshot_session", other)),
        }
    }

    async fn load_session(&self, session: &SessionId) -> EngramResult<bool> {
        let req = WireRequest::LoadSession {
            session_id: session.0.clone(),
        };
        match self.call(req).await? {
            WireResponse::SessionAck { success } => Ok(success),
            other => Err(unexpected("load_session", other)),
        }
    }

    async fn commit_session(&self, session: &SessionId) -> EngramResult<bool> {
        let req = WireRequest::CommitSession {
            session_id: session.0.clone(),
        };
        match self.call(req).await? {
            WireResponse::SessionAck { success } => Ok(success),
            other => Err(unexpected("commit_session", other)),
        }
    }

    async fn drop_session(&self, session: &SessionId) -> EngramResult<bool> {
        let req = WireRequest::DropSession {
            session_id: session.0.clone(),
        };
        match self.call(req).await? {
            WireResponse::SessionAck { success } => Ok(success),
            other => Err(unexpected("drop_session", other)),
        }
    }

    async fn write_memory(
        &self,
        address: &SdmAddress,
        data: &SdmValue,
        user_id: UserId,
    ) -> EngramResult<WriteAck> {
        let req = WireRequest::WriteMemory {
            address: address.chunks().to_vec(),
            data: data.chunks().to_vec(),
            user_id,
        };
        match self.call(req).await? {
            WireResponse::MemoryAck { success, message } => Ok(WriteAck { success, message }),
            other => Err(unexpected("write_memory", other)),
        }
    }

    async fn read_memory(&self, address: &SdmAddress, user_id: UserId) -> EngramResult<SdmValue> {
        let req = WireRequest::ReadMemory {
            address: address.chunks().to_vec(),
            user_id,
        };
        match self.call(req).await? {
            WireResponse::MemoryValue { value } => SdmVector::from_chunks(value),
            other => Err(unexpected("read_memory", other)),
        }
    }

    async fn watch_memory(&self, user_id: UserId) -> EngramResult<EventStream> {
        self.open_stream(WireRequest::WatchMemory { user_id }, "watch_memory")
            .await
    }

    async fn add_edge(&self, edge: &Edge) -> EngramResult<bool> {
        let req = WireRequest::AddEdge {
            from: edge.from,
            to: edge.to,
            relation: edge.relation.clone(),
            weight: edge.weight,
        };
        match self.call(req).await? {
            WireResponse::EdgeAdded { success } => Ok(success),
            other => Err(unexpected("add_edge", other)),
        }
    }

    async fn get_neighbors(
        &self,
        node_id: NodeId,
        relation: Option<&str>,
        limit: usize,
    ) -> EngramResult<Vec<NodeId>> {
        let req = WireRequest::GetNeighbors {
            node_id,
            relation: relation.map(str::to_string),
            limit: limit as u64,
        };
        match self.call(req).await? {
            WireResponse::Neighbors { ids } => Ok(ids),
            other => Err(unexpected("get_neighbors", other)),
        }
    }

    async fn traverse(&self, start: NodeId, opts: TraverseOptions) -> EngramResult<Vec<NodeId>> {
        let req = WireRequest::Traverse {
            start,
            depth: opts.depth,
            limit: opts.limit as u64,
        };
        match self.call(req).await? {
            WireResponse::TraverseResult { ids } => Ok(ids),
            other => Err(unexpected("traverse", other)),
        }
    }

    async fn sample_graph(&self, _limit: usize) -> EngramResult<GraphSample> {
        EngramError::unsupported(TRANSPORT, "sample_graph")
    }

    async fn subscribe(&self, opts: SubscribeOptions) -> EngramResult<EventStream> {
        let filter = match opts.filter {
            SubscribeFilter::All => "all",
            SubscribeFilter::Node => "node",
            SubscribeFilter::Query => "query",
        };
        let req = WireRequest::Subscribe {
            filter: filter.to_string(),
            node_id: opts.node_id,
            query: opts.query,
            threshold: opts.threshold,
        };
        self.open_stream(req, "subscribe").await
    }

    async fn batch_insert(
        &self,
        documents: &[Document],
        user_id: UserId,
    ) -> EngramResult<BatchInsertResult> {
        let writer = self.writer().await?;
        let id = self.alloc_id();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // Stream the whole batch under one writer lock: open, one frame per
        // document, close. The lock keeps another caller's frames from
        // interleaving into the stream.
        {
            let mut w = writer.lock().await;
            let written: Result<(), FrameError> = async {
                let open = WireMessage {
                    id,
                    kind: WireMessageKind::Request(WireRequest::BatchOpen { user_id }),
                };
                frame::write_frame(&mut *w, &open).await?;
                for doc in documents {
                    let metadata = serde_json::to_vec(&doc.metadata)
                        .map_err(|e| FrameError::Encode(e.to_string()))?;
                    let msg = WireMessage {
                        id,
                        kind: WireMessageKind::Request(WireRequest::BatchDoc {
                            node_id: doc.id,
                            text: doc.text.clone(),
                            metadata,
                        }),
                    };
                    frame::write_frame(&mut *w, &msg).await?;
                }
                let close = WireMessage {
                    id,
                    kind: WireMessageKind::Request(WireRequest::BatchClose),
                };
                frame::write_frame(&mut *w, &close).await?;
                Ok(())
            }
            .await;
            if let Err(e) = written {
                self.pending.remove(&id);
                return Err(e.into());
            }
        }

        match rx.await {
            Ok(WireResponse::BatchResult { count, node_ids }) => {
                Ok(BatchInsertResult { count, node_ids })
            }
            Ok(WireResponse::Error { code, message }) => Err(EngramError::Remote { code, message }),
            Ok(other) => Err(unexpected("batch_insert", other)),
            Err(_) => Err(EngramError::Connection(
                "connection closed while awaiting batch result".to_string(),
            )),
        }
    }

    async fn grant_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        let req = WireRequest::GrantPermission {
            node_id,
            user_id,
            read: permissions.read,
            write: permissions.write,
            delete: permissions.delete,
        };
        match self.call(req).await? {
            WireResponse::GrantAck { success } => Ok(success),
            other => Err(unexpected("grant_permission", other)),
        }
    }

    async fn revoke_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        let req = WireRequest::RevokePermission {
            node_id,
            user_id,
            read: permissions.read,
            write: permissions.write,
            delete: permissions.delete,
        };
        match self.call(req).await? {
            WireResponse::RevokeAck { success } => Ok(success),
            other => Err(unexpected("revoke_permission", other)),
        }
    }

    /// Known capability gap: the binary protocol has no permission-check
    /// call, so this answers "not allowed" without touching the network.
    /// Kept as a documented asymmetry with the text transport rather than
    /// papered over with a guess.
    async fn check_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        _permissions: PermissionSet,
    ) -> EngramResult<bool> {
        debug!(%node_id, %user_id, "check_permission is degraded on the binary transport");
        Ok(false)
    }

    async fn batch_grant(
        &self,
        node_id: NodeId,
        entries: &[AclEntry],
    ) -> EngramResult<BatchGrantReport> {
        let mut report = BatchGrantReport {
            total: entries.len() as u64,
            ..Default::default()
        };
        for entry in entries {
            match self
                .grant_permission(node_id, entry.user_id, entry.permissions)
                .await
            {
                Ok(success) => {
                    if success {
                        report.successful += 1;
                    } else {
                        report.failed += 1;
                        report.errors.push(format!(
                            "grant to user {} was rejected",
                            entry.user_id
                        ));
                    }
                    report.results.push(success);
                }
                Err(e) => {
                    report.failed += 1;
                    report.results.push(false);
                    report.errors.push(e.to_string());
                }
            }
        }
        Ok(report)
    }

    async fn get_user(&self, _user_id: UserId) -> EngramResult<User> {
        EngramError::unsupported(TRANSPORT, "get_user")
    }

    async fn list_users(&self) -> EngramResult<Vec<User>> {
        EngramError::unsupported(TRANSPORT, "list_users")
    }
}
