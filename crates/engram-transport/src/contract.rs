//! The capability contract both transports implement.
//!
//! Callers depend only on [`StorageTransport`]; the concrete transport behind
//! it is selected by the orchestrating client. Operations a transport cannot
//! support fail fast with [`EngramError::Unsupported`] before any network
//! I/O; partial execution is never attempted.
//!
//! Optional operations per transport:
//!
//! | Operation | Binary | Text |
//! |---|---|---|
//! | `subscribe`, `watch_memory` | streaming | unsupported |
//! | `get_user`, `list_users`, `sample_graph` | unsupported | supported |
//! | `check_permission` | degraded (always `false`) | supported |

use async_trait::async_trait;
use engram_types::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, EngramResult,
    GraphSample, Health, InsertOptions, InsertResult, InsertWithAclResult, NodeId, PermissionSet,
    SdmAddress, SdmValue, SearchOptions, SearchResult, SessionId, StoreEvent, SubscribeOptions,
    TraverseOptions, User, UserId, WriteAck,
};
use futures::Stream;
use std::pin::Pin;

/// A lazy, cancellable sequence of store events. Finite for batch
/// acknowledgement streams, unbounded for live subscriptions; dropping the
/// stream ends the subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = EngramResult<StoreEvent>> + Send>>;

/// Which concrete transport is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent multiplexed framed-TCP RPC.
    Binary,
    /// Stateless request/response REST.
    Text,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Binary => write!(f, "binary"),
            TransportKind::Text => write!(f, "text"),
        }
    }
}

/// The unified operation set over the Engram store.
#[async_trait]
pub trait StorageTransport: Send + Sync {
    /// The concrete transport behind this instance.
    fn kind(&self) -> TransportKind;

    /// Establish the underlying connection. Idempotent: connecting an
    /// already-connected instance is a no-op returning `true`. One instance
    /// owns exactly one connection.
    async fn connect(&self) -> EngramResult<bool>;

    /// Tear down the connection and wake any in-flight callers with a
    /// connection error.
    async fn disconnect(&self) -> EngramResult<()>;

    /// Service health and version.
    async fn health(&self) -> EngramResult<Health>;

    // -- Nodes --

    /// Insert (or re-insert) a node.
    async fn insert(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        opts: InsertOptions,
    ) -> EngramResult<InsertResult>;

    /// Similarity search.
    async fn search(&self, query: &str, opts: SearchOptions) -> EngramResult<Vec<SearchResult>>;

    /// Delete a single node.
    async fn delete(&self, node_id: NodeId, session_id: Option<&SessionId>) -> EngramResult<bool>;

    /// Delete everything written under a run scope.
    async fn delete_run(&self, run_id: &str) -> EngramResult<DeleteRunResult>;

    // -- Sessions --

    /// Create a new working branch of the store.
    async fn create_session(&self, user_id: UserId) -> EngramResult<SessionId>;

    /// Snapshot the session's current state.
    async fn snapshot_session(&self, session: &SessionId) -> EngramResult<bool>;

    /// Restore the session to its last snapshot.
    async fn load_session(&self, session: &SessionId) -> EngramResult<bool>;

    /// Merge the session into the main branch.
    async fn commit_session(&self, session: &SessionId) -> EngramResult<bool>;

    /// Discard the session.
    async fn drop_session(&self, session: &SessionId) -> EngramResult<bool>;

    // -- Sparse distributed memory --

    /// Write a value into the neighborhood of an address.
    async fn write_memory(
        &self,
        address: &SdmAddress,
        data: &SdmValue,
        user_id: UserId,
    ) -> EngramResult<WriteAck>;

    /// Read the aggregated value nearest to an address.
    async fn read_memory(&self, address: &SdmAddress, user_id: UserId) -> EngramResult<SdmValue>;

    /// Live stream of memory writes (binary transport only).
    async fn watch_memory(&self, user_id: UserId) -> EngramResult<EventStream>;

    // -- Graph --

    /// Add a directed labeled edge. Edges have no update operation and are
    /// not individually deletable in this layer.
    async fn add_edge(&self, edge: &Edge) -> EngramResult<bool>;

    /// Direct neighbors of a node, optionally restricted to one relation.
    async fn get_neighbors(
        &self,
        node_id: NodeId,
        relation: Option<&str>,
        limit: usize,
    ) -> EngramResult<Vec<NodeId>>;

    /// Breadth-bounded traversal from a start node.
    async fn traverse(&self, start: NodeId, opts: TraverseOptions) -> EngramResult<Vec<NodeId>>;

    /// A random sample of the stored graph (text transport only).
    async fn sample_graph(&self, limit: usize) -> EngramResult<GraphSample>;

    // -- Streaming / batch --

    /// Live event subscription (binary transport only).
    async fn subscribe(&self, opts: SubscribeOptions) -> EngramResult<EventStream>;

    /// Insert many documents in one operation; partial failures are reported
    /// per item by the bulk engine above this layer, never by failing the
    /// whole call for one document.
    async fn batch_insert(
        &self,
        documents: &[Document],
        user_id: UserId,
    ) -> EngramResult<BatchInsertResult>;

    // -- Permissions --

    /// Grant rights on a node to a user.
    async fn grant_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool>;

    /// Revoke rights on a node from a user.
    async fn revoke_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool>;

    /// Check whether a user holds the given rights on a node.
    ///
    /// The binary transport is degraded here: it answers `false` without
    /// consulting the service (a documented transport asymmetry, mirroring
    /// its other omissions). Use the text transport for authoritative ACL
    /// answers.
    async fn check_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool>;

    /// Grant rights to many users; per-item success/failure capture, no
    /// atomicity across items.
    async fn batch_grant(
        &self,
        node_id: NodeId,
        entries: &[AclEntry],
    ) -> EngramResult<BatchGrantReport>;

    // -- User directory --

    /// Look up a user (text transport only).
    async fn get_user(&self, user_id: UserId) -> EngramResult<User>;

    /// List known users (text transport only).
    async fn list_users(&self) -> EngramResult<Vec<User>>;

    /// Insert for a primary owner, then grant to additional owners.
    ///
    /// A composition of [`insert`](Self::insert) and
    /// [`batch_grant`](Self::batch_grant), not a primitive: the insert must
    /// succeed before any grant is attempted, and grant failures are reported
    /// per item without undoing the insert.
    async fn insert_with_acl(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        opts: InsertOptions,
        acl: &[AclEntry],
    ) -> EngramResult<InsertWithAclResult> {
        let insert = self.insert(node_id, text, metadata, opts).await?;
        let grants = self.batch_grant(node_id, acl).await?;
        Ok(InsertWithAclResult { insert, grants })
    }
}
