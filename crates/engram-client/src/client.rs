//! The orchestrating client: transport selection and run-scope injection.

use crate::config::{ClientConfig, TransportMode};
use engram_transport::{BinaryTransport, EventStream, StorageTransport, TextTransport, TransportKind};
use engram_types::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, EngramError,
    EngramResult, GraphSample, Health, InsertOptions, InsertResult, InsertWithAclResult, NodeId,
    PermissionSet, SdmAddress, SdmValue, SearchOptions, SearchResult, SessionId, SubscribeOptions,
    TraverseOptions, User, UserId, WriteAck,
};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Unified entry point to the Engram store.
///
/// Owns one connected transport and a default run scope. All contract
/// operations are exposed by delegation; `insert`, `search`, and
/// `delete_run` resolve their effective run scope first (explicit per-call
/// scope, then the client default, then none).
pub struct EngramClient {
    transport: Arc<dyn StorageTransport>,
    default_run_id: RwLock<Option<String>>,
}

impl EngramClient {
    /// Connect according to the configured transport mode.
    ///
    /// Forced modes propagate their connect failure unchanged. In
    /// [`TransportMode::Auto`], a binary connect failure is logged and
    /// swallowed, and the text transport is connected instead. This is the only
    /// sanctioned fallback in the system; the caller never observes the
    /// binary failure.
    pub async fn connect(config: &ClientConfig) -> EngramResult<Self> {
        if !config.enabled {
            return Err(EngramError::Validation(
                "storage client is disabled by configuration".to_string(),
            ));
        }

        let transport: Arc<dyn StorageTransport> = match config.mode {
            TransportMode::Binary => {
                let binary =
                    BinaryTransport::new(&config.host, config.binary_port, config.auth_token.clone());
                binary.connect().await?;
                Arc::new(binary)
            }
            TransportMode::Text => {
                let text =
                    TextTransport::new(&config.host, config.text_port, config.auth_token.clone())?;
                text.connect().await?;
                Arc::new(text)
            }
            TransportMode::Auto => {
                let binary =
                    BinaryTransport::new(&config.host, config.binary_port, config.auth_token.clone());
                match binary.connect().await {
                    Ok(_) => Arc::new(binary) as Arc<dyn StorageTransport>,
                    Err(e) => {
                        warn!(error = %e, "binary transport unavailable, falling back to text");
                        let text = TextTransport::new(
                            &config.host,
                            config.text_port,
                            config.auth_token.clone(),
                        )?;
                        text.connect().await?;
                        Arc::new(text)
                    }
                }
            }
        };

        info!(transport = %transport.kind(), "storage client connected");
        Ok(Self {
            transport,
            default_run_id: RwLock::new(config.run_id.clone()),
        })
    }

    /// Wrap an already-connected transport. Used by the outer facade and by
    /// tests that inject a mock.
    pub fn with_transport(
        transport: Arc<dyn StorageTransport>,
        default_run_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            default_run_id: RwLock::new(default_run_id),
        }
    }

    /// Which transport is active.
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// The current default run scope.
    pub fn run_id(&self) -> Option<String> {
        self.default_run_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the default run scope.
    pub fn set_run_id(&self, run_id: Option<String>) {
        *self
            .default_run_id
            .write()
            .unwrap_or_else(|e| e.into_inner()) = run_id;
    }

    /// Effective scope: explicit per-call value, then the client default.
    fn resolve_scope(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.run_id())
    }

    /// Service health and version.
    pub async fn health(&self) -> EngramResult<Health> {
        self.transport.health().await
    }

    /// Tear down the underlying connection.
    pub async fn disconnect(&self) -> EngramResult<()> {
        self.transport.disconnect().await
    }

    /// Insert a node, tagging it with the effective run scope.
    pub async fn insert(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        mut opts: InsertOptions,
    ) -> EngramResult<InsertResult> {
        opts.run_id = self.resolve_scope(opts.run_id.take());
        self.transport.insert(node_id, text, metadata, opts).await
    }

    /// Similarity search within the effective run scope.
    pub async fn search(
        &self,
        query: &str,
        mut opts: SearchOptions,
    ) -> EngramResult<Vec<SearchResult>> {
        opts.run_id = self.resolve_scope(opts.run_id.take());
        self.transport.search(query, opts).await
    }

    /// Delete a single node.
    pub async fn delete(
        &self,
        node_id: NodeId,
        session_id: Option<&SessionId>,
    ) -> EngramResult<bool> {
        self.transport.delete(node_id, session_id).await
    }

    /// Delete everything written under a run scope.
    ///
    /// The scope must resolve: either passed here or set as the client
    /// default. An unresolvable scope is a validation failure, never a
    /// store-wide deletion.
    pub async fn delete_run(&self, run_id: Option<&str>) -> EngramResult<DeleteRunResult> {
        let scope = self
            .resolve_scope(run_id.map(str::to_string))
            .ok_or_else(|| {
                EngramError::Validation(
                    "delete_run requires a run scope: pass one explicitly or set a default"
                        .to_string(),
                )
            })?;
        self.transport.delete_run(&scope).await
    }

    /// Create a new working branch of the store.
    pub async fn create_session(&self, user_id: UserId) -> EngramResult<SessionId> {
        self.transport.create_session(user_id).await
    }

    /// Snapshot the session's current state.
    pub async fn snapshot_session(&self, session: &SessionId) -> EngramResult<bool> {
        self.transport.snapshot_session(session).await
    }

    /// Restore the session to its last snapshot.
    pub async fn load_session(&self, session: &SessionId) -> EngramResult<bool> {
        self.transport.load_session(session).await
    }

    /// Merge the session into the main branch.
    pub async fn commit_session(&self, session: &SessionId) -> EngramResult<bool> {
        self.transport.commit_session(session).await
    }

    /// Discard the session.
    pub async fn drop_session(&self, session: &SessionId) -> EngramResult<bool> {
        self.transport.drop_session(session).await
    }

    /// Write a value into the neighborhood of an address.
    pub async fn write_memory(
        &self,
        address: &SdmAddress,
        data: &SdmValue,
        user_id: UserId,
    ) -> EngramResult<WriteAck> {
        self.transport.write_memory(address, data, user_id).await
    }

    /// Read the aggregated value nearest to an address.
    pub async fn read_memory(
        &self,
        address: &SdmAddress,
        user_id: UserId,
    ) -> EngramResult<SdmValue> {
        self.transport.read_memory(address, user_id).await
    }

    /// Live stream of memory writes (binary transport only).
    pub async fn watch_memory(&self, user_id: UserId) -> EngramResult<EventStream> {
        self.transport.watch_memory(user_id).await
    }

    /// Add a directed labeled edge.
    pub async fn add_edge(&self, edge: &Edge) -> EngramResult<bool> {
        self.transport.add_edge(edge).await
    }

    /// Direct neighbors of a node.
    pub async fn get_neighbors(
        &self,
        node_id: NodeId,
        relation: Option<&str>,
        limit: usize,
    ) -> EngramResult<Vec<NodeId>> {
        self.transport.get_neighbors(node_id, relation, limit).await
    }

    /// Breadth-bounded traversal from a start node.
    pub async fn traverse(
        &self,
        start: NodeId,
        opts: TraverseOptions,
    ) -> EngramResult<Vec<NodeId>> {
        self.transport.traverse(start, opts).await
    }

    /// A random sample of the stored graph (text transport only).
    pub async fn sample_graph(&self, limit: usize) -> EngramResult<GraphSample> {
        self.transport.sample_graph(limit).await
    }

    /// Live event subscription (binary transport only).
    pub async fn subscribe(&self, opts: SubscribeOptions) -> EngramResult<EventStream> {
        self.transport.subscribe(opts).await
    }

    /// Insert many documents in one operation.
    pub async fn batch_insert(
        &self,
        documents: &[Document],
        user_id: UserId,
    ) -> EngramResult<BatchInsertResult> {
        self.transport.batch_insert(documents, user_id).await
    }

    /// Grant rights on a node to a user.
    pub async fn grant_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        self.transport
            .grant_permission(node_id, user_id, permissions)
            .await
    }

    /// Revoke rights on a node from a user.
    pub async fn revoke_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        self.transport
            .revoke_permission(node_id, user_id, permissions)
            .await
    }

    /// Check rights on a node (degraded on the binary transport; see the
    /// contract docs).
    pub async fn check_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        self.transport
            .check_permission(node_id, user_id, permissions)
            .await
    }

    /// Grant rights to many users with per-item capture.
    pub async fn batch_grant(
        &self,
        node_id: NodeId,
        entries: &[AclEntry],
    ) -> EngramResult<BatchGrantReport> {
        self.transport.batch_grant(node_id, entries).await
    }

    /// Insert for a primary owner, then grant to additional owners.
    pub async fn insert_with_acl(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        mut opts: InsertOptions,
        acl: &[AclEntry],
    ) -> EngramResult<InsertWithAclResult> {
        opts.run_id = self.resolve_scope(opts.run_id.take());
        self.transport
            .insert_with_acl(node_id, text, metadata, opts, acl)
            .await
    }

    /// Look up a user (text transport only).
    pub async fn get_user(&self, user_id: UserId) -> EngramResult<User> {
        self.transport.get_user(user_id).await
    }

    /// List known users (text transport only).
    pub async fn list_users(&self) -> EngramResult<Vec<User>> {
        self.transport.list_users().await
    }
}
