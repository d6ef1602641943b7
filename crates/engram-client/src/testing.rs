//! Shared mock transport for unit tests.

use async_trait::async_trait;
use engram_transport::{EventStream, StorageTransport, TransportKind};
use engram_types::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, EngramError,
    EngramResult, GraphSample, Health, InsertOptions, InsertResult, NodeId, PermissionSet,
    SdmAddress, SdmValue, SearchOptions, SearchResult, SessionId, SubscribeOptions,
    TraverseOptions, User, UserId, WriteAck,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Recording transport: captures the run scopes that reach it and lets tests
/// fail chosen `batch_insert` calls.
#[derive(Default)]
pub struct MockTransport {
    insert_scopes: Mutex<Vec<Option<String>>>,
    search_scopes: Mutex<Vec<Option<String>>>,
    deleted_runs: Mutex<Vec<String>>,
    batch_calls: AtomicU64,
    failing_batches: Mutex<HashSet<u64>>,
}

impl MockTransport {
    /// A mock whose Nth (0-based) `batch_insert` calls fail remotely.
    pub fn failing(indices: impl IntoIterator<Item = u64>) -> Self {
        let mock = Self::default();
        *mock.failing_batches.lock().unwrap() = indices.into_iter().collect();
        mock
    }

    pub fn insert_scopes(&self) -> Vec<Option<String>> {
        self.insert_scopes.lock().unwrap().clone()
    }

    pub fn search_scopes(&self) -> Vec<Option<String>> {
        self.search_scopes.lock().unwrap().clone()
    }

    pub fn deleted_runs(&self) -> Vec<String> {
        self.deleted_runs.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StorageTransport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Binary
    }

    async fn connect(&self) -> EngramResult<bool> {
        Ok(true)
    }

    async fn disconnect(&self) -> EngramResult<()> {
        Ok(())
    }

    async fn health(&self) -> EngramResult<Health> {
        Ok(Health {
            status: "ok".to_string(),
            version: "mock".to_string(),
        })
    }

    async fn insert(
        &self,
        node_id: NodeId,
        _text: &str,
        _metadata: &serde_json::Value,
        opts: InsertOptions,
    ) -> EngramResult<InsertResult> {
        self.insert_scopes.lock().unwrap().push(opts.run_id);
        Ok(InsertResult {
            success: true,
            node_id,
            message: String::new(),
        })
    }

    async fn search(&self, _query: &str, opts: SearchOptions) -> EngramResult<Vec<SearchResult>> {
        self.search_scopes.lock().unwrap().push(opts.run_id);
        Ok(Vec::new())
    }

    async fn delete(
        &self,
        _node_id: NodeId,
        _session_id: Option<&SessionId>,
    ) -> EngramResult<bool> {
        Ok(true)
    }

    async fn delete_run(&self, run_id: &str) -> EngramResult<DeleteRunResult> {
        self.deleted_runs.lock().unwrap().push(run_id.to_string());
        Ok(DeleteRunResult {
            success: true,
            message: run_id.to_string(),
            count: 0,
        })
    }

    async fn create_session(&self, _user_id: UserId) -> EngramResult<SessionId> {
        Ok(SessionId::new("mock-session"))
    }

    async fn snapshot_session(&self, _session: &SessionId) -> EngramResult<bool> {
        Ok(true)
    }

    async fn load_session(&self, _session: &SessionId) -> EngramResult<bool> {
        Ok(true)
    }

    async fn commit_session(&self, _session: &SessionId) -> EngramResult<bool> {
        Ok(true)
    }

    async fn drop_session(&self, _session: &SessionId) -> EngramResult<bool> {
        Ok(true)
    }

    async fn write_memory(
        &self,
        _address: &SdmAddress,
        _data: &SdmValue,
        _user_id: UserId,
    ) -> EngramResult<WriteAck> {
        Ok(WriteAck {
            success: true,
            message: String::new(),
        })
    }

    async fn read_memory(&self, address: &SdmAddress, _user_id: UserId) -> EngramResult<SdmValue> {
        Ok(*address)
    }

    async fn watch_memory(&self, _user_id: UserId) -> EngramResult<EventStream> {
        EngramError::unsupported("mock", "watch_memory")
    }

    async fn add_edge(&self, _edge: &Edge) -> EngramResult<bool> {
        Ok(true)
    }

    async fn get_neighbors(
        &self,
        _node_id: NodeId,
        _relation: Option<&str>,
        _limit: usize,
    ) -> EngramResult<Vec<NodeId>> {
        Ok(Vec::new())
    }

    async fn traverse(
        &self,
        _start: NodeId,
        _opts: TraverseOptions,
    ) -> EngramResult<Vec<NodeId>> {
        Ok(Vec::new())
    }

    async fn sample_graph(&self, _limit: usize) -> EngramResult<GraphSample> {
        EngramError::unsupported("mock", "sample_graph")
    }

    async fn subscribe(&self, _opts: SubscribeOptions) -> EngramResult<EventStream> {
        EngramError::unsupported("mock", "subscribe")
    }

    async fn batch_insert(
        &self,
        documents: &[Document],
        _user_id: UserId,
    ) -> EngramResult<BatchInsertResult> {
        let call = self.batch_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_batches.lock().unwrap().contains(&call) {
            return Err(EngramError::Remote {
                code: 503,
                message: format!("batch {call} rejected"),
            });
        }
        Ok(BatchInsertResult {
            count: documents.len() as u64,
            node_ids: (0..documents.len() as u64).map(NodeId).collect(),
        })
    }

    async fn grant_permission(
        &self,
        _node_id: NodeId,
        _user_id: UserId,
        _permissions: PermissionSet,
    ) -> EngramResult<bool> {
        Ok(true)
    }

    async fn revoke_permission(
        &self,
        _node_id: NodeId,
        _user_id: UserId,
        _permissions: PermissionSet,
    ) -> EngramResult<bool> {
        Ok(true)
    }

    async fn check_permission(
        &self,
        _node_id: NodeId,
        _user_id: UserId,
        _permissions: PermissionSet,
    ) -> EngramResult<bool> {
        Ok(false)
    }

    async fn batch_grant(
        &self,
        _node_id: NodeId,
        entries: &[AclEntry],
    ) -> EngramResult<BatchGrantReport> {
        Ok(BatchGrantReport {
            total: entries.len() as u64,
            successful: entries.len() as u64,
            failed: 0,
            results: vec![true; entries.len()],
            errors: Vec::new(),
        })
    }

    async fn get_user(&self, _user_id: UserId) -> EngramResult<User> {
        EngramError::unsupported("mock", "get_user")
    }

    async fn list_users(&self) -> EngramResult<Vec<User>> {
        Ok(Vec::new())
    }
}
