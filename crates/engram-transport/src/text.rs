//! Text transport: stateless request/response REST calls.
//!
//! Every operation is an independent HTTP call against `/api/v1/...`; there
//! is no streaming primitive, so `subscribe` and `watch_memory` reject
//! immediately with an unsupported-operation error instead of blocking.
//!
//! [`TextTransport::login`] exchanges credentials for a bearer token which is
//! then attached to every subsequent request from this instance; a static
//! token handed to the constructor is used directly.

use crate::contract::{EventStream, StorageTransport, TransportKind};
use async_trait::async_trait;
use engram_types::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, EngramError,
    EngramResult, GraphSample, Health, InsertOptions, InsertResult, NodeId, PermissionSet,
    SdmAddress, SdmValue, SdmVector, SearchOptions, SearchResult, SessionId, SubscribeOptions,
    TraverseOptions, User, UserId, WriteAck,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::RwLock;
use tracing::debug;
use url::Url;

const TRANSPORT: &str = "text";

#[derive(Debug, Deserialize)]
struct SuccessBody {
    success: bool,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueBody {
    value: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct IdsBody {
    ids: Vec<NodeId>,
}

#[derive(Debug, Deserialize)]
struct AllowedBody {
    allowed: bool,
}

/// The text transport. See the module docs for the call model.
pub struct TextTransport {
    base: Url,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl TextTransport {
    /// Create a transport for `http://host:port/api/v1/`, optionally with a
    /// pre-issued bearer token.
    pub fn new(host: &str, port: u16, token: Option<String>) -> EngramResult<Self> {
        let base = Url::parse(&format!("http://{host}:{port}/api/v1/"))
            .map_err(|e| EngramError::Validation(format!("invalid endpoint: {e}")))?;
        Ok(Self {
            base,
            http: reqwest::Client::new(),
            token: RwLock::new(token),
        })
    }

    /// Exchange credentials for a bearer token; all subsequent requests from
    /// this instance carry it.
    pub async fn login(&self, username: &str, password: &str) -> EngramResult<()> {
        let url = self.url("auth/login")?;
        let body = json!({ "username": username, "password": password });
        let resp = self.execute(self.http.post(url).json(&body)).await?;
        let body: TokenBody = Self::json(resp).await?;
        *self
            .token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(body.token);
        debug!(%username, "text transport logged in");
        Ok(())
    }

    fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn url(&self, path: &str) -> EngramResult<Url> {
        self.base
            .join(path)
            .map_err(|e| EngramError::Validation(format!("invalid endpoint path {path}: {e}")))
    }

    /// Attach the bearer token, send, and map non-success statuses to
    /// [`EngramError::Remote`] with the response body as the diagnostic.
    async fn execute(&self, rb: reqwest::RequestBuilder) -> EngramResult<reqwest::Response> {
        let rb = match self.bearer() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        };
        let resp = rb
            .send()
            .await
            .map_err(|e| EngramError::Connection(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(EngramError::Remote {
                code: status.as_u16() as i32,
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            })
        }
    }

    async fn json<T: DeserializeOwned>(resp: reqwest::Response) -> EngramResult<T> {
        resp.json::<T>()
            .await
            .map_err(|e| EngramError::Codec(e.to_string()))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> EngramResult<T> {
        let url = self.url(path)?;
        let resp = self.execute(self.http.post(url).json(body)).await?;
        Self::json(resp).await
    }
}

#[async_trait]
impl StorageTransport for TextTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Text
    }

    async fn connect(&self) -> EngramResult<bool> {
        // Stateless transport: connecting is a reachability probe.
        let health = self.health().await?;
        debug!(status = %health.status, version = %health.version, "text transport connected");
        Ok(true)
    }

    async fn disconnect(&self) -> EngramResult<()> {
        *self
            .token
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    async fn health(&self) -> EngramResult<Health> {
        let url = self.url("health")?;
        let resp = self.execute(self.http.get(url)).await?;
        Self::json(resp).await
    }

    async fn insert(
        &self,
        node_id: NodeId,
        text: &str,
        metadata: &serde_json::Value,
        opts: InsertOptions,
    ) -> EngramResult<InsertResult> {
        let body = json!({
            "node_id": node_id,
            "text": text,
            "metadata": metadata,
            "user_id": opts.user_id,
            "session_id": opts.session_id,
            "embedding": opts.embedding,
            "run_id": opts.run_id,
        });
        self.post_json("nodes", &body).await
    }

    async fn search(&self, query: &str, opts: SearchOptions) -> EngramResult<Vec<SearchResult>> {
        let body = json!({
            "query": query,
            "user_id": opts.user_id,
            "k": opts.k,
            "session_id": opts.session_id,
            "filter": opts.filter,
            "query_embedding": opts.query_embedding,
            "run_id": opts.run_id,
        });
        self.post_json("search", &body).await
    }

    async fn delete(&self, node_id: NodeId, session_id: Option<&SessionId>) -> EngramResult<bool> {
        let url = self.url(&format!("nodes/{node_id}"))?;
        let mut rb = self.http.delete(url);
        if let Some(session) = session_id {
            rb = rb.query(&[("session_id", session.as_str())]);
        }
        let resp = self.execute(rb).await?;
        let body: SuccessBody = Self::json(resp).await?;
        Ok(body.success)
    }

    async fn delete_run(&self, run_id: &str) -> EngramResult<DeleteRunResult> {
        let url = self.url(&format!("runs/{run_id}"))?;
        let resp = self.execute(self.http.delete(url)).await?;
        Self::json(resp).await
    }

    async fn create_session(&self, user_id: UserId) -> EngramResult<SessionId> {
        let body: SessionBody = self
            .post_json("sessions", &json!({ "user_id": user_id }))
            .await?;
        Ok(SessionId(body.session_id))
    }

    async fn snapshot_session(&self, session: &SessionId) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                &format!("sessions/{}/snapshot", session.as_str()),
                &serde_json::Value::Null,
            )
            .await?;
        Ok(body.success)
    }

    async fn load_session(&self, session: &SessionId) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                &format!("sessions/{}/load", session.as_str()),
                &serde_json::Value::Null,
            )
            .await?;
        Ok(body.success)
    }

    async fn commit_session(&self, session: &SessionId) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                &format!("sessions/{}/commit", session.as_str()),
                &serde_json::Value::Null,
            )
            .await?;
        Ok(body.success)
    }

    async fn drop_session(&self, session: &SessionId) -> EngramResult<bool> {
        let url = self.url(&format!("sessions/{}", session.as_str()))?;
        let resp = self.execute(self.http.delete(url)).await?;
        let body: SuccessBody = Self::json(resp).await?;
        Ok(body.success)
    }

    async fn write_memory(
        &self,
        address: &SdmAddress,
        data: &SdmValue,
        user_id: UserId,
    ) -> EngramResult<WriteAck> {
        let body = json!({
            "address": address.chunks(),
            "data": data.chunks(),
            "user_id": user_id,
        });
        self.post_json("memory/write", &body).await
    }

    async fn read_memory(&self, address: &SdmAddress, user_id: UserId) -> EngramResult<SdmValue> {
        let body = json!({ "address": address.chunks(), "user_id": user_id });
        let value: ValueBody = self.post_json("memory/read", &body).await?;
        SdmVector::from_chunks(value.value)
    }

    async fn watch_memory(&self, _user_id: UserId) -> EngramResult<EventStream> {
        EngramError::unsupported(TRANSPORT, "watch_memory")
    }

    async fn add_edge(&self, edge: &Edge) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                "graph/edges",
                &json!({
                    "from": edge.from,
                    "to": edge.to,
                    "relation": edge.relation,
                    "weight": edge.weight,
                }),
            )
            .await?;
        Ok(body.success)
    }

    async fn get_neighbors(
        &self,
        node_id: NodeId,
        relation: Option<&str>,
        limit: usize,
    ) -> EngramResult<Vec<NodeId>> {
        let url = self.url("graph/neighbors")?;
        let mut rb = self.http.get(url).query(&[
            ("node_id", node_id.to_string()),
            ("limit", limit.to_string()),
        ]);
        if let Some(relation) = relation {
            rb = rb.query(&[("relation", relation)]);
        }
        let resp = self.execute(rb).await?;
        let body: IdsBody = Self::json(resp).await?;
        Ok(body.ids)
    }

    async fn traverse(&self, start: NodeId, opts: TraverseOptions) -> EngramResult<Vec<NodeId>> {
        let body: IdsBody = self
            .post_json(
                "graph/traverse",
                &json!({ "start": start, "depth": opts.depth, "limit": opts.limit }),
            )
            .await?;
        Ok(body.ids)
    }

    async fn sample_graph(&self, limit: usize) -> EngramResult<GraphSample> {
        let url = self.url("graph/sample")?;
        let resp = self
            .execute(self.http.get(url).query(&[("limit", limit.to_string())]))
            .await?;
        Self::json(resp).await
    }

    async fn subscribe(&self, _opts: SubscribeOptions) -> EngramResult<EventStream> {
        EngramError::unsupported(TRANSPORT, "subscribe")
    }

    async fn batch_insert(
        &self,
        documents: &[Document],
        user_id: UserId,
    ) -> EngramResult<BatchInsertResult> {
        let body = json!({ "user_id": user_id, "documents": documents });
        self.post_json("nodes/batch", &body).await
    }

    async fn grant_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                "acl/grant",
                &json!({
                    "node_id": node_id,
                    "user_id": user_id,
                    "read": permissions.read,
                    "write": permissions.write,
                    "delete": permissions.delete,
                }),
            )
            .await?;
        Ok(body.success)
    }

    async fn revoke_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        let body: SuccessBody = self
            .post_json(
                "acl/revoke",
                &json!({
                    "node_id": node_id,
                    "user_id": user_id,
                    "read": permissions.read,
                    "write": permissions.write,
                    "delete": permissions.delete,
                }),
            )
            .await?;
        Ok(body.success)
    }

    async fn check_permission(
        &self,
        node_id: NodeId,
        user_id: UserId,
        permissions: PermissionSet,
    ) -> EngramResult<bool> {
        let body: AllowedBody = self
            .post_json(
                "acl/check",
                &json!({
                    "node_id": node_id,
                    "user_id": user_id,
                    "read": permissions.read,
                    "write": permissions.write,
                    "delete": permissions.delete,
                }),
            )
            .await?;
        Ok(body.allowed)
    }

    /// Sequential per-item loop; there is no atomicity across items and a
    /// failed grant never aborts the rest.
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
                        report
                            .errors
                            .push(format!("grant to user {} was rejected", entry.user_id));
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

    async fn get_user(&self, user_id: UserId) -> EngramResult<User> {
        let url = self.url(&format!("users/{user_id}"))?;
        let resp = self.execute(self.http.get(url)).await?;
        Self::json(resp).await
    }

    async fn list_users(&self) -> EngramResult<Vec<User>> {
        let url = self.url("users")?;
        let resp = self.execute(self.http.get(url)).await?;
        Self::json(resp).await
    }
}
