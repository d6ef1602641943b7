//! Domain records exchanged with the Engram store.
//!
//! These are the shapes both transports must agree on: a result produced by
//! the binary transport is structurally identical to the same result produced
//! by the text transport.

use crate::id::{NodeId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored node in the semantic/graph store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique node ID.
    pub id: NodeId,
    /// The textual body of the node.
    pub text: String,
    /// Arbitrary metadata document.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Owning user.
    pub user_id: UserId,
    /// Session this node belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Embedding vector, when computed client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Run scope this node was written under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// A directed, labeled, weighted edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Relation label.
    pub relation: String,
    /// Edge weight.
    pub weight: f32,
}

/// A single similarity-search hit. Read-only; never persisted client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matching node.
    pub id: NodeId,
    /// Similarity score as computed by the remote service.
    pub similarity: f32,
    /// Metadata snapshot taken at match time.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A short-lived per-session note, independent from [`Node`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique entry ID.
    pub id: String,
    /// Session the entry belongs to.
    pub session_id: SessionId,
    /// Agent that wrote the entry.
    pub agent_id: String,
    /// The note content.
    pub content: String,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the entry expires, if it does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl MemoryEntry {
    /// A fresh entry with a generated ID and the current timestamp.
    pub fn new(
        session_id: SessionId,
        agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            agent_id: agent_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
            expires_at: None,
        }
    }
}

/// Per-(node, user) access rights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    /// May read the node.
    pub read: bool,
    /// May re-insert (mutate) the node.
    pub write: bool,
    /// May delete the node.
    pub delete: bool,
}

impl PermissionSet {
    /// Read-only access.
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            delete: false,
        }
    }

    /// Full access.
    pub fn all() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
        }
    }
}

/// A user to grant permissions to, paired with the rights to grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    /// The grantee.
    pub user_id: UserId,
    /// Rights granted.
    pub permissions: PermissionSet,
}

/// A user known to the service's directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Contact address, when registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Service health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Service status string (e.g. `"ok"`).
    pub status: String,
    /// Service version string.
    pub version: String,
}

/// Result of an `insert` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResult {
    /// Whether the insert was applied.
    pub success: bool,
    /// The node that was written.
    pub node_id: NodeId,
    /// Service diagnostic message.
    #[serde(default)]
    pub message: String,
}

/// Result of a `delete_run` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRunResult {
    /// Whether the run deletion was applied.
    pub success: bool,
    /// Service diagnostic message.
    #[serde(default)]
    pub message: String,
    /// Number of records removed under the scope.
    pub count: u64,
}

/// Acknowledgement of a sparse-memory write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteAck {
    /// Whether the write was applied.
    pub success: bool,
    /// Service diagnostic message.
    #[serde(default)]
    pub message: String,
}

/// Aggregate result of a batch insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchInsertResult {
    /// Number of documents inserted.
    pub count: u64,
    /// IDs assigned to the inserted documents.
    pub node_ids: Vec<NodeId>,
}

/// Per-item outcome report of a batch grant.
///
/// Batch grants never fail wholesale for a single item; failures are captured
/// per item and the rest proceed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchGrantReport {
    /// Number of grants attempted.
    pub total: u64,
    /// Number that succeeded.
    pub successful: u64,
    /// Number that failed.
    pub failed: u64,
    /// Per-item success flags, in input order.
    pub results: Vec<bool>,
    /// Error messages for the failed items.
    pub errors: Vec<String>,
}

/// Result of `insert_with_acl`: the insert outcome plus the grant report for
/// the additional owners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertWithAclResult {
    /// Outcome of the underlying insert.
    pub insert: InsertResult,
    /// Outcome of the follow-up grants.
    pub grants: BatchGrantReport,
}

/// A random sample of the stored graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSample {
    /// Sampled node IDs.
    pub nodes: Vec<NodeId>,
    /// Sampled edges.
    pub edges: Vec<Edge>,
}

/// A document handed to bulk ingestion / batch insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Explicit node ID; the service assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    /// The textual body.
    pub text: String,
    /// Arbitrary metadata document.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Document {
    /// A document with text only.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_roundtrip() {
        let node = Node {
            id: NodeId(7),
            text: "the cat sat on the mat".to_string(),
            metadata: serde_json::json!({"lang": "en"}),
            user_id: UserId(1),
            session_id: Some(SessionId::new("s-1")),
            embedding: Some(vec![0.1, 0.2]),
            run_id: Some("run-a".to_string()),
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, NodeId(7));
        assert_eq!(back.run_id.as_deref(), Some("run-a"));
    }

    #[test]
    fn test_permission_set_helpers() {
        assert!(PermissionSet::read_only().read);
        assert!(!PermissionSet::read_only().write);
        assert!(PermissionSet::all().delete);
        assert_eq!(PermissionSet::default(), PermissionSet {
            read: false,
            write: false,
            delete: false
        });
    }

    #[test]
    fn test_search_result_missing_metadata_defaults_to_null() {
        let hit: SearchResult = serde_json::from_str(r#"{"id": 3, "similarity": 0.91}"#).unwrap();
        assert_eq!(hit.id, NodeId(3));
        assert!(hit.metadata.is_null());
    }

    #[test]
    fn test_memory_entry_new_generates_distinct_ids() {
        let a = MemoryEntry::new(SessionId::new("s-1"), "agent-1", "note");
        let b = MemoryEntry::new(SessionId::new("s-1"), "agent-1", "note");
        assert_ne!(a.id, b.id);
        assert!(a.expires_at.is_none());
    }

    #[test]
    fn test_document_text_constructor() {
        let doc = Document::text("hello");
        assert!(doc.id.is_none());
        assert!(doc.metadata.is_null());
    }
}
