//! Per-operation option records.
//!
//! The contract operations take many optional parameters; rather than long
//! positional signatures, each operation gets one option record with the
//! defaults enumerated here:
//!
//! | Option | Default |
//! |---|---|
//! | `InsertOptions::user_id` | 1 |
//! | `SearchOptions::user_id` | 1 |
//! | `SearchOptions::k` | 10 |
//! | `TraverseOptions::depth` | 1 |
//! | `TraverseOptions::limit` | 100 |

use crate::id::{NodeId, SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Options for `insert`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertOptions {
    /// Owning user; defaults to user 1.
    #[serde(default)]
    pub user_id: UserId,
    /// Session to write into, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Precomputed embedding vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Run scope to tag the write with. When unset the client's default
    /// scope applies (see the orchestrating client).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl InsertOptions {
    /// Options scoped to a run.
    pub fn run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Default::default()
        }
    }
}

/// Options for `search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Searching user; defaults to user 1.
    #[serde(default)]
    pub user_id: UserId,
    /// Number of results to return.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Restrict to a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Metadata filter document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Precomputed query embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_embedding: Option<Vec<f32>>,
    /// Run scope to search within. When unset the client's default scope
    /// applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

fn default_k() -> usize {
    10
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            user_id: UserId::default(),
            k: default_k(),
            session_id: None,
            filter: None,
            query_embedding: None,
            run_id: None,
        }
    }
}

/// What a subscription should watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeFilter {
    /// Every store event.
    All,
    /// Events touching a single node.
    Node,
    /// Events whose content matches a query above a similarity threshold.
    Query,
}

/// Options for `subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Event filter kind.
    pub filter: SubscribeFilter,
    /// Node to watch (for [`SubscribeFilter::Node`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Query text (for [`SubscribeFilter::Query`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Similarity threshold (for [`SubscribeFilter::Query`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            filter: SubscribeFilter::All,
            node_id: None,
            query: None,
            threshold: None,
        }
    }
}

/// Options for `traverse`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TraverseOptions {
    /// Maximum traversal depth.
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Maximum number of nodes to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_depth() -> u32 {
    1
}

fn default_limit() -> usize {
    100
}

impl Default for TraverseOptions {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            limit: default_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_table() {
        assert_eq!(InsertOptions::default().user_id, UserId(1));
        let s = SearchOptions::default();
        assert_eq!(s.user_id, UserId(1));
        assert_eq!(s.k, 10);
        let t = TraverseOptions::default();
        assert_eq!(t.depth, 1);
        assert_eq!(t.limit, 100);
    }

    #[test]
    fn test_search_options_deserialize_fills_defaults() {
        let s: SearchOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(s.k, 10);
        assert_eq!(s.user_id, UserId(1));
    }

    #[test]
    fn test_insert_options_run_constructor() {
        let opts = InsertOptions::run("run-7");
        assert_eq!(opts.run_id.as_deref(), Some("run-7"));
        assert_eq!(opts.user_id, UserId(1));
    }
}
