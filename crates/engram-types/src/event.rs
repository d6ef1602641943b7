//! Events delivered over live subscriptions.

use crate::address::SdmAddress;
use crate::id::{NodeId, UserId};
use serde::{Deserialize, Serialize};

/// An event observed on a live subscription stream.
///
/// Ordering relative to concurrent writes is not specified by the contract;
/// consumers must not assume any interleaving guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A node was inserted (or re-inserted).
    NodeInserted {
        /// The node that was written.
        node_id: NodeId,
        /// The owning user.
        user_id: UserId,
        /// Metadata snapshot at insert time.
        #[serde(default)]
        metadata: serde_json::Value,
    },
    /// A node was deleted.
    NodeDeleted {
        /// The node that was removed.
        node_id: NodeId,
    },
    /// A sparse-memory cell neighborhood was written.
    MemoryWritten {
        /// Address targeted by the write.
        address: SdmAddress,
        /// The writing user.
        user_id: UserId,
    },
}
