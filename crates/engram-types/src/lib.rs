//! Core types for the Engram client access layer.
//!
//! This crate holds everything the two transports and the orchestrating
//! client share: domain records (nodes, search hits, sessions, memory
//! entries, permissions), per-operation option records with their defaults,
//! the error taxonomy, and the fixed-width address codec used for sparse
//! distributed memory. It performs no I/O.

pub mod address;
pub mod error;
pub mod event;
pub mod id;
pub mod options;
pub mod store;

pub use address::{SdmAddress, SdmValue, SdmVector};
pub use error::{EngramError, EngramResult};
pub use event::StoreEvent;
pub use id::{NodeId, SessionId, UserId};
pub use options::{InsertOptions, SearchOptions, SubscribeFilter, SubscribeOptions, TraverseOptions};
pub use store::{
    AclEntry, BatchGrantReport, BatchInsertResult, DeleteRunResult, Document, Edge, GraphSample,
    Health, InsertResult, InsertWithAclResult, MemoryEntry, Node, PermissionSet, SearchResult,
    User, WriteAck,
};
