//! Orchestrating client for the Engram store.
//!
//! [`EngramClient`] exposes the full capability contract to callers and owns
//! transport selection: forced binary, forced text, or automatic with a
//! single sanctioned fallback from binary to text. It also injects the
//! client's default run scope into scoped operations.
//!
//! [`ingest_documents`] layers a bounded-concurrency bulk ingestion engine on
//! top of the client's batch operation.

pub mod client;
pub mod config;
pub mod ingest;

#[cfg(test)]
pub(crate) mod testing;

pub use client::EngramClient;
pub use config::{ClientConfig, TransportMode};
pub use ingest::{ingest_documents, IngestOptions, IngestReport};
