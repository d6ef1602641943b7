//! Transport layer for the Engram store.
//!
//! One capability contract ([`StorageTransport`]), two implementations:
//!
//! - [`BinaryTransport`]: a persistent multiplexed RPC channel over framed
//!   TCP, with native streaming for subscriptions and batch upload.
//! - [`TextTransport`]: stateless request/response REST calls; no streaming
//!   primitive, streaming operations fail fast with an unsupported error.
//!
//! Both transports return structurally identical results for every operation
//! they both support; divergence is only permitted where an operation is
//! explicitly unsupported or degraded (see the per-method docs).

pub mod binary;
pub mod contract;
pub mod frame;
pub mod text;

pub use binary::BinaryTransport;
pub use contract::{EventStream, StorageTransport, TransportKind};
pub use text::TextTransport;
