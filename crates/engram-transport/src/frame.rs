//! Wire frames for the binary transport.
//!
//! Every frame is a 4-byte big-endian length header followed by a
//! MessagePack-encoded [`WireMessage`]. The envelope `id` correlates
//! responses and stream events with the request that opened them. Metadata
//! documents cross the wire as opaque JSON byte payloads and are parsed back
//! on receipt.

use engram_types::{EngramError, NodeId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Current wire protocol version, exchanged in the Hello handshake.
pub const PROTOCOL_VERSION: u32 = 2;

/// Maximum single frame size (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Errors from the framing layer.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Closed,
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: u32, max: u32 },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<FrameError> for EngramError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(io) => EngramError::Io(io),
            FrameError::Closed => EngramError::Connection("connection closed".to_string()),
            FrameError::TooLarge { .. } => EngramError::Codec(e.to_string()),
            FrameError::Encode(m) | FrameError::Decode(m) => EngramError::Codec(m),
        }
    }
}

/// A wire frame envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Correlation ID: responses and events carry the id of the request that
    /// opened them. Id 0 is reserved for the Hello handshake.
    pub id: u64,
    /// Frame variant.
    #[serde(flatten)]
    pub kind: WireMessageKind,
}

/// The three frame directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessageKind {
    /// Client-to-server request.
    Request(WireRequest),
    /// Server-to-client reply to a request.
    Response(WireResponse),
    /// Server-push event on an open stream.
    Event(WireEvent),
}

/// Request frames. One variant per binary-supported operation, plus the
/// connect handshake and the client-streaming batch triplet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum WireRequest {
    /// Connect handshake; sent once, before any other frame.
    Hello {
        token: Option<String>,
        protocol_version: u32,
    },
    Health,
    Insert {
        node_id: NodeId,
        text: String,
        /// Metadata as an opaque JSON byte payload.
        metadata: Vec<u8>,
        user_id: UserId,
        session_id: Option<String>,
        embedding: Option<Vec<f32>>,
        run_id: Option<String>,
    },
    Search {
        query: String,
        user_id: UserId,
        k: u64,
        session_id: Option<String>,
        /// Filter document as an opaque JSON byte payload.
        filter: Option<Vec<u8>>,
        query_embedding: Option<Vec<f32>>,
        run_id: Option<String>,
    },
    Delete {
        node_id: NodeId,
        session_id: Option<String>,
    },
    DeleteRun {
        run_id: String,
    },
    CreateSession {
        user_id: UserId,
    },
    SnapshotSession {
        session_id: String,
    },
    LoadSession {
        session_id: String,
    },
    CommitSession {
        session_id: String,
    },
    DropSession {
        session_id: String,
    },
    WriteMemory {
        address: Vec<u64>,
        data: Vec<u64>,
        user_id: UserId,
    },
    ReadMemory {
        address: Vec<u64>,
        user_id: UserId,
    },
    WatchMemory {
        user_id: UserId,
    },
    AddEdge {
        from: NodeId,
        to: NodeId,
        relation: String,
        weight: f32,
    },
    GetNeighbors {
        node_id: NodeId,
        relation: Option<String>,
        limit: u64,
    },
    Traverse {
        start: NodeId,
        depth: u32,
        limit: u64,
    },
    Subscribe {
        filter: String,
        node_id: Option<NodeId>,
        query: Option<String>,
        threshold: Option<f32>,
    },
    /// Open a client-to-server batch stream.
    BatchOpen {
        user_id: UserId,
    },
    /// One document on an open batch stream.
    BatchDoc {
        node_id: Option<NodeId>,
        text: String,
        /// Metadata as an opaque JSON byte payload.
        metadata: Vec<u8>,
    },
    /// Close the batch stream; the server replies with the aggregate result.
    BatchClose,
    GrantPermission {
        node_id: NodeId,
        user_id: UserId,
        read: bool,
        write: bool,
        delete: bool,
    },
    RevokePermission {
        node_id: NodeId,
        user_id: UserId,
        read: bool,
        write: bool,
        delete: bool,
    },
}

/// A single search hit on the wire; metadata stays an opaque payload until
/// the transport parses it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSearchHit {
    pub id: NodeId,
    pub similarity: f32,
    pub metadata: Vec<u8>,
}

/// Response frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum WireResponse {
    HelloAck {
        protocol_version: u32,
        server_version: String,
    },
    Health {
        status: String,
        version: String,
    },
    InsertAck {
        success: bool,
        node_id: NodeId,
        message: String,
    },
    SearchResults {
        results: Vec<WireSearchHit>,
    },
    Deleted {
        success: bool,
    },
    RunDeleted {
        success: bool,
        message: String,
        count: u64,
    },
    SessionCreated {
        session_id: String,
    },
    SessionAck {
        success: bool,
    },
    MemoryAck {
        success: bool,
        message: String,
    },
    MemoryValue {
        value: Vec<u64>,
    },
    EdgeAdded {
        success: bool,
    },
    Neighbors {
        ids: Vec<NodeId>,
    },
    TraverseResult {
        ids: Vec<NodeId>,
    },
    /// Stream opened; events follow under the same envelope id.
    Subscribed,
    BatchResult {
        count: u64,
        node_ids: Vec<NodeId>,
    },
    GrantAck {
        success: bool,
    },
    RevokeAck {
        success: bool,
    },
    Error {
        code: i32,
        message: String,
    },
}

/// Server-push event frames, tagged with the opening request's envelope id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WireEvent {
    NodeInserted {
        node_id: NodeId,
        user_id: UserId,
        /// Metadata as an opaque JSON byte payload.
        metadata: Vec<u8>,
    },
    NodeDeleted {
        node_id: NodeId,
    },
    MemoryWritten {
        address: Vec<u64>,
        user_id: UserId,
    },
}

/// Encode a message to its framed byte form.
pub fn encode_frame(msg: &WireMessage) -> Result<Vec<u8>, FrameError> {
    let body = rmp_serde::to_vec_named(msg).map_err(|e| FrameError::Encode(e.to_string()))?;
    let len = body.len() as u32;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode a message from an unframed body.
pub fn decode_body(body: &[u8]) -> Result<WireMessage, FrameError> {
    rmp_serde::from_slice(body).map_err(|e| FrameError::Decode(e.to_string()))
}

/// Write one framed message.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &WireMessage,
) -> Result<(), FrameError> {
    let bytes = encode_frame(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. A clean EOF at a frame boundary is
/// [`FrameError::Closed`].
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WireMessage, FrameError> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::Closed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    decode_body(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let msg = WireMessage {
            id: 17,
            kind: WireMessageKind::Request(WireRequest::Insert {
                node_id: NodeId(5),
                text: "body".to_string(),
                metadata: serde_json::to_vec(&serde_json::json!({"k": "v"})).unwrap(),
                user_id: UserId(1),
                session_id: None,
                embedding: None,
                run_id: Some("run-a".to_string()),
            }),
        };
        let bytes = encode_frame(&msg).unwrap();
        assert_eq!(
            u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize,
            bytes.len() - 4
        );
        let back = decode_body(&bytes[4..]).unwrap();
        assert_eq!(back.id, 17);
        match back.kind {
            WireMessageKind::Request(WireRequest::Insert {
                node_id,
                run_id,
                metadata,
                ..
            }) => {
                assert_eq!(node_id, NodeId(5));
                assert_eq!(run_id.as_deref(), Some("run-a"));
                let parsed: serde_json::Value = serde_json::from_slice(&metadata).unwrap();
                assert_eq!(parsed["k"], "v");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_event_roundtrip() {
        let msg = WireMessage {
            id: 3,
            kind: WireMessageKind::Event(WireEvent::NodeDeleted { node_id: NodeId(8) }),
        };
        let bytes = encode_frame(&msg).unwrap();
        let back = decode_body(&bytes[4..]).unwrap();
        assert!(matches!(
            back.kind,
            WireMessageKind::Event(WireEvent::NodeDeleted { node_id }) if node_id == NodeId(8)
        ));
    }

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let msg = WireMessage {
            id: 1,
            kind: WireMessageKind::Request(WireRequest::Health),
        };
        write_frame(&mut a, &msg).await.unwrap();
        let back = read_frame(&mut b).await.unwrap();
        assert_eq!(back.id, 1);
        assert!(matches!(
            back.kind,
            WireMessageKind::Request(WireRequest::Health)
        ));
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        match read_frame(&mut b).await {
            Err(FrameError::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let bogus = (MAX_FRAME_SIZE + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut a, &bogus)
            .await
            .unwrap();
        match read_frame(&mut b).await {
            Err(FrameError::TooLarge { size, .. }) => assert_eq!(size, MAX_FRAME_SIZE + 1),
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }
}
