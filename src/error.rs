//! Error types, one per module boundary, composed the way the teacher's
//! `NetworkError` (`network.rs`) composes `#[from]` conversions.

use crate::identity::NodeId;
use thiserror::Error;

/// Errors parsing or encoding a wire frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown frame tag: {0}")]
    UnknownTag(String),

    #[error("invalid numeric field: {0}")]
    InvalidNumber(#[from] std::num::ParseFloatError),

    #[error("invalid integer field: {0}")]
    InvalidInteger(#[from] std::num::ParseIntError),

    #[error("payload contains a forbidden byte (`|` or CRLF)")]
    ForbiddenPayloadByte,
}

/// Errors at the link layer (TCP dial/accept/read/write).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Closed,

    #[error("identity handshake failed")]
    Handshake,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors surfaced by a routing agent's public API.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent mailbox closed")]
    MailboxClosed,

    #[error("link error: {0}")]
    Link(#[from] LinkError),
}

/// Errors surfaced by the network harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
