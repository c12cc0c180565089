//! Priority tree error types
//!
//! The engine is designed so that protocol-shaped input never fails: weights
//! are clamped by the wire type, unknown dependencies resolve to implicit
//! virtual parents, and cycles are rewritten into legal reparent operations
//! (RFC 7540 Section 5.3.3). The variants below cover the remaining
//! programmer-error cases only.

use crate::types::StreamId;

/// Priority tree errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A stream was asked to depend on itself
    #[error("Stream {0} cannot depend on itself")]
    SelfDependency(StreamId),

    /// A handle referenced a stream that is no longer in the tree
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// A stream id was added twice while still live
    #[error("Stream already exists: {0}")]
    StreamExists(StreamId),

    /// Stream id 0 is the connection control stream and roots the tree
    #[error("Stream id 0 is reserved for the tree root")]
    ReservedStreamId,

    /// A priority-only node was requested while virtual nodes are disabled
    #[error("Virtual nodes are disabled (max virtual nodes is 0)")]
    VirtualNodesDisabled,
}

/// Result type for priority tree operations
pub type Result<T> = std::result::Result<T, Error>;
