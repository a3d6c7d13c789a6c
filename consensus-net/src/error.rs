//! Error types for the consensus transport.

use thiserror::Error;

/// Errors that can occur in the consensus transport.
///
/// The transport never retries: send failures surface to the QBFT caller,
/// which handles them through round changes.  Cancellation is not an error
/// and has no variant here; cancelled waits return cleanly.
#[derive(Error, Debug)]
pub enum ConsensusNetError {
    /// A hash was quoted for which the value store has no payload.
    #[error("unknown value")]
    UnknownValue,

    /// An inbound message failed validation and was dropped.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A justification message failed validation.
    #[error("invalid justification: {0}")]
    InvalidJustification(String),

    /// Signing the outbound message failed.
    #[error("signing failed: {0}")]
    Sign(#[from] k256::ecdsa::Error),

    /// The P2P host rejected a send. The first failure aborts the
    /// broadcast; no retry at this layer.
    #[error("send to peer {peer_idx} failed: {reason}")]
    Send {
        /// Operator index of the destination peer.
        peer_idx: i64,
        /// Host-provided failure description.
        reason: String,
    },

    /// Message exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max} bytes)")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Failed to serialize or deserialize a message.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// The channel delivering messages to the QBFT state machine is closed.
    #[error("consensus channel closed")]
    ChannelClosed,
}

/// Convenience result type for consensus transport operations.
pub type Result<T> = std::result::Result<T, ConsensusNetError>;
