//! Core types of the QBFT message contract.
//!
//! The state machine never sees raw wire bytes.  It consumes anything that
//! implements [`QbftMsg`] and compares values by their [`ValueHash`] handle;
//! resolving a handle back to the full payload is the transport's job.

use crate::duty::Duty;

/// The QBFT step a message belongs to.
///
/// The `i64` codes are the stable wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum MsgType {
    /// Leader proposal opening a round.
    PrePrepare = 1,
    /// Echo of a proposal a node is willing to commit to.
    Prepare = 2,
    /// Vote to finalise a prepared value.
    Commit = 3,
    /// Request to abandon the current round.
    RoundChange = 4,
    /// Announcement of a decided value with its commit quorum.
    Decided = 5,
}

impl MsgType {
    /// Stable wire code for this message type.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for MsgType {
    type Error = UnknownMsgType;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(MsgType::PrePrepare),
            2 => Ok(MsgType::Prepare),
            3 => Ok(MsgType::Commit),
            4 => Ok(MsgType::RoundChange),
            5 => Ok(MsgType::Decided),
            other => Err(UnknownMsgType(other)),
        }
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MsgType::PrePrepare => "pre_prepare",
            MsgType::Prepare => "prepare",
            MsgType::Commit => "commit",
            MsgType::RoundChange => "round_change",
            MsgType::Decided => "decided",
        };
        f.write_str(name)
    }
}

/// Error returned when decoding an unrecognised message-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown qbft message type code: {0}")]
pub struct UnknownMsgType(pub i64);

/// A 32-byte content hash identifying a value under agreement.
///
/// The hash is computed over the value's serialized form, so it doubles as
/// a commitment: two operators quoting the same hash are talking about the
/// same bytes.  The all-zero hash is reserved as "absent".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct ValueHash(pub [u8; 32]);

impl ValueHash {
    /// The reserved "absent" hash.
    pub const ZERO: ValueHash = ValueHash([0u8; 32]);

    /// Whether this is the reserved absent hash.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Build from a byte slice; `None` unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::fmt::Debug for ValueHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ValueHash({self})")
    }
}

impl std::fmt::Display for ValueHash {
    /// Truncated hex, enough to eyeball log lines.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..")
    }
}

/// The message contract the QBFT state machine consumes.
///
/// Values travel as [`ValueHash`] handles only; implementors that received a
/// value inline are expected to surface its hash here.  `justification`
/// returns messages whose own justifications are empty — proofs are one
/// level deep by construction.
pub trait QbftMsg {
    fn msg_type(&self) -> MsgType;
    fn duty(&self) -> Duty;
    /// The sender's deterministic index in the operator set.
    fn peer_idx(&self) -> i64;
    fn round(&self) -> i64;
    /// Hash of the proposed value, or [`ValueHash::ZERO`].
    fn value(&self) -> ValueHash;
    /// Round in which the sender prepared, or 0 if unprepared.
    fn prepared_round(&self) -> i64;
    /// Hash of the prepared value, or [`ValueHash::ZERO`].
    fn prepared_value(&self) -> ValueHash;
    /// Messages proving a round change or prepared value.
    fn justification(&self) -> Vec<&dyn QbftMsg>;
}
