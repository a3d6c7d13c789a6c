//! Duty identity for consensus instances.
//!
//! A duty is the unit of work a QDV cluster agrees on: one validator
//! obligation in one slot.  Each duty gets its own consensus instance, and
//! the duty is the key under which that instance's transport is registered.

use serde::{Deserialize, Serialize};

/// The kind of validator obligation a duty represents.
///
/// The `u8` codes are stable wire identifiers; new types are only ever
/// appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum DutyType {
    /// Propose a beacon block.
    Proposer = 1,
    /// Attest to a beacon block.
    Attester = 2,
    /// Aggregate attestations for a committee.
    Aggregator = 3,
    /// Produce a sync-committee contribution.
    SyncContribution = 4,
    /// Reveal the slot randao.
    Randao = 5,
    /// Sign a voluntary exit.
    Exit = 6,
}

impl DutyType {
    /// Stable wire code for this duty type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Lowercase name, also used as the `duty` metric label value.
    pub fn as_str(self) -> &'static str {
        match self {
            DutyType::Proposer => "proposer",
            DutyType::Attester => "attester",
            DutyType::Aggregator => "aggregator",
            DutyType::SyncContribution => "sync_contribution",
            DutyType::Randao => "randao",
            DutyType::Exit => "exit",
        }
    }
}

impl TryFrom<u8> for DutyType {
    type Error = UnknownDutyType;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(DutyType::Proposer),
            2 => Ok(DutyType::Attester),
            3 => Ok(DutyType::Aggregator),
            4 => Ok(DutyType::SyncContribution),
            5 => Ok(DutyType::Randao),
            6 => Ok(DutyType::Exit),
            other => Err(UnknownDutyType(other)),
        }
    }
}

impl std::fmt::Display for DutyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when decoding an unrecognised duty-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown duty type code: {0}")]
pub struct UnknownDutyType(pub u8);

/// The identity of a single consensus instance.
///
/// Two duties are equal iff their `(slot, typ)` pairs match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Duty {
    /// The beacon slot the duty belongs to.
    pub slot: u64,
    /// The kind of obligation.
    pub typ: DutyType,
}

impl Duty {
    pub fn new(slot: u64, typ: DutyType) -> Self {
        Self { slot, typ }
    }
}

impl std::fmt::Display for Duty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.typ, self.slot)
    }
}
