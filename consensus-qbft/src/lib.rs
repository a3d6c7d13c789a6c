//! QDV QBFT Contract
//!
//! The types shared between the QBFT state machine and the consensus
//! transport of a QDV cluster:
//!
//! - **Duties** — a consensus instance decides one value per duty, a
//!   `(slot, type)` pair such as "attester at slot 12345".
//! - **Message codes** — the five QBFT step types and the 32-byte
//!   content-hash handle under which values are agreed.
//! - **Operator sets** — the n >= 3f+1 cluster operators, indexed
//!   deterministically 0..n-1, each identified by a secp256k1 key.
//!
//! The state machine itself lives above this crate and consumes messages
//! through the [`QbftMsg`] trait; the transport below it produces them.

pub mod duty;
pub mod operator_set;
pub mod types;

pub use duty::{Duty, DutyType};
pub use operator_set::{Operator, OperatorSet};
pub use types::{MsgType, QbftMsg, ValueHash};
