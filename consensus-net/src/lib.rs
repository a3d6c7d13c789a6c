//! QDV Consensus Transport
//!
//! This crate carries QBFT consensus messages between the operators of a
//! QDV cluster for one consensus instance (duty) at a time.  It handles:
//!
//! - **Message construction and validation** — a generic QBFT message type
//!   is built, signed with the operator's secp256k1 key, and checked on
//!   receipt (structure, signature, sender index, duty binding).
//! - **Value dereferencing** — values under agreement are quoted by 32-byte
//!   content hash; a per-instance store resolves hashes back to payloads.
//! - **Broadcast with loopback** — outbound messages fan out to the n-1
//!   remote operators and loop back to the local state machine through the
//!   same inner channel as peer messages.
//! - **Wire-format migration** — per-message negotiation between the legacy
//!   inline-values encoding and the pointer/side-map encoding.
//! - **Post-mortem recording** — a sniffer logs every observed message for
//!   export as a compressed debug artifact.
//!
//! ## Architecture
//!
//! ```text
//!  ┌─────────────────────────────────────────────────┐
//!  │  QBFT state machine (qdv-consensus-qbft)        │
//!  │  ← Msg (inner channel)                          │
//!  │  → Transport::broadcast                         │
//!  └──────────────────┬──────────────────────────────┘
//!                     │
//!  ┌──────────────────▼──────────────────────────────┐
//!  │  Transport (per instance)                       │
//!  │  • ValueStore   hash → payload                  │
//!  │  • codec        create_msg / validate_msg       │
//!  │  • Sniffer      timestamped message log         │
//!  │  • WireFormatPolicy  legacy vs pointer          │
//!  └──────┬───────────────────────────▲──────────────┘
//!         │ SenderClient              │ outer channel
//!  ┌──────▼───────────────────────────┴──────────────┐
//!  │  P2P host (external)                            │
//!  └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]      | `ConsensusNetConfig` defaults and dev overrides |
//! | [`message`]     | Wire types, codec, signing, validation |
//! | [`value_store`] | Content-addressed hash → value cache |
//! | [`sniffer`]     | Append-only observed-message log and export |
//! | [`mode`]        | Legacy/pointer wire-format policy |
//! | [`transport`]   | Per-instance broadcast and receive loop |
//! | [`metrics`]     | Consensus metrics surface |
//! | [`error`]       | Crate-wide error enum |

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod mode;
pub mod sniffer;
pub mod transport;
pub mod value_store;

pub use config::ConsensusNetConfig;
pub use error::{ConsensusNetError, Result};
pub use message::{
    create_msg, hash_envelope, validate_msg, AnyEnvelope, Msg, WireConsensusMsg, WireQbftMsg,
};
pub use metrics::ConsensusMetrics;
pub use mode::WireFormatPolicy;
pub use sniffer::{SniffedConsensusInstance, Sniffer};
pub use transport::{Component, SenderClient, Transport};
pub use value_store::ValueStore;
