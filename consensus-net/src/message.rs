//! Wire types and codec for QBFT consensus messages.
//!
//! All messages are serialized with bincode for compact wire representation.
//! [`WireConsensusMsg`] is the top-level wire type — every frame on the
//! consensus channel is a length-prefixed bincode encoding of it.
//!
//! ## Two encodings, one logical message
//!
//! A message references its values twice over:
//!
//! - **Legacy mode**: the full payloads travel in the inline `value` /
//!   `prepared_value` fields and both hash fields are empty.  Old peers
//!   understand only this.
//! - **Pointer mode**: the hash fields carry 32-byte content hashes and the
//!   `values` side-map carries the payloads.  The inline fields are still
//!   populated so legacy peers can interpret the message; modern receivers
//!   prefer the side-map.
//!
//! [`create_msg`] picks the encoding per message (see
//! [`crate::mode::WireFormatPolicy`]); [`Msg::from_wire`] canonicalises both
//! encodings into the same in-memory view, recomputing hashes from inline
//! payloads where the wire carried none.
//!
//! ## Signing
//!
//! Every message head is signed with the sender's secp256k1 key over the
//! sha256 of its canonical encoding with the signature field empty.  The
//! 65-byte signature is recoverable (r || s || recovery id), so validation
//! recovers the signer and checks it occupies `peer_idx` in the operator
//! set.
//!
//! ## Justifications
//!
//! Justification entries are [`WireQbftMsg`] heads, a type with no
//! justification list of its own: proofs are one level deep by
//! construction and nested justifications are dropped when embedding.

use {
    crate::error::{ConsensusNetError, Result},
    k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey},
    qdv_consensus_qbft::{Duty, DutyType, MsgType, OperatorSet, QbftMsg, ValueHash},
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::collections::HashMap,
};

/// Length of a recoverable secp256k1 signature: r || s || recovery id.
pub const SIGNATURE_LEN: usize = 65;

// ── Wire types ──────────────────────────────────────────────────────────────

/// An opaque, typed payload — the thing being agreed on.
///
/// Decoding `value` into a concrete type is the QBFT layer's concern; the
/// transport stays schema-agnostic and only ever hashes or forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyEnvelope {
    /// Identifies the concrete type of `value`.
    pub type_url: String,
    /// The serialized payload.
    pub value: Vec<u8>,
}

impl AnyEnvelope {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }
}

/// Wire form of a duty: `(slot, type code)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDuty {
    pub slot: u64,
    pub typ: u8,
}

impl From<Duty> for WireDuty {
    fn from(duty: Duty) -> Self {
        Self {
            slot: duty.slot,
            typ: duty.typ.code(),
        }
    }
}

/// The signed head of a consensus message.
///
/// Hash fields are 0 or 32 bytes; empty means "absent" (legacy mode zeroes
/// them).  The inline `value` / `prepared_value` fields are populated in
/// both modes unless the message carries no value at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireQbftMsg {
    /// QBFT step code, see [`MsgType`].
    pub msg_type: i64,
    pub duty: WireDuty,
    /// Sender's deterministic index in the operator set.
    pub peer_idx: i64,
    pub round: i64,
    /// Legacy inline value; redundant copy in pointer mode.
    pub value: Option<AnyEnvelope>,
    /// 32-byte content hash in pointer mode, empty in legacy mode.
    pub value_hash: Vec<u8>,
    pub prepared_round: i64,
    pub prepared_value: Option<AnyEnvelope>,
    pub prepared_value_hash: Vec<u8>,
    /// 65-byte recoverable secp256k1 signature over the canonical encoding
    /// with this field empty.
    pub signature: Vec<u8>,
}

impl WireQbftMsg {
    /// The sha256 digest the signature covers.
    pub fn signing_digest(&self) -> Result<[u8; 32]> {
        let mut unsigned = self.clone();
        unsigned.signature = Vec::new();
        let encoded = bincode::serialize(&unsigned)?;
        Ok(Sha256::digest(&encoded).into())
    }
}

/// The top-level wire message.
///
/// `justification` entries are heads only — [`WireQbftMsg`] has no
/// justification list, so transitive proofs cannot exist on the wire.
/// `values` is the pointer-mode side-map; when non-empty it is authoritative
/// for every hash referenced by the head or any justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireConsensusMsg {
    pub msg: WireQbftMsg,
    pub justification: Vec<WireQbftMsg>,
    pub values: Vec<(ValueHash, AnyEnvelope)>,
}

impl WireConsensusMsg {
    /// Serialize this message to bytes using bincode.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(ConsensusNetError::Serialization)
    }

    /// Deserialize a message from bytes.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(ConsensusNetError::Serialization)
    }

    /// Serialize with a 4-byte little-endian length prefix.
    ///
    /// Wire format: `[len: u32-le][payload: len bytes]`
    pub fn serialize_framed(&self, max_size: usize) -> Result<Vec<u8>> {
        let payload = self.serialize()?;
        if payload.len() > max_size {
            return Err(ConsensusNetError::MessageTooLarge {
                size: payload.len(),
                max: max_size,
            });
        }
        let len = payload.len() as u32;
        let mut buf = Vec::with_capacity(4usize.saturating_add(payload.len()));
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Read the length prefix from a 4-byte buffer.
    pub fn read_frame_len(header: &[u8; 4]) -> usize {
        u32::from_le_bytes(*header) as usize
    }

    /// Return a human-readable tag for logging.
    pub fn kind(&self) -> &'static str {
        match MsgType::try_from(self.msg.msg_type) {
            Ok(MsgType::PrePrepare) => "pre_prepare",
            Ok(MsgType::Prepare) => "prepare",
            Ok(MsgType::Commit) => "commit",
            Ok(MsgType::RoundChange) => "round_change",
            Ok(MsgType::Decided) => "decided",
            Err(_) => "unknown",
        }
    }
}

// ── Hashing and signing ─────────────────────────────────────────────────────

/// Content hash of a value: sha256 over its serialized form.
pub fn hash_envelope(envelope: &AnyEnvelope) -> Result<ValueHash> {
    let encoded = bincode::serialize(envelope)?;
    Ok(ValueHash(Sha256::digest(&encoded).into()))
}

/// Sign the head with a recoverable secp256k1 signature.
fn sign_wire_msg(mut msg: WireQbftMsg, signing_key: &SigningKey) -> Result<WireQbftMsg> {
    let digest = msg.signing_digest()?;
    let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest)?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte());
    msg.signature = bytes;
    Ok(msg)
}

/// Recover the signer's identity key from the head's signature.
pub fn recover_signer(msg: &WireQbftMsg) -> Result<VerifyingKey> {
    if msg.signature.len() != SIGNATURE_LEN {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            msg.signature.len()
        )));
    }
    let signature = Signature::from_slice(&msg.signature[..64])
        .map_err(|e| ConsensusNetError::InvalidMessage(format!("malformed signature: {e}")))?;
    let recovery_id = RecoveryId::from_byte(msg.signature[64]).ok_or_else(|| {
        ConsensusNetError::InvalidMessage(format!("invalid recovery id: {}", msg.signature[64]))
    })?;
    let digest = msg.signing_digest()?;
    VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|e| ConsensusNetError::InvalidMessage(format!("signature recovery failed: {e}")))
}

// ── Decoded message ─────────────────────────────────────────────────────────

/// A decoded consensus message: the wire form plus the canonical view the
/// QBFT state machine consumes.
///
/// Construction canonicalises the two encodings: effective value hashes are
/// taken from the wire when present and recomputed from the inline payloads
/// otherwise, and the carried payloads are collected into a hash-keyed map
/// (side-map preferred, inline fields as the legacy fallback).
#[derive(Debug, Clone, PartialEq)]
pub struct Msg {
    wire: WireConsensusMsg,
    msg_type: MsgType,
    duty: Duty,
    value_hash: ValueHash,
    prepared_value_hash: ValueHash,
    values: HashMap<ValueHash, AnyEnvelope>,
    justification: Vec<Msg>,
}

impl Msg {
    /// Decode a wire message into its canonical view.
    ///
    /// Fails with [`ConsensusNetError::InvalidMessage`] on structural
    /// problems (unknown codes, bad hash lengths).  Signature checks are
    /// [`validate_msg`]'s job.
    pub fn from_wire(wire: WireConsensusMsg) -> Result<Self> {
        let msg_type = MsgType::try_from(wire.msg.msg_type)
            .map_err(|e| ConsensusNetError::InvalidMessage(e.to_string()))?;
        let duty_type = DutyType::try_from(wire.msg.duty.typ)
            .map_err(|e| ConsensusNetError::InvalidMessage(e.to_string()))?;
        let duty = Duty::new(wire.msg.duty.slot, duty_type);

        let value_hash = effective_hash(&wire.msg.value_hash, wire.msg.value.as_ref())?;
        let prepared_value_hash =
            effective_hash(&wire.msg.prepared_value_hash, wire.msg.prepared_value.as_ref())?;

        let mut values = HashMap::new();
        if !wire.values.is_empty() {
            // Pointer mode: the side-map is authoritative.
            for (hash, envelope) in &wire.values {
                values.insert(*hash, envelope.clone());
            }
        } else {
            // Legacy mode: key the inline payloads by their content hash,
            // including those carried by justifications.
            for inline in wire
                .msg
                .value
                .iter()
                .chain(wire.msg.prepared_value.iter())
                .chain(wire.justification.iter().flat_map(|j| j.value.iter()))
                .chain(
                    wire.justification
                        .iter()
                        .flat_map(|j| j.prepared_value.iter()),
                )
            {
                values.insert(hash_envelope(inline)?, inline.clone());
            }
        }

        let justification = wire
            .justification
            .iter()
            .map(|head| {
                Msg::from_wire(WireConsensusMsg {
                    msg: head.clone(),
                    justification: Vec::new(),
                    values: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            wire,
            msg_type,
            duty,
            value_hash,
            prepared_value_hash,
            values,
            justification,
        })
    }

    /// The full wire message.
    pub fn wire(&self) -> &WireConsensusMsg {
        &self.wire
    }

    /// The signed head.
    pub fn wire_msg(&self) -> &WireQbftMsg {
        &self.wire.msg
    }

    /// The payloads this message carries, keyed by content hash.
    pub fn carried_values(&self) -> &HashMap<ValueHash, AnyEnvelope> {
        &self.values
    }

    /// The decoded justification messages (their own justifications are
    /// empty).
    pub fn justification_msgs(&self) -> &[Msg] {
        &self.justification
    }
}

impl QbftMsg for Msg {
    fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    fn duty(&self) -> Duty {
        self.duty
    }

    fn peer_idx(&self) -> i64 {
        self.wire.msg.peer_idx
    }

    fn round(&self) -> i64 {
        self.wire.msg.round
    }

    fn value(&self) -> ValueHash {
        self.value_hash
    }

    fn prepared_round(&self) -> i64 {
        self.wire.msg.prepared_round
    }

    fn prepared_value(&self) -> ValueHash {
        self.prepared_value_hash
    }

    fn justification(&self) -> Vec<&dyn QbftMsg> {
        self.justification
            .iter()
            .map(|msg| msg as &dyn QbftMsg)
            .collect()
    }
}

/// The effective value hash of a wire field pair: the wire hash when
/// present, else the recomputed hash of the inline payload, else zero.
fn effective_hash(wire_hash: &[u8], inline: Option<&AnyEnvelope>) -> Result<ValueHash> {
    match wire_hash.len() {
        0 => match inline {
            Some(envelope) => hash_envelope(envelope),
            None => Ok(ValueHash::ZERO),
        },
        32 => ValueHash::from_slice(wire_hash)
            .ok_or_else(|| ConsensusNetError::InvalidMessage("malformed value hash".to_string())),
        n => Err(ConsensusNetError::InvalidMessage(format!(
            "value hash must be 0 or 32 bytes, got {n}"
        ))),
    }
}

// ── Build ───────────────────────────────────────────────────────────────────

/// Build and sign a consensus message.
///
/// `pointer_values` selects the encoding: in legacy mode the side-map is
/// cleared and both hash fields zeroed so that only the inline fields
/// remain; in pointer mode the side-map and hashes are kept alongside the
/// redundant inline fields.  Justifications are embedded head-only — their
/// own justifications are dropped.
#[allow(clippy::too_many_arguments)]
pub fn create_msg(
    typ: MsgType,
    duty: Duty,
    peer_idx: i64,
    round: i64,
    value_hash: ValueHash,
    value: Option<AnyEnvelope>,
    prepared_round: i64,
    prepared_value_hash: ValueHash,
    prepared_value: Option<AnyEnvelope>,
    justification: &[Msg],
    signing_key: &SigningKey,
    pointer_values: bool,
) -> Result<Msg> {
    let mut values: Vec<(ValueHash, AnyEnvelope)> = Vec::new();
    if let Some(v) = &value {
        values.push((value_hash, v.clone()));
    }
    if let Some(pv) = &prepared_value {
        values.push((prepared_value_hash, pv.clone()));
    }

    // Legacy peers understand only the inline fields: drop the pointer
    // representation entirely.
    let (value_hash, prepared_value_hash) = if pointer_values {
        (value_hash, prepared_value_hash)
    } else {
        values.clear();
        (ValueHash::ZERO, ValueHash::ZERO)
    };

    let head = WireQbftMsg {
        msg_type: typ.code(),
        duty: duty.into(),
        peer_idx,
        round,
        value,
        value_hash: if value_hash.is_zero() {
            Vec::new()
        } else {
            value_hash.to_vec()
        },
        prepared_round,
        prepared_value,
        prepared_value_hash: if prepared_value_hash.is_zero() {
            Vec::new()
        } else {
            prepared_value_hash.to_vec()
        },
        signature: Vec::new(),
    };
    let head = sign_wire_msg(head, signing_key)?;

    // Only the signed heads are embedded; nested justifications are dropped.
    let justification: Vec<WireQbftMsg> = justification
        .iter()
        .map(|j| j.wire_msg().clone())
        .collect();

    Msg::from_wire(WireConsensusMsg {
        msg: head,
        justification,
        values,
    })
}

// ── Validate ────────────────────────────────────────────────────────────────

/// Validate an inbound message for the given instance.
///
/// Checks, in order: structural well-formedness of the head and every
/// justification, duty binding to the active instance, signature recovery
/// with the recovered key matching the operator at `peer_idx`, and
/// hash/payload consistency wherever both are present.  Invalid messages
/// are dropped by the caller and never reach the state machine.
pub fn validate_msg(msg: &Msg, operators: &OperatorSet, duty: Duty) -> Result<()> {
    validate_head(msg.wire_msg(), operators, duty)?;
    check_value_presence(msg.wire_msg(), &msg.wire().values)?;

    for (hash, envelope) in &msg.wire().values {
        if hash_envelope(envelope)? != *hash {
            return Err(ConsensusNetError::InvalidMessage(format!(
                "side-map entry does not match its hash {hash}"
            )));
        }
    }

    for head in &msg.wire().justification {
        validate_head(head, operators, duty)
            .and_then(|()| check_value_presence(head, &msg.wire().values))
            .map_err(|e| ConsensusNetError::InvalidJustification(e.to_string()))?;
    }

    Ok(())
}

/// Structural and signature checks for one signed head.
fn validate_head(head: &WireQbftMsg, operators: &OperatorSet, duty: Duty) -> Result<()> {
    let typ = MsgType::try_from(head.msg_type)
        .map_err(|e| ConsensusNetError::InvalidMessage(e.to_string()))?;
    let duty_type = DutyType::try_from(head.duty.typ)
        .map_err(|e| ConsensusNetError::InvalidMessage(e.to_string()))?;

    let msg_duty = Duty::new(head.duty.slot, duty_type);
    if msg_duty != duty {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "message for duty {msg_duty} received in instance {duty}"
        )));
    }

    if head.round < 1 {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "round must be >= 1, got {}",
            head.round
        )));
    }
    if head.prepared_round < 0 || head.prepared_round >= head.round {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "prepared round {} out of range for round {}",
            head.prepared_round, head.round
        )));
    }
    if !operators.contains_index(head.peer_idx) {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "peer index {} out of range for {} operators",
            head.peer_idx,
            operators.len()
        )));
    }

    for (hash_bytes, inline) in [
        (&head.value_hash, &head.value),
        (&head.prepared_value_hash, &head.prepared_value),
    ] {
        match hash_bytes.len() {
            0 => {}
            32 => {
                // Both representations present: they must agree.
                if let Some(envelope) = inline {
                    let computed = hash_envelope(envelope)?;
                    if computed.to_vec() != *hash_bytes {
                        return Err(ConsensusNetError::InvalidMessage(format!(
                            "inline value does not match its hash {computed}"
                        )));
                    }
                }
            }
            n => {
                return Err(ConsensusNetError::InvalidMessage(format!(
                    "value hash must be 0 or 32 bytes, got {n}"
                )))
            }
        }
    }

    // Every step except a round change must reference a value.
    let has_value = head.value.is_some() || head.value_hash.len() == 32;
    if !has_value && typ != MsgType::RoundChange {
        return Err(ConsensusNetError::InvalidMessage(format!(
            "{typ} message carries no value"
        )));
    }

    let signer = recover_signer(head)?;
    match operators.position(&signer) {
        Some(index) if index == head.peer_idx => Ok(()),
        Some(index) => Err(ConsensusNetError::InvalidMessage(format!(
            "peer index {} does not match signer index {index}",
            head.peer_idx
        ))),
        None => Err(ConsensusNetError::InvalidMessage(
            "signer is not a cluster operator".to_string(),
        )),
    }
}

/// Every non-zero hash must have its payload somewhere in the message:
/// the side-map or the head's inline field.
fn check_value_presence(head: &WireQbftMsg, side: &[(ValueHash, AnyEnvelope)]) -> Result<()> {
    for (hash_bytes, inline) in [
        (&head.value_hash, &head.value),
        (&head.prepared_value_hash, &head.prepared_value),
    ] {
        if hash_bytes.len() == 32 && inline.is_none() {
            let hash = ValueHash::from_slice(hash_bytes).ok_or_else(|| {
                ConsensusNetError::InvalidMessage("malformed value hash".to_string())
            })?;
            if !side.iter().any(|(k, _)| *k == hash) {
                return Err(ConsensusNetError::InvalidMessage(format!(
                    "referenced value {hash} missing from message"
                )));
            }
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────
