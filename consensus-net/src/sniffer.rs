//! Per-instance recording of observed consensus messages.
//!
//! Every message a transport sends to itself or accepts from a peer is
//! appended here with a wall-clock timestamp.  When an instance misbehaves
//! in production, the exported log is the primary post-mortem artifact: it
//! replays exactly what this node observed, in the order it observed it.
//!
//! Timestamps come from the wall clock, so they are non-decreasing in
//! practice but not guaranteed strictly monotonic.

use {
    crate::{
        error::Result,
        message::WireConsensusMsg,
    },
    flate2::{read::GzDecoder, write::GzEncoder, Compression},
    serde::{Deserialize, Serialize},
    std::{
        io::{Read, Write},
        sync::Mutex,
        time::SystemTime,
    },
};

/// One observed message with the time it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniffedConsensusMsg {
    pub timestamp: SystemTime,
    pub msg: WireConsensusMsg,
}

/// Snapshot of everything one instance observed, for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SniffedConsensusInstance {
    /// Number of operators in the cluster.
    pub nodes: i64,
    /// This node's operator index.
    pub peer_idx: i64,
    /// When the instance's transport was created.
    pub started_at: SystemTime,
    pub msgs: Vec<SniffedConsensusMsg>,
}

impl SniffedConsensusInstance {
    /// Encode the snapshot as a gzip-compressed single artifact, the format
    /// served by the debug endpoint and attached to incident reports.
    pub fn encode_gzip(&self) -> Result<Vec<u8>> {
        let encoded = bincode::serialize(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded).map_err(io_to_bincode)?;
        Ok(encoder.finish().map_err(io_to_bincode)?)
    }

    /// Decode an artifact produced by [`Self::encode_gzip`].
    pub fn decode_gzip(data: &[u8]) -> Result<Self> {
        let mut decoder = GzDecoder::new(data);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded).map_err(io_to_bincode)?;
        Ok(bincode::deserialize(&decoded)?)
    }
}

fn io_to_bincode(err: std::io::Error) -> crate::error::ConsensusNetError {
    crate::error::ConsensusNetError::Serialization(Box::new(bincode::ErrorKind::Io(err)))
}

/// Append-only buffer of every message an instance observed.
#[derive(Debug)]
pub struct Sniffer {
    nodes: i64,
    peer_idx: i64,
    started_at: SystemTime,
    msgs: Mutex<Vec<SniffedConsensusMsg>>,
}

impl Sniffer {
    /// Create a sniffer for an instance in a cluster of `nodes` operators.
    pub fn new(nodes: i64, peer_idx: i64) -> Self {
        Self {
            nodes,
            peer_idx,
            started_at: SystemTime::now(),
            msgs: Mutex::new(Vec::new()),
        }
    }

    /// Append a message with the current wall-clock time.
    pub fn add(&self, msg: &WireConsensusMsg) {
        let mut msgs = self.msgs.lock().expect("sniffer lock poisoned");
        msgs.push(SniffedConsensusMsg {
            timestamp: SystemTime::now(),
            msg: msg.clone(),
        });
    }

    /// Number of messages recorded so far.
    pub fn len(&self) -> usize {
        self.msgs.lock().expect("sniffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the buffered messages for export.
    pub fn instance(&self) -> SniffedConsensusInstance {
        let msgs = self.msgs.lock().expect("sniffer lock poisoned");
        SniffedConsensusInstance {
            nodes: self.nodes,
            peer_idx: self.peer_idx,
            started_at: self.started_at,
            msgs: msgs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AnyEnvelope, WireDuty, WireQbftMsg};

    fn wire_msg(round: i64) -> WireConsensusMsg {
        WireConsensusMsg {
            msg: WireQbftMsg {
                msg_type: 1,
                duty: WireDuty { slot: 100, typ: 2 },
                peer_idx: 0,
                round,
                value: Some(AnyEnvelope::new("qdv.types.AttestationData", vec![7; 16])),
                value_hash: Vec::new(),
                prepared_round: 0,
                prepared_value: None,
                prepared_value_hash: Vec::new(),
                signature: vec![0; 65],
            },
            justification: Vec::new(),
            values: Vec::new(),
        }
    }

    #[test]
    fn test_add_appends_in_order() {
        let sniffer = Sniffer::new(4, 1);
        sniffer.add(&wire_msg(1));
        sniffer.add(&wire_msg(2));
        sniffer.add(&wire_msg(3));

        let instance = sniffer.instance();
        assert_eq!(instance.nodes, 4);
        assert_eq!(instance.peer_idx, 1);
        assert_eq!(instance.msgs.len(), 3);
        let rounds: Vec<i64> = instance.msgs.iter().map(|m| m.msg.msg.round).collect();
        assert_eq!(rounds, vec![1, 2, 3]);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let sniffer = Sniffer::new(4, 0);
        for round in 1..=5 {
            sniffer.add(&wire_msg(round));
        }
        let instance = sniffer.instance();
        for pair in instance.msgs.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(instance.started_at <= instance.msgs[0].timestamp);
    }

    #[test]
    fn test_instance_is_a_snapshot() {
        let sniffer = Sniffer::new(4, 0);
        sniffer.add(&wire_msg(1));
        let snapshot = sniffer.instance();
        sniffer.add(&wire_msg(2));
        assert_eq!(snapshot.msgs.len(), 1);
        assert_eq!(sniffer.len(), 2);
    }

    #[test]
    fn test_gzip_roundtrip() {
        let sniffer = Sniffer::new(4, 2);
        sniffer.add(&wire_msg(1));
        sniffer.add(&wire_msg(2));
        let instance = sniffer.instance();

        let artifact = instance.encode_gzip().unwrap();
        let decoded = SniffedConsensusInstance::decode_gzip(&artifact).unwrap();
        assert_eq!(decoded, instance);
    }
}
