//! End-to-end scenarios for the consensus transport: two transports wired
//! through an in-memory host, exchanging real signed wire bytes.

use {
    k256::ecdsa::SigningKey,
    qdv_consensus_net::{
        AnyEnvelope, Component, ConsensusMetrics, ConsensusNetConfig, ConsensusNetError, Msg,
        Result, SenderClient, SniffedConsensusInstance, Transport, WireConsensusMsg,
        WireFormatPolicy,
    },
    qdv_consensus_qbft::{Duty, DutyType, MsgType, Operator, OperatorSet, QbftMsg, ValueHash},
    rand::SeedableRng,
    rand_chacha::ChaCha8Rng,
    std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    },
    tokio::{sync::mpsc, time::timeout},
    tokio_util::sync::CancellationToken,
};

/// In-memory host: records each send as the framed wire bytes a real host
/// would put on the stream.
#[derive(Default)]
struct LoopbackHost {
    sent: Mutex<Vec<(i64, Vec<u8>)>>,
}

impl LoopbackHost {
    fn destinations(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|(to, _)| *to).collect()
    }

    /// Decode every frame addressed to `to`, as that peer's stream reader
    /// would.
    fn frames_for(&self, to: i64) -> Vec<Msg> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(dest, _)| *dest == to)
            .map(|(_, frame)| {
                let len = WireConsensusMsg::read_frame_len(frame[..4].try_into().unwrap());
                let wire = WireConsensusMsg::deserialize(&frame[4..4 + len]).unwrap();
                Msg::from_wire(wire).unwrap()
            })
            .collect()
    }
}

impl SenderClient for LoopbackHost {
    fn send_async(&self, to: &Operator, msg: &WireConsensusMsg) -> Result<()> {
        let frame = msg.serialize_framed(ConsensusNetConfig::default().max_message_size)?;
        self.sent.lock().unwrap().push((to.index, frame));
        Ok(())
    }
}

fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32].into()).unwrap()
}

fn operator_set(n: u8) -> OperatorSet {
    OperatorSet::new((1..=n).map(|i| *signing_key(i).verifying_key()).collect())
}

fn test_duty() -> Duty {
    Duty::new(12345, DutyType::Attester)
}

fn attestation_value(tag: u8) -> AnyEnvelope {
    AnyEnvelope::new("qdv.types.AttestationData", vec![tag; 64])
}

/// A component for operator `local_idx` of a 4-node cluster, wired to the
/// given host with a seeded wire-format policy.
fn component(
    local_idx: i64,
    host: Arc<LoopbackHost>,
    legacy_probability: f64,
    seed: u64,
) -> Arc<Component> {
    Arc::new(
        Component::new(
            operator_set(4),
            local_idx,
            signing_key(local_idx as u8 + 1),
            host,
            ConsensusNetConfig::dev_default(),
        )
        .with_wire_policy(WireFormatPolicy::seeded(
            legacy_probability,
            ChaCha8Rng::seed_from_u64(seed),
        )),
    )
}

// ── Scenario: happy PrePrepare in pointer mode ──────────────────────────────

#[tokio::test]
async fn happy_pre_prepare_reaches_self_and_all_peers() {
    let host = Arc::new(LoopbackHost::default());
    let (transport, mut rx) = Transport::new(
        component(0, host.clone(), 0.0, 1),
        test_duty(),
        CancellationToken::new(),
    );

    let value = attestation_value(1);
    let hash = transport.cache_proposal(value.clone()).unwrap();
    transport
        .broadcast(
            MsgType::PrePrepare,
            test_duty(),
            0,
            1,
            hash,
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap();

    // The inner channel receives exactly one copy.
    let received = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timeout waiting for loopback")
        .expect("channel closed");
    assert_eq!(received.msg_type(), MsgType::PrePrepare);
    assert_eq!(received.value(), hash);
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());

    // Each of peers 1, 2, 3 receives one send.
    let mut destinations = host.destinations();
    destinations.sort_unstable();
    assert_eq!(destinations, vec![1, 2, 3]);

    // Pointer mode: the side-map binds hash(V) -> V.
    let on_wire = &host.frames_for(1)[0];
    assert_eq!(on_wire.wire().values, vec![(hash, value)]);
    assert_eq!(on_wire.wire_msg().value_hash, hash.to_vec());
}

// ── Scenario: legacy-mode interop ───────────────────────────────────────────

#[tokio::test]
async fn legacy_mode_sends_inline_values_only() {
    let host = Arc::new(LoopbackHost::default());
    // Probability 1.0 with a seeded generator: every draw is legacy.
    let component = Arc::new(
        Component::new(
            operator_set(4),
            0,
            signing_key(1),
            host.clone(),
            ConsensusNetConfig {
                legacy_probability: 1.0,
                ..ConsensusNetConfig::dev_default()
            },
        )
        .with_wire_policy(WireFormatPolicy::seeded(
            1.0,
            rand::rngs::mock::StepRng::new(0, 0),
        )),
    );
    let (transport, mut rx) = Transport::new(component, test_duty(), CancellationToken::new());

    let value = attestation_value(2);
    let hash = transport.cache_proposal(value.clone()).unwrap();
    transport
        .broadcast(
            MsgType::PrePrepare,
            test_duty(),
            0,
            1,
            hash,
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap();

    let on_wire = &host.frames_for(1)[0];
    // Side-map empty, inline value populated, both hash fields zero-length.
    assert!(on_wire.wire().values.is_empty());
    assert_eq!(on_wire.wire_msg().value, Some(value));
    assert!(on_wire.wire_msg().value_hash.is_empty());
    assert!(on_wire.wire_msg().prepared_value_hash.is_empty());

    // The canonical view still exposes the content hash.
    assert_eq!(on_wire.value(), hash);
    let received = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.value(), hash);
}

// ── Scenario: inbound caches values for later broadcasts ────────────────────

#[tokio::test]
async fn inbound_values_resolve_for_local_broadcast() {
    let host = Arc::new(LoopbackHost::default());
    let cancel = CancellationToken::new();
    let (node0, mut node0_rx) = Transport::new(
        component(0, host.clone(), 0.0, 1),
        test_duty(),
        cancel.clone(),
    );

    // Peer 1 builds and broadcasts a Prepare carrying V in its side-map.
    let peer_host = Arc::new(LoopbackHost::default());
    let (node1, _node1_rx) = Transport::new(
        component(1, peer_host.clone(), 0.0, 2),
        test_duty(),
        cancel.clone(),
    );
    let value = attestation_value(3);
    let hash = node1.cache_proposal(value).unwrap();
    node1
        .broadcast(
            MsgType::Prepare,
            test_duty(),
            1,
            1,
            hash,
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap();

    // Node 0's stream reader delivers the frame into the outer channel.
    let inbound = peer_host.frames_for(0).remove(0);
    let (outer_tx, outer_rx) = mpsc::channel(8);
    outer_tx.send(inbound).await.unwrap();
    drop(outer_tx);
    node0.process_receives(outer_rx).await;

    let forwarded = node0_rx.recv().await.expect("prepare forwarded to qbft");
    assert_eq!(forwarded.value(), hash);

    // H now resolves locally, so node 0 can quote it.
    node0
        .broadcast(
            MsgType::Commit,
            test_duty(),
            0,
            1,
            hash,
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap();
    assert_eq!(host.destinations().len(), 3);
}

// ── Scenario: unknown hash aborts without a send ────────────────────────────

#[tokio::test]
async fn unknown_value_aborts_broadcast() {
    let host = Arc::new(LoopbackHost::default());
    let (transport, mut rx) = Transport::new(
        component(0, host.clone(), 0.0, 1),
        test_duty(),
        CancellationToken::new(),
    );

    let err = transport
        .broadcast(
            MsgType::PrePrepare,
            test_duty(),
            0,
            1,
            ValueHash([9u8; 32]),
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, ConsensusNetError::UnknownValue));
    assert!(host.destinations().is_empty());
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

// ── Scenario: round change with justification survives the wire ─────────────

#[tokio::test]
async fn round_change_justification_is_depth_one_on_the_wire() {
    let host = Arc::new(LoopbackHost::default());
    let cancel = CancellationToken::new();
    let (node1, mut node1_rx) = Transport::new(
        component(1, host.clone(), 0.0, 2),
        test_duty(),
        cancel.clone(),
    );

    // Node 1 prepared V in round 1; its own Prepare is the justification.
    let value = attestation_value(4);
    let hash = node1.cache_proposal(value).unwrap();
    node1
        .broadcast(
            MsgType::Prepare,
            test_duty(),
            1,
            1,
            hash,
            0,
            ValueHash::ZERO,
            &[],
        )
        .unwrap();
    let prepare = timeout(Duration::from_secs(1), node1_rx.recv())
        .await
        .unwrap()
        .unwrap();

    node1
        .broadcast(
            MsgType::RoundChange,
            test_duty(),
            1,
            2,
            ValueHash::ZERO,
            1,
            hash,
            std::slice::from_ref(&prepare),
        )
        .unwrap();

    // Every wire copy carries the justification head with no nested proofs.
    for to in [0, 2, 3] {
        let frames = host.frames_for(to);
        let round_change = frames
            .iter()
            .find(|m| m.msg_type() == MsgType::RoundChange)
            .expect("round change delivered");
        assert_eq!(round_change.justification_msgs().len(), 1);
        let embedded = &round_change.justification_msgs()[0];
        assert_eq!(embedded.msg_type(), MsgType::Prepare);
        assert!(embedded.justification_msgs().is_empty());
        assert_eq!(round_change.prepared_value(), hash);
    }
}

// ── Property: mode mix converges on legacy_probability ──────────────────────

#[tokio::test]
async fn mode_mix_over_broadcasts_matches_probability() {
    let host = Arc::new(LoopbackHost::default());
    let (transport, mut rx) = Transport::new(
        component(0, host.clone(), 0.5, 7),
        test_duty(),
        CancellationToken::new(),
    );

    let value = attestation_value(5);
    let hash = transport.cache_proposal(value).unwrap();
    let broadcasts = 1_000;
    for _ in 0..broadcasts {
        transport
            .broadcast(
                MsgType::PrePrepare,
                test_duty(),
                0,
                1,
                hash,
                0,
                ValueHash::ZERO,
                &[],
            )
            .unwrap();
    }

    let legacy = host
        .frames_for(1)
        .iter()
        .filter(|m| m.wire().values.is_empty())
        .count();
    let fraction = legacy as f64 / broadcasts as f64;
    assert!(
        (0.4..=0.6).contains(&fraction),
        "legacy fraction {fraction} not near 0.5"
    );

    // Both encodings canonicalise to the same hash on the loopback path.
    while let Ok(Some(msg)) = timeout(Duration::from_millis(100), rx.recv()).await {
        assert_eq!(msg.value(), hash);
    }
}

// ── Instrumentation and post-mortem export ──────────────────────────────────

#[tokio::test]
async fn decided_instance_exports_metrics_and_sniffer_artifact() {
    let host = Arc::new(LoopbackHost::default());
    let metrics = Arc::new(ConsensusMetrics::new());
    let component = Arc::new(
        Component::new(
            operator_set(4),
            0,
            signing_key(1),
            host.clone(),
            ConsensusNetConfig::dev_default(),
        )
        .with_wire_policy(WireFormatPolicy::seeded(0.0, ChaCha8Rng::seed_from_u64(1)))
        .with_metrics(metrics.clone()),
    );
    let (transport, mut rx) = Transport::new(component, test_duty(), CancellationToken::new());
    let started_at = Instant::now();

    let value = attestation_value(6);
    let hash = transport.cache_proposal(value).unwrap();
    for typ in [MsgType::PrePrepare, MsgType::Prepare, MsgType::Commit] {
        transport
            .broadcast(typ, test_duty(), 0, 1, hash, 0, ValueHash::ZERO, &[])
            .unwrap();
    }
    for _ in 0..3 {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("loopback delivered")
            .expect("channel open");
    }

    // The instance decided in round 1: record and export.
    metrics.instrument_consensus(test_duty(), 1, started_at);
    let text = metrics.encode_prometheus();
    assert!(text.contains("consensus_decided_rounds{duty=\"attester\"} 1"));
    assert!(text.contains("consensus_duration_seconds_count{duty=\"attester\"} 1"));

    // The sniffer artifact round-trips through its gzip encoding.
    let instance = transport.sniffer_instance();
    assert_eq!(instance.nodes, 4);
    assert_eq!(instance.peer_idx, 0);
    assert_eq!(instance.msgs.len(), 3);
    let artifact = instance.encode_gzip().unwrap();
    let decoded = SniffedConsensusInstance::decode_gzip(&artifact).unwrap();
    assert_eq!(decoded, instance);
}
