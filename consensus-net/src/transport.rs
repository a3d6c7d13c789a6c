//! Per-instance consensus transport.
//!
//! One [`Transport`] exists per consensus instance (per duty).  It sits
//! between the QBFT state machine above and the P2P host below:
//!
//! ```text
//!  ┌─────────────────────────────────────────────────┐
//!  │  QBFT state machine                             │
//!  │  ← inner channel (bounded mpsc of Msg)          │
//!  │  → broadcast(...)                               │
//!  └───────────────────┬─────────────────────────────┘
//!                      │
//!  ┌───────────────────▼─────────────────────────────┐
//!  │  Transport                                      │
//!  │  • value store — resolves content hashes        │
//!  │  • codec — build, sign, validate                │
//!  │  • sniffer — records every observed message     │
//!  └──────┬──────────────────────────────▲───────────┘
//!         │ SenderClient::send_async     │ outer channel
//!  ┌──────▼──────────────────────────────┴───────────┐
//!  │  P2P host (out of scope)                        │
//!  └─────────────────────────────────────────────────┘
//! ```
//!
//! **Outbound**: `broadcast` resolves the quoted hashes through the value
//! store, builds and signs the message, enqueues a copy to self on the
//! inner channel from a detached task, and fans the wire form out to the
//! n-1 remote operators.  **Inbound**: `process_receives` drains the outer
//! channel fed by the host's stream reader, validates, caches carried
//! values, and forwards to the inner channel.
//!
//! Within a single broadcast the loopback and the remote sends are
//! unordered; QBFT tolerates reordering by design of the protocol, not of
//! this module.  The transport never retries anything — retries are round
//! changes, owned by the layer above.
//!
//! All waits race the instance's cancellation token and cancellation wins:
//! cancelling the instance returns `process_receives`, abandons pending
//! loopback enqueues, and leaks no tasks.

use {
    crate::{
        config::ConsensusNetConfig,
        error::Result,
        message::{create_msg, validate_msg, AnyEnvelope, Msg, WireConsensusMsg},
        metrics::ConsensusMetrics,
        mode::WireFormatPolicy,
        sniffer::{SniffedConsensusInstance, Sniffer},
        value_store::ValueStore,
    },
    k256::ecdsa::SigningKey,
    log::warn,
    qdv_consensus_qbft::{Duty, MsgType, Operator, OperatorSet, ValueHash},
    std::sync::Arc,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

/// The seam to the P2P host: a non-blocking, at-most-once send per call.
///
/// Implementations queue the message for delivery and return immediately;
/// an error means the host rejected the send outright.  Delivery is
/// best-effort — there is no acknowledgement and no retry at this layer.
pub trait SenderClient: Send + Sync {
    fn send_async(&self, to: &Operator, msg: &WireConsensusMsg) -> Result<()>;
}

/// Node-level collaborators shared by every transport instance: the
/// operator set, this node's identity, the P2P sender, the wire-format
/// policy and the metrics surface.
///
/// Everything is passed in explicitly; nothing here is process-global.
pub struct Component {
    operators: OperatorSet,
    local_idx: i64,
    signing_key: SigningKey,
    sender: Arc<dyn SenderClient>,
    wire_policy: WireFormatPolicy,
    metrics: Arc<ConsensusMetrics>,
    config: ConsensusNetConfig,
}

impl Component {
    pub fn new(
        operators: OperatorSet,
        local_idx: i64,
        signing_key: SigningKey,
        sender: Arc<dyn SenderClient>,
        config: ConsensusNetConfig,
    ) -> Self {
        Self {
            operators,
            local_idx,
            signing_key,
            sender,
            wire_policy: WireFormatPolicy::new(config.legacy_probability),
            metrics: Arc::new(ConsensusMetrics::new()),
            config,
        }
    }

    /// Replace the wire-format policy, e.g. with a seeded one in tests.
    pub fn with_wire_policy(mut self, policy: WireFormatPolicy) -> Self {
        self.wire_policy = policy;
        self
    }

    /// Share an externally-owned metrics surface.
    pub fn with_metrics(mut self, metrics: Arc<ConsensusMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    pub fn local_idx(&self) -> i64 {
        self.local_idx
    }

    pub fn metrics(&self) -> &ConsensusMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ConsensusNetConfig {
        &self.config
    }
}

/// Transport for one consensus instance.
///
/// Created when a duty's consensus begins, discarded when it completes.
/// The instance has two externally observable states: running while its
/// cancellation token is live, stopped after cancellation.
pub struct Transport {
    component: Arc<Component>,
    duty: Duty,
    recv_tx: mpsc::Sender<Msg>,
    sniffer: Arc<Sniffer>,
    values: ValueStore,
    cancel: CancellationToken,
}

impl Transport {
    /// Create a transport for `duty` with a fresh value store and sniffer.
    ///
    /// Returns the receiving half of the inner channel; its consumer is the
    /// QBFT state machine.  The channel is bounded by
    /// `config.recv_buffer_size` — when QBFT cannot drain, producers block
    /// rather than drop, and the instance times out at the QBFT level.
    pub fn new(
        component: Arc<Component>,
        duty: Duty,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Msg>) {
        let (recv_tx, recv_rx) = mpsc::channel(component.config.recv_buffer_size);
        let sniffer = Arc::new(Sniffer::new(
            component.operators.len() as i64,
            component.local_idx,
        ));
        let transport = Self {
            component,
            duty,
            recv_tx,
            sniffer,
            values: ValueStore::new(),
            cancel,
        };
        (transport, recv_rx)
    }

    pub fn duty(&self) -> Duty {
        self.duty
    }

    /// The instance's value store.
    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// Hash and cache a value the QBFT machine wants proposed, returning
    /// the handle to quote in a subsequent broadcast.
    pub fn cache_proposal(&self, envelope: AnyEnvelope) -> Result<ValueHash> {
        self.values.cache(envelope)
    }

    /// Snapshot of every message this instance observed.
    pub fn sniffer_instance(&self) -> SniffedConsensusInstance {
        self.sniffer.instance()
    }

    /// Broadcast a message to all operators, including self.
    ///
    /// Quoted hashes are resolved through the value store; an unknown hash
    /// aborts before anything is sent.  The loopback enqueue runs on a
    /// detached task so a full inner channel cannot deadlock a caller that
    /// still holds the QBFT lock; the task is abandoned on cancellation.
    /// Remote sends are at-most-once and the first failure aborts with that
    /// error — peers already sent to may still receive the message.
    ///
    /// Must be called from within a tokio runtime.
    #[allow(clippy::too_many_arguments)]
    pub fn broadcast(
        &self,
        typ: MsgType,
        duty: Duty,
        peer_idx: i64,
        round: i64,
        value_hash: ValueHash,
        prepared_round: i64,
        prepared_value_hash: ValueHash,
        justification: &[Msg],
    ) -> Result<()> {
        // Resolve the hashes the caller quoted; the transport is the sole
        // owner of the hash -> payload binding.
        let value = if value_hash.is_zero() {
            None
        } else {
            Some(self.values.get(value_hash)?)
        };
        let prepared_value = if prepared_value_hash.is_zero() {
            None
        } else {
            Some(self.values.get(prepared_value_hash)?)
        };

        let msg = create_msg(
            typ,
            duty,
            peer_idx,
            round,
            value_hash,
            value,
            prepared_round,
            prepared_value_hash,
            prepared_value,
            justification,
            &self.component.signing_key,
            self.component.wire_policy.pointer_values(),
        )?;

        // Send to self (async since the inner channel is blocking).
        let recv_tx = self.recv_tx.clone();
        let sniffer = Arc::clone(&self.sniffer);
        let cancel = self.cancel.clone();
        let loopback = msg.clone();
        tokio::spawn(async move {
            let wire = loopback.wire().clone();
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = recv_tx.send(loopback) => {
                    if result.is_ok() {
                        sniffer.add(&wire);
                    }
                }
            }
        });

        for operator in self.component.operators.iter() {
            if operator.index == self.component.local_idx {
                // Do not broadcast to self over the wire.
                continue;
            }
            self.component.sender.send_async(operator, msg.wire())?;
        }

        Ok(())
    }

    /// Process received messages from the outer channel until the instance
    /// is cancelled or the host closes the channel.
    ///
    /// Invalid messages are logged and dropped before they touch the value
    /// store, the sniffer, or the state machine.
    pub async fn process_receives(&self, mut outer: mpsc::Receiver<Msg>) {
        loop {
            let msg = tokio::select! {
                _ = self.cancel.cancelled() => return,
                received = outer.recv() => match received {
                    Some(msg) => msg,
                    None => return,
                },
            };

            if let Err(err) = validate_msg(&msg, &self.component.operators, self.duty) {
                warn!("dropping invalid {} message: {err}", msg.wire().kind());
                continue;
            }

            // Cache the carried values so a subsequent broadcast or QBFT
            // operation can resolve any hash this message quoted.
            self.values.put(msg.carried_values().clone());

            let wire = msg.wire().clone();
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.recv_tx.send(msg) => {
                    if result.is_err() {
                        // Consumer gone; the instance is over.
                        return;
                    }
                    self.sniffer.add(&wire);
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
