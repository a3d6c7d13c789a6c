//! Configuration for the consensus transport.

/// Configuration for a consensus transport instance.
///
/// One transport exists per consensus instance (per duty); the config is
/// shared by all instances of a node and is plain data — collectors, hosts
/// and keys are passed separately so tests can wire their own.
#[derive(Debug, Clone)]
pub struct ConsensusNetConfig {
    /// Capacity of the inner channel feeding the QBFT state machine.
    /// Bounded on purpose: if QBFT cannot drain, broadcasters block rather
    /// than drop, and the instance times out at the QBFT level.
    pub recv_buffer_size: usize,

    /// Maximum size of a single serialized message in bytes.
    /// Consensus votes are small, but proposal values can be tens of KB and
    /// a message may carry several of them.
    pub max_message_size: usize,

    /// Fraction of outbound messages encoded in the legacy inline-values
    /// format, in [0, 1].  Starts near 1.0 in a deployment wave that must
    /// interoperate with old peers and is lowered to 0.0 as the fleet
    /// upgrades.
    pub legacy_probability: f64,
}

impl Default for ConsensusNetConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: 1_000,
            max_message_size: 1_048_576, // 1 MiB
            legacy_probability: 0.0,
        }
    }
}

impl ConsensusNetConfig {
    /// Create a config suitable for local testing with a small buffer.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            recv_buffer_size: 16,
            max_message_size: 1_048_576,
            legacy_probability: 0.0,
        }
    }
}
