//! Wire-format negotiation between legacy and pointer encoding.
//!
//! During the rollout of the pointer format, a fleet contains peers that
//! understand only the legacy inline-values encoding.  Rather than gate on
//! a version handshake, each outbound message draws a fresh Bernoulli trial:
//! with probability `legacy_probability` it is encoded legacy, otherwise
//! pointer.  The per-message draw produces a mixed traffic mix that
//! exercises both paths across the fleet; once operators lower the
//! probability to 0.0 the legacy path is quiescent and can be removed in a
//! follow-up.

use rand::{rngs::OsRng, RngCore};
use std::sync::Mutex;

/// Per-message choice between the legacy and pointer wire format.
///
/// The default generator is the OS entropy source; the draw is not
/// security-sensitive, but no weaker generator is worth carrying a
/// dependency for.  Deterministic tests inject a seeded generator via
/// [`WireFormatPolicy::seeded`].
pub struct WireFormatPolicy {
    legacy_probability: f64,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl WireFormatPolicy {
    /// Create a policy with the given legacy probability, clamped to [0, 1].
    pub fn new(legacy_probability: f64) -> Self {
        Self::seeded(legacy_probability, OsRng)
    }

    /// Create a policy drawing from the given generator.
    pub fn seeded(legacy_probability: f64, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            legacy_probability: legacy_probability.clamp(0.0, 1.0),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// The configured legacy fraction.
    pub fn legacy_probability(&self) -> f64 {
        self.legacy_probability
    }

    /// Draw the encoding for one outbound message: true means pointer mode.
    ///
    /// One uniform byte gives a fraction in [0, 1] with 1/255 resolution,
    /// plenty for a rollout knob.
    pub fn pointer_values(&self) -> bool {
        let mut buf = [0u8; 1];
        self.rng
            .lock()
            .expect("wire format rng lock poisoned")
            .fill_bytes(&mut buf);
        let fraction = f64::from(buf[0]) / 255.0;
        fraction >= self.legacy_probability
    }
}

impl std::fmt::Debug for WireFormatPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFormatPolicy")
            .field("legacy_probability", &self.legacy_probability)
            .finish_non_exhaustive()
    }
}
