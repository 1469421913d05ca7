//! Congestion Control
//!
//! Stations share one half-duplex channel, so before an originated packet is
//! transmitted (first send or retry) the engine asks a pluggable strategy
//! whether to hold it back. A deferred packet is not sent this tick and is
//! reconsidered on the next one; strategies never block.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Snapshot of channel activity handed to the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    /// Engine clock (sum of tick intervals since initialization)
    pub now_ms: u64,
    /// Time since bytes were last received, if ever
    pub since_last_rx_ms: Option<u64>,
    /// Time since bytes were last written, if ever
    pub since_last_tx_ms: Option<u64>,
    /// Packets currently awaiting acknowledgement
    pub outstanding: usize,
    /// Encoded bytes queued but not yet written to the transport
    pub pending_tx_bytes: usize,
}

impl ChannelState {
    /// True if the channel carried traffic within `window_ms`
    pub fn heard_within(&self, window_ms: u64) -> bool {
        matches!(self.since_last_rx_ms, Some(since) if since < window_ms)
    }
}

/// Transmission deferral policy
pub trait CongestionControl: Send {
    /// Return `true` to hold the transmission until a later tick
    fn should_defer_transmission(&mut self, state: &ChannelState) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Always transmit immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverDefer;

impl CongestionControl for NeverDefer {
    fn should_defer_transmission(&mut self, _state: &ChannelState) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "never-defer"
    }
}

/// Wait for a quiet period after the last received byte
#[derive(Debug, Clone, Copy)]
pub struct CarrierSense {
    quiet_window_ms: u64,
}

impl CarrierSense {
    pub fn new(quiet_window_ms: u64) -> Self {
        CarrierSense { quiet_window_ms }
    }

    pub fn quiet_window_ms(&self) -> u64 {
        self.quiet_window_ms
    }
}

impl CongestionControl for CarrierSense {
    fn should_defer_transmission(&mut self, state: &ChannelState) -> bool {
        state.heard_within(self.quiet_window_ms)
    }

    fn name(&self) -> &'static str {
        "carrier-sense"
    }
}

/// p-persistent CSMA as used by KISS TNCs
///
/// While the channel is busy the packet waits. Once it is clear a random byte
/// is drawn each slot; the packet goes out when the byte is at most
/// `persistence`, giving a probability of `(persistence + 1) / 256`.
#[derive(Debug, Clone)]
pub struct PPersistence {
    persistence: u8,
    slot_time_ms: u64,
    last_deferral_ms: Option<u64>,
    rng: StdRng,
}

impl PPersistence {
    /// KISS defaults: persistence 63, slot time 100 ms
    pub fn new(persistence: u8, slot_time_ms: u64) -> Self {
        Self::with_rng(persistence, slot_time_ms, StdRng::from_entropy())
    }

    /// Deterministic variant for tests and simulations
    pub fn with_seed(persistence: u8, slot_time_ms: u64, seed: u64) -> Self {
        Self::with_rng(persistence, slot_time_ms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(persistence: u8, slot_time_ms: u64, rng: StdRng) -> Self {
        PPersistence {
            persistence,
            slot_time_ms,
            last_deferral_ms: None,
            rng,
        }
    }

    pub fn persistence(&self) -> u8 {
        self.persistence
    }

    pub fn slot_time_ms(&self) -> u64 {
        self.slot_time_ms
    }
}

impl Default for PPersistence {
    fn default() -> Self {
        Self::new(63, 100)
    }
}

impl CongestionControl for PPersistence {
    fn should_defer_transmission(&mut self, state: &ChannelState) -> bool {
        if state.heard_within(self.slot_time_ms) {
            return true;
        }

        // One draw per slot
        if let Some(last) = self.last_deferral_ms {
            if state.now_ms.saturating_sub(last) < self.slot_time_ms {
                return true;
            }
        }

        let draw: u8 = self.rng.gen();
        if draw <= self.persistence {
            self.last_deferral_ms = None;
            false
        } else {
            self.last_deferral_ms = Some(state.now_ms);
            true
        }
    }

    fn name(&self) -> &'static str {
        "p-persistence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(now_ms: u64) -> ChannelState {
        ChannelState {
            now_ms,
            ..ChannelState::default()
        }
    }

    fn heard(now_ms: u64, since: u64) -> ChannelState {
        ChannelState {
            now_ms,
            since_last_rx_ms: Some(since),
            ..ChannelState::default()
        }
    }

    #[test]
    fn test_never_defer() {
        let mut cc = NeverDefer;
        assert!(!cc.should_defer_transmission(&heard(0, 0)));
    }

    #[test]
    fn test_carrier_sense() {
        let mut cc = CarrierSense::new(200);
        assert!(!cc.should_defer_transmission(&quiet(0)));
        assert!(cc.should_defer_transmission(&heard(1000, 50)));
        assert!(!cc.should_defer_transmission(&heard(1000, 200)));
    }

    #[test]
    fn test_persistence_full_always_transmits_when_clear() {
        let mut cc = PPersistence::with_seed(255, 100, 7);
        for now in 0..100 {
            assert!(!cc.should_defer_transmission(&quiet(now * 33)));
        }
    }

    #[test]
    fn test_persistence_waits_for_busy_channel() {
        let mut cc = PPersistence::with_seed(255, 100, 7);
        assert!(cc.should_defer_transmission(&heard(500, 10)));
    }

    #[test]
    fn test_persistence_one_draw_per_slot() {
        let mut cc = PPersistence::with_seed(0, 100, 1);
        let mut now = 0;
        // p = 1/256, so the first clear draw almost surely defers
        while !cc.should_defer_transmission(&quiet(now)) {
            now += 100;
        }
        // Within the same slot the answer is fixed without drawing
        assert!(cc.should_defer_transmission(&quiet(now + 50)));
    }

    #[test]
    fn test_persistence_probability() {
        let mut cc = PPersistence::with_seed(63, 10, 42);
        let mut sent = 0;
        for slot in 0..2000u64 {
            if !cc.should_defer_transmission(&quiet(slot * 10)) {
                sent += 1;
            }
        }
        // Expect about a quarter
        assert!((300..700).contains(&sent), "sent {}", sent);
    }
}
