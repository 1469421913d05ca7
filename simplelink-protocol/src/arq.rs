//! ARQ Table
//!
//! Tracks every outstanding data packet until it is acknowledged, cancelled
//! or abandoned. Each entry carries its own retry timer; the interval grows
//! by the configured [`Backoff`] policy after every retransmission.
//!
//! The table never transmits by itself. [`ArqTable::advance`] accumulates
//! elapsed time and [`ArqTable::due`] reports which entries need attention;
//! the link engine decides whether the channel allows a transmission and
//! reports back through [`ArqTable::mark_transmitted`],
//! [`ArqTable::record_retry`] and [`ArqTable::remove`].

use crate::packet::Packet;
use crate::prn::Prn;
use thiserror::Error;

/// Default initial retry interval
pub const DEFAULT_BASE_RETRY_MS: u32 = 500;

/// Default number of retransmissions before a packet is abandoned
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Default maximum number of outstanding packets
pub const DEFAULT_MAX_OUTSTANDING: usize = 256;

/// Retry interval growth policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// `base * (retries + 1)`
    #[default]
    Linear,
    /// `base * 2^retries`
    Exponential,
}

impl Backoff {
    /// Interval to wait after the `retries`-th retransmission
    pub fn interval(self, base_ms: u32, retries: u32) -> u32 {
        match self {
            Backoff::Linear => base_ms.saturating_mul(retries.saturating_add(1)),
            Backoff::Exponential => base_ms.saturating_mul(1u32 << retries.min(16)),
        }
    }
}

/// ARQ timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArqConfig {
    pub base_retry_ms: u32,
    pub max_retries: u32,
    pub backoff: Backoff,
    pub max_outstanding: usize,
}

impl Default for ArqConfig {
    fn default() -> Self {
        ArqConfig {
            base_retry_ms: DEFAULT_BASE_RETRY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            max_outstanding: DEFAULT_MAX_OUTSTANDING,
        }
    }
}

/// ARQ table errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArqError {
    #[error("ARQ table full ({capacity} outstanding packets)")]
    TableFull { capacity: usize },

    #[error("PRN {0} already outstanding")]
    DuplicatePrn(Prn),
}

/// One outstanding packet
#[derive(Debug, Clone)]
pub struct ArqEntry {
    pub prn: Prn,
    /// Encoded-ready packet kept for retransmission
    pub packet: Packet,
    /// Retransmissions so far
    pub retry_count: u32,
    /// Current wait before the next retransmission
    pub interval_ms: u32,
    /// Time since the last (re)transmission
    pub elapsed_ms: u64,
    /// Time since the first transmission
    pub total_elapsed_ms: u64,
    /// False while the first transmission is held back by congestion control
    pub transmitted: bool,
}

impl ArqEntry {
    fn is_due(&self) -> bool {
        !self.transmitted || self.elapsed_ms >= u64::from(self.interval_ms)
    }
}

/// What the engine should do with a due entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// First transmission was deferred and is still pending
    Transmit(Prn),
    /// Retry interval elapsed with retries left
    Retry(Prn),
    /// Retry interval elapsed with no retries left
    Expire(Prn),
}

/// Table of outstanding packets in send order
#[derive(Debug, Clone)]
pub struct ArqTable {
    config: ArqConfig,
    entries: Vec<ArqEntry>,
}

impl ArqTable {
    pub fn new(config: ArqConfig) -> Self {
        ArqTable {
            config,
            entries: Vec::with_capacity(config.max_outstanding.min(DEFAULT_MAX_OUTSTANDING)),
        }
    }

    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.config.max_outstanding
    }

    pub fn contains(&self, prn: Prn) -> bool {
        self.entries.iter().any(|e| e.prn == prn)
    }

    pub fn get(&self, prn: Prn) -> Option<&ArqEntry> {
        self.entries.iter().find(|e| e.prn == prn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArqEntry> {
        self.entries.iter()
    }

    /// Start tracking a packet that is about to be transmitted
    pub fn insert(&mut self, packet: Packet) -> Result<(), ArqError> {
        if self.is_full() {
            return Err(ArqError::TableFull {
                capacity: self.config.max_outstanding,
            });
        }
        if self.contains(packet.prn) {
            return Err(ArqError::DuplicatePrn(packet.prn));
        }

        self.entries.push(ArqEntry {
            prn: packet.prn,
            packet,
            retry_count: 0,
            interval_ms: self.config.base_retry_ms,
            elapsed_ms: 0,
            total_elapsed_ms: 0,
            transmitted: false,
        });
        Ok(())
    }

    /// Accumulate elapsed time on every transmitted entry
    pub fn advance(&mut self, elapsed_ms: u32) {
        let elapsed = u64::from(elapsed_ms);
        for entry in self.entries.iter_mut().filter(|e| e.transmitted) {
            entry.elapsed_ms = entry.elapsed_ms.saturating_add(elapsed);
            entry.total_elapsed_ms = entry.total_elapsed_ms.saturating_add(elapsed);
        }
    }

    /// Entries that need a transmission decision, in send order
    pub fn due(&self) -> Vec<TimerAction> {
        self.entries
            .iter()
            .filter(|e| e.is_due())
            .map(|e| {
                if !e.transmitted {
                    TimerAction::Transmit(e.prn)
                } else if e.retry_count >= self.config.max_retries {
                    TimerAction::Expire(e.prn)
                } else {
                    TimerAction::Retry(e.prn)
                }
            })
            .collect()
    }

    /// Record the first transmission and start the retry timer
    pub fn mark_transmitted(&mut self, prn: Prn) -> Option<&Packet> {
        let entry = self.entries.iter_mut().find(|e| e.prn == prn)?;
        entry.transmitted = true;
        entry.elapsed_ms = 0;
        Some(&entry.packet)
    }

    /// Record a retransmission, returning the packet and the new interval
    ///
    /// Returns `None` for unknown PRNs and for entries with no retries left.
    pub fn record_retry(&mut self, prn: Prn) -> Option<(&Packet, u32)> {
        let config = self.config;
        let entry = self.entries.iter_mut().find(|e| e.prn == prn)?;
        if entry.retry_count >= config.max_retries {
            return None;
        }

        entry.retry_count += 1;
        let next = config.backoff.interval(config.base_retry_ms, entry.retry_count);
        // Never shrink, whatever the policy
        entry.interval_ms = next.max(entry.interval_ms);
        entry.elapsed_ms = 0;

        Some((&entry.packet, entry.interval_ms))
    }

    /// Stop tracking a packet (acknowledged, expired or cancelled)
    pub fn remove(&mut self, prn: Prn) -> Option<ArqEntry> {
        let idx = self.entries.iter().position(|e| e.prn == prn)?;
        Some(self.entries.remove(idx))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
