//! Link Engine
//!
//! Ties the codec, ARQ table, duplicate filter and congestion strategy to a
//! byte-stream transport. The host drives it:
//!
//! 1. [`LinkEngine::initialize`] with the station address,
//! 2. [`LinkEngine::attach`] a transport,
//! 3. [`LinkEngine::send`] messages and call [`LinkEngine::tick`] on a fixed
//!    cadence, consuming the resulting [`LinkEvent`]s.
//!
//! The engine is single-owner and never blocks; all waiting is carried as
//! state between ticks.

use crate::address::Address;
use crate::arq::{ArqConfig, ArqTable, Backoff, TimerAction};
use crate::congestion::{ChannelState, CongestionControl, NeverDefer};
use crate::dedup::{RecentPrns, DEFAULT_DEDUP_CAPACITY};
use crate::dispatch::{classify, Disposition};
use crate::event::{EventSink, LinkEvent};
use crate::frame::{self, FrameDecoder, FrameError};
use crate::kiss::DEFAULT_DECODER_CAPACITY;
use crate::packet::{Packet, PacketKind, MAX_PAYLOAD};
use crate::prn::{Prn, PrnAllocator};
use crate::route::{Route, RouteError, ROUTE_CAPACITY};
use crate::transport::{non_blocking, ByteSink, ByteSource, Transport};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Read chunk size
const READ_CHUNK: usize = 1024;

/// Upper bound on read/decode passes in one tick
const MAX_DRAIN_PASSES: usize = 4;

/// Encoded output held while the sink is stalled
const MAX_PENDING_TX: usize = 4 * frame::MAX_ENCODED_FRAME;

/// Relayed frames are dropped once this much output is queued
const RELAY_PENDING_LIMIT: usize = 2 * frame::MAX_ENCODED_FRAME;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Initial retry interval
    pub base_retry_ms: u32,
    /// Retransmissions before a packet expires
    pub max_retries: u32,
    /// Retry interval growth
    pub backoff: Backoff,
    /// Maximum unacknowledged packets
    pub max_outstanding: usize,
    /// Receive buffer size (raised to hold two worst-case frames)
    pub rx_buffer_capacity: usize,
    /// Forward packets for which this station is an intermediate hop
    pub relay: bool,
    /// KISS port for outgoing data frames
    pub kiss_port: u8,
    /// Number of recently delivered messages remembered
    pub dedup_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let arq = ArqConfig::default();
        LinkConfig {
            base_retry_ms: arq.base_retry_ms,
            max_retries: arq.max_retries,
            backoff: arq.backoff,
            max_outstanding: arq.max_outstanding,
            rx_buffer_capacity: DEFAULT_DECODER_CAPACITY,
            relay: true,
            kiss_port: 0,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl LinkConfig {
    pub fn arq(&self) -> ArqConfig {
        ArqConfig {
            base_retry_ms: self.base_retry_ms,
            max_retries: self.max_retries,
            backoff: self.backoff,
            max_outstanding: self.max_outstanding,
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No station address yet
    Uninitialized,
    /// Initialized without a transport
    Detached,
    /// Initialized with a transport
    Attached,
}

/// Errors from [`LinkEngine::initialize`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Station address {0} is reserved")]
    ReservedStation(Address),
}

/// Errors from [`LinkEngine::send`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Engine not initialized")]
    NotInitialized,

    #[error("No transport attached")]
    NotAttached,

    #[error("Route is empty")]
    EmptyRoute,

    #[error("Route too long: {len} stations including origin (max {max})")]
    RouteTooLong { len: usize, max: usize },

    #[error("Route contains the reserved zero address")]
    ReservedAddress,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Too many outstanding packets ({capacity})")]
    TableFull { capacity: usize },

    #[error("No free packet reference number")]
    NoPrnAvailable,
}

impl From<RouteError> for SendError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::RouteTooLong { len, max } => SendError::RouteTooLong { len, max },
            RouteError::Empty => SendError::EmptyRoute,
            _ => SendError::ReservedAddress,
        }
    }
}

/// Cumulative engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Valid frames decoded
    pub frames_in: u64,
    /// Frames queued for transmission
    pub frames_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Frames dropped for a bad checksum
    pub crc_failures: u64,
    /// Frames dropped for bad framing or layout
    pub malformed: u64,
    /// Data packets for other stations
    pub observed: u64,
    /// Messages delivered to this station
    pub delivered: u64,
    /// Re-received messages that were only re-acknowledged
    pub duplicates: u64,
    /// Packets forwarded as an intermediate hop
    pub relayed: u64,
    /// Acks and relays dropped because the output queue was full
    pub tx_dropped: u64,
    /// Retransmissions of outstanding packets
    pub retries: u64,
    /// Outstanding packets acknowledged
    pub acked: u64,
    /// Outstanding packets abandoned or cancelled
    pub expired: u64,
    /// Transmissions held back by congestion control
    pub deferrals: u64,
    /// Read or write failures other than `WouldBlock`
    pub transport_errors: u64,
}

/// Summary of one [`LinkEngine::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bytes_read: usize,
    pub bytes_written: usize,
    /// Valid packets decoded
    pub packets: usize,
    /// Frames dropped (checksum, framing or layout)
    pub rejected: usize,
    /// Events emitted during the tick
    pub events: usize,
    pub transport_errors: usize,
    /// Packets still awaiting acknowledgement
    pub outstanding: usize,
    /// Encoded bytes left for the next tick
    pub pending_tx_bytes: usize,
}

/// Reliable link engine for one station
pub struct LinkEngine {
    config: LinkConfig,
    station: Option<Address>,
    source: Option<Box<dyn ByteSource>>,
    sink: Option<Box<dyn ByteSink>>,
    decoder: FrameDecoder,
    outbound: BytesMut,
    arq: ArqTable,
    prns: PrnAllocator,
    recent: RecentPrns,
    congestion: Box<dyn CongestionControl>,
    events: VecDeque<LinkEvent>,
    event_sink: Option<Box<dyn EventSink>>,
    events_emitted: u64,
    clock_ms: u64,
    last_rx_ms: Option<u64>,
    last_tx_ms: Option<u64>,
    stats: EngineStats,
    scratch: Vec<u8>,
}

impl LinkEngine {
    pub fn new(config: LinkConfig) -> Self {
        LinkEngine {
            config,
            station: None,
            source: None,
            sink: None,
            decoder: FrameDecoder::with_capacity(config.rx_buffer_capacity),
            outbound: BytesMut::new(),
            arq: ArqTable::new(config.arq()),
            prns: PrnAllocator::random(),
            recent: RecentPrns::with_capacity(config.dedup_capacity),
            congestion: Box::new(NeverDefer),
            events: VecDeque::new(),
            event_sink: None,
            events_emitted: 0,
            clock_ms: 0,
            last_rx_ms: None,
            last_tx_ms: None,
            stats: EngineStats::default(),
            scratch: vec![0u8; READ_CHUNK],
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Replace the congestion strategy
    pub fn set_congestion_control(&mut self, strategy: Box<dyn CongestionControl>) {
        debug!(strategy = strategy.name(), "congestion control set");
        self.congestion = strategy;
    }

    /// Deliver events to `sink` instead of the internal queue
    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.event_sink = Some(sink);
    }

    /// Return to queuing events internally
    pub fn clear_event_sink(&mut self) -> Option<Box<dyn EventSink>> {
        self.event_sink.take()
    }

    /// Take all queued events
    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        self.events.drain(..).collect()
    }

    pub fn state(&self) -> EngineState {
        match (self.station, self.is_attached()) {
            (None, _) => EngineState::Uninitialized,
            (Some(_), false) => EngineState::Detached,
            (Some(_), true) => EngineState::Attached,
        }
    }

    pub fn station(&self) -> Option<Address> {
        self.station
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some() && self.sink.is_some()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Packets awaiting acknowledgement
    pub fn outstanding(&self) -> usize {
        self.arq.len()
    }

    pub fn is_outstanding(&self, prn: Prn) -> bool {
        self.arq.contains(prn)
    }

    pub fn pending_tx_bytes(&self) -> usize {
        self.outbound.len()
    }

    /// Engine clock, the sum of all tick intervals since initialization
    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Set the station address and reset all link state
    pub fn initialize(&mut self, station: Address) -> Result<(), InitError> {
        if station.is_none() || station.is_broadcast() {
            return Err(InitError::ReservedStation(station));
        }

        self.station = Some(station);
        self.arq.clear();
        self.prns.reseed();
        self.recent.clear();
        self.decoder.reset();
        self.outbound.clear();
        self.clock_ms = 0;
        self.last_rx_ms = None;
        self.last_tx_ms = None;

        info!(%station, "link engine initialized");
        Ok(())
    }

    /// Bind a transport, returning the previous one
    ///
    /// Partially received frames and unflushed output belong to the old
    /// transport and are discarded.
    pub fn attach(
        &mut self,
        source: Box<dyn ByteSource>,
        sink: Box<dyn ByteSink>,
    ) -> Option<Transport> {
        let previous = self.detach();
        self.source = Some(source);
        self.sink = Some(sink);
        info!("transport attached");
        previous
    }

    /// Unbind the transport
    pub fn detach(&mut self) -> Option<Transport> {
        self.decoder.reset();
        self.outbound.clear();

        match (self.source.take(), self.sink.take()) {
            (Some(source), Some(sink)) => {
                info!("transport detached");
                Some((source, sink))
            }
            _ => None,
        }
    }

    /// Send `payload` along `hops`, returning the assigned PRN
    ///
    /// This station is recorded as the origin, so at most
    /// `ROUTE_CAPACITY - 1` hops may be given. On error nothing changes.
    pub fn send(&mut self, hops: &[Address], payload: &[u8]) -> Result<Prn, SendError> {
        let station = self.station.ok_or(SendError::NotInitialized)?;
        if !self.is_attached() {
            return Err(SendError::NotAttached);
        }

        if hops.is_empty() {
            return Err(SendError::EmptyRoute);
        }
        if hops.len() + 1 > ROUTE_CAPACITY {
            return Err(SendError::RouteTooLong {
                len: hops.len() + 1,
                max: ROUTE_CAPACITY,
            });
        }
        let route = Route::new(hops)?.depart(station)?;

        if payload.len() > MAX_PAYLOAD {
            return Err(SendError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if self.arq.is_full() {
            return Err(SendError::TableFull {
                capacity: self.config.max_outstanding,
            });
        }

        let arq = &self.arq;
        let prn = self
            .prns
            .allocate(|candidate| arq.contains(candidate))
            .ok_or(SendError::NoPrnAvailable)?;

        let packet = Packet::data(prn, route.clone(), Bytes::copy_from_slice(payload));
        self.arq.insert(packet).map_err(|_| SendError::TableFull {
            capacity: self.config.max_outstanding,
        })?;

        debug!(%prn, %route, len = payload.len(), "message accepted");
        self.emit(LinkEvent::Send {
            prn,
            route,
            payload: Bytes::copy_from_slice(payload),
        });

        self.transmit_first(prn);
        self.flush();

        Ok(prn)
    }

    /// Abandon an outstanding packet
    pub fn cancel(&mut self, prn: Prn) -> bool {
        if self.arq.remove(prn).is_none() {
            return false;
        }

        debug!(%prn, "cancelled");
        self.stats.expired += 1;
        self.emit(LinkEvent::Expire { prn });
        true
    }

    /// Run one engine step covering `elapsed_ms`
    pub fn tick(&mut self, elapsed_ms: u32) -> TickReport {
        let mut report = TickReport::default();
        if self.station.is_none() {
            return report;
        }

        let events_before = self.events_emitted;
        let errors_before = self.stats.transport_errors;
        self.clock_ms = self.clock_ms.saturating_add(u64::from(elapsed_ms));

        self.receive(&mut report);
        self.run_timers(elapsed_ms);
        report.bytes_written = self.flush();

        report.events = (self.events_emitted - events_before) as usize;
        report.transport_errors = (self.stats.transport_errors - errors_before) as usize;
        report.outstanding = self.arq.len();
        report.pending_tx_bytes = self.outbound.len();

        if report.packets > 0 || report.events > 0 {
            trace!(?report, "tick");
        }
        report
    }

    /// Drain the source and dispatch every complete frame
    fn receive(&mut self, report: &mut TickReport) {
        for _ in 0..MAX_DRAIN_PASSES {
            let read = self.read_source();
            report.bytes_read += read;

            while let Some(result) = self.decoder.next_packet() {
                match result {
                    Ok(packet) => {
                        report.packets += 1;
                        self.stats.frames_in += 1;
                        self.dispatch(packet);
                    }
                    Err(err) => {
                        report.rejected += 1;
                        self.record_rejection(&err);
                    }
                }
            }

            if read == 0 {
                break;
            }
        }
    }

    fn read_source(&mut self) -> usize {
        let Some(source) = self.source.as_mut() else {
            return 0;
        };

        let mut total = 0;
        loop {
            let free = self.decoder.free_space();
            if free == 0 {
                break;
            }

            let available = match non_blocking(source.available()) {
                Ok(available) => available,
                Err(err) => {
                    warn!(error = %err, "transport availability check failed");
                    self.stats.transport_errors += 1;
                    break;
                }
            };
            if available == 0 {
                break;
            }

            let want = available.min(free).min(self.scratch.len());
            let read = match non_blocking(source.read(&mut self.scratch[..want])) {
                Ok(read) => read,
                Err(err) => {
                    warn!(error = %err, "transport read failed");
                    self.stats.transport_errors += 1;
                    break;
                }
            };
            if read == 0 {
                break;
            }

            self.decoder.push(&self.scratch[..read]);
            total += read;
        }

        if total > 0 {
            self.last_rx_ms = Some(self.clock_ms);
            self.stats.bytes_in += total as u64;
        }
        total
    }

    fn record_rejection(&mut self, err: &FrameError) {
        match err {
            FrameError::CrcMismatch { .. } => self.stats.crc_failures += 1,
            _ => self.stats.malformed += 1,
        }
        debug!(error = %err, "frame dropped");
    }

    fn dispatch(&mut self, packet: Packet) {
        let Some(station) = self.station else {
            return;
        };
        trace!(%packet, "received");

        match classify(&packet, station) {
            Disposition::Deliver { route, ack_route } => {
                let origin = packet.route.origin().unwrap_or(Address::NONE);
                if self.recent.insert(origin, packet.prn) {
                    self.stats.delivered += 1;
                    self.emit(LinkEvent::Recv {
                        prn: packet.prn,
                        route,
                        payload: packet.payload,
                    });
                } else {
                    self.stats.duplicates += 1;
                    debug!(prn = %packet.prn, %origin, "duplicate re-acknowledged");
                }
                self.queue(&Packet::ack(packet.prn, ack_route), MAX_PENDING_TX);
            }
            Disposition::Forward { route } => {
                if packet.kind == PacketKind::Data {
                    self.stats.observed += 1;
                    self.emit(LinkEvent::Observe {
                        prn: packet.prn,
                        route: packet.route.clone(),
                        payload: packet.payload.clone(),
                    });
                }
                if self.config.relay {
                    let next = route.current_hop();
                    if self.queue(&packet.with_route(route), RELAY_PENDING_LIMIT) {
                        self.stats.relayed += 1;
                        debug!(prn = %packet.prn, kind = %packet.kind, ?next, "relaying");
                    }
                }
            }
            Disposition::Observe => {
                self.stats.observed += 1;
                self.emit(LinkEvent::Observe {
                    prn: packet.prn,
                    route: packet.route,
                    payload: packet.payload,
                });
            }
            Disposition::Acknowledged => {
                if self.arq.remove(packet.prn).is_some() {
                    self.stats.acked += 1;
                    debug!(prn = %packet.prn, "acknowledged");
                    self.emit(LinkEvent::Ack { prn: packet.prn });
                } else {
                    trace!(prn = %packet.prn, "ack for unknown packet ignored");
                }
            }
            Disposition::Ignore => {}
        }
    }

    fn run_timers(&mut self, elapsed_ms: u32) {
        self.arq.advance(elapsed_ms);

        for action in self.arq.due() {
            match action {
                TimerAction::Transmit(prn) => self.transmit_first(prn),
                TimerAction::Expire(prn) => {
                    if self.arq.remove(prn).is_some() {
                        self.stats.expired += 1;
                        debug!(%prn, "retries exhausted");
                        self.emit(LinkEvent::Expire { prn });
                    }
                }
                TimerAction::Retry(prn) => {
                    if !self.has_room_for_own() || self.should_defer() {
                        continue;
                    }
                    let port = self.config.kiss_port;
                    let Some((packet, next_retry_ms)) = self.arq.record_retry(prn) else {
                        continue;
                    };
                    if queue_frame(&mut self.outbound, packet, port, MAX_PENDING_TX)
                        == Queued::Accepted
                    {
                        self.stats.frames_out += 1;
                    }
                    self.stats.retries += 1;
                    debug!(%prn, next_retry_ms, "retransmitted");
                    self.emit(LinkEvent::Retry { prn, next_retry_ms });
                }
            }
        }
    }

    /// First transmission of an outstanding packet, subject to congestion
    fn transmit_first(&mut self, prn: Prn) {
        if !self.has_room_for_own() {
            trace!(%prn, pending = self.outbound.len(), "output queue full, send held");
            return;
        }
        if self.should_defer() {
            trace!(%prn, "first transmission deferred");
            return;
        }
        let port = self.config.kiss_port;
        if let Some(packet) = self.arq.mark_transmitted(prn) {
            if queue_frame(&mut self.outbound, packet, port, MAX_PENDING_TX) == Queued::Accepted
            {
                self.stats.frames_out += 1;
            }
        }
    }

    /// Whether a worst-case frame of our own still fits in the output queue
    ///
    /// Own packets wait in the ARQ table instead of being dropped.
    fn has_room_for_own(&self) -> bool {
        self.outbound.len() + frame::MAX_ENCODED_FRAME <= MAX_PENDING_TX
    }

    fn should_defer(&mut self) -> bool {
        let state = self.channel_state();
        let defer = self.congestion.should_defer_transmission(&state);
        if defer {
            self.stats.deferrals += 1;
        }
        defer
    }

    fn channel_state(&self) -> ChannelState {
        ChannelState {
            now_ms: self.clock_ms,
            since_last_rx_ms: self.last_rx_ms.map(|t| self.clock_ms.saturating_sub(t)),
            since_last_tx_ms: self.last_tx_ms.map(|t| self.clock_ms.saturating_sub(t)),
            outstanding: self.arq.len(),
            pending_tx_bytes: self.outbound.len(),
        }
    }

    /// Queue an ack or relayed frame, dropping it past `limit` queued bytes
    fn queue(&mut self, packet: &Packet, limit: usize) -> bool {
        match queue_frame(&mut self.outbound, packet, self.config.kiss_port, limit) {
            Queued::Accepted => {
                self.stats.frames_out += 1;
                true
            }
            Queued::Full => {
                self.stats.tx_dropped += 1;
                debug!(
                    prn = %packet.prn,
                    kind = %packet.kind,
                    pending = self.outbound.len(),
                    "output queue full, frame dropped"
                );
                false
            }
            Queued::Invalid => false,
        }
    }

    /// Write as much queued output as the sink takes
    fn flush(&mut self) -> usize {
        let Some(sink) = self.sink.as_mut() else {
            return 0;
        };

        let mut written = 0;
        while !self.outbound.is_empty() {
            match non_blocking(sink.write(&self.outbound)) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.advance(n);
                    written += n;
                }
                Err(err) => {
                    warn!(error = %err, "transport write failed");
                    self.stats.transport_errors += 1;
                    break;
                }
            }
        }

        if written > 0 {
            self.last_tx_ms = Some(self.clock_ms);
            self.stats.bytes_out += written as u64;
        }
        written
    }

    fn emit(&mut self, event: LinkEvent) {
        self.events_emitted += 1;
        match self.event_sink.as_mut() {
            Some(sink) => sink.emit(event),
            None => self.events.push_back(event),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queued {
    Accepted,
    /// Would take the queue past its limit
    Full,
    /// Could not be encoded
    Invalid,
}

fn queue_frame(outbound: &mut BytesMut, packet: &Packet, port: u8, limit: usize) -> Queued {
    let encoded = match frame::encode(packet, port) {
        Ok(encoded) => encoded,
        Err(err) => {
            warn!(prn = %packet.prn, error = %err, "packet could not be encoded");
            return Queued::Invalid;
        }
    };
    if outbound.len() + encoded.len() > limit {
        return Queued::Full;
    }
    outbound.extend_from_slice(&encoded);
    Queued::Accepted
}
