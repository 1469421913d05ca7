//! Shared in-memory radio channel
//!
//! Models several stations on one broadcast frequency. Bytes written by a
//! station are delivered to every other station that can hear it. Hearing is
//! a per-direction reachability matrix, so hidden-node topologies (A hears B,
//! B hears C, A cannot hear C) can be built for relay tests.

use parking_lot::Mutex;
use simplelink_protocol::transport::{ByteSink, ByteSource};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Station handle on a [`SharedMedium`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StationId(usize);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station#{}", self.0)
    }
}

/// Medium configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediumError {
    #[error("Unknown station {0}")]
    UnknownStation(StationId),
}

#[derive(Debug, Default)]
struct Endpoint {
    name: String,
    inbox: VecDeque<u8>,
    /// Bytes accepted per write call, `None` for unlimited
    write_limit: Option<usize>,
}

#[derive(Debug, Default)]
struct MediumState {
    endpoints: Vec<Endpoint>,
    /// `blocked[from][to]` is true when `to` cannot hear `from`
    blocked: Vec<Vec<bool>>,
    bytes_carried: u64,
}

impl MediumState {
    fn check(&self, id: StationId) -> Result<(), MediumError> {
        if id.0 < self.endpoints.len() {
            Ok(())
        } else {
            Err(MediumError::UnknownStation(id))
        }
    }
}

/// Broadcast channel shared by in-memory stations
#[derive(Debug, Clone, Default)]
pub struct SharedMedium {
    state: Arc<Mutex<MediumState>>,
}

impl SharedMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a station that hears and is heard by everyone
    pub fn join(&self, name: &str) -> (StationId, MediumPort) {
        let mut state = self.state.lock();
        let id = StationId(state.endpoints.len());

        state.endpoints.push(Endpoint {
            name: name.to_string(),
            ..Endpoint::default()
        });
        for row in state.blocked.iter_mut() {
            row.push(false);
        }
        let width = state.endpoints.len();
        state.blocked.push(vec![false; width]);

        trace!(%id, name, "joined medium");
        (
            id,
            MediumPort {
                id,
                state: Arc::clone(&self.state),
            },
        )
    }

    /// Allow or prevent `to` from hearing `from`
    pub fn set_reachable(
        &self,
        from: StationId,
        to: StationId,
        reachable: bool,
    ) -> Result<(), MediumError> {
        let mut state = self.state.lock();
        state.check(from)?;
        state.check(to)?;
        state.blocked[from.0][to.0] = !reachable;
        Ok(())
    }

    /// Set reachability in both directions
    pub fn set_link(&self, a: StationId, b: StationId, up: bool) -> Result<(), MediumError> {
        self.set_reachable(a, b, up)?;
        self.set_reachable(b, a, up)
    }

    /// Limit how many bytes a station's writer accepts per call
    pub fn set_write_limit(&self, id: StationId, limit: Option<usize>) -> Result<(), MediumError> {
        let mut state = self.state.lock();
        state.check(id)?;
        state.endpoints[id.0].write_limit = limit;
        Ok(())
    }

    /// Inject raw bytes into one station's receive queue
    pub fn inject(&self, to: StationId, bytes: &[u8]) -> Result<(), MediumError> {
        let mut state = self.state.lock();
        state.check(to)?;
        state.endpoints[to.0].inbox.extend(bytes);
        Ok(())
    }

    /// Bytes waiting to be read by a station
    pub fn pending(&self, id: StationId) -> Result<usize, MediumError> {
        let state = self.state.lock();
        state.check(id)?;
        Ok(state.endpoints[id.0].inbox.len())
    }

    pub fn name(&self, id: StationId) -> Option<String> {
        self.state.lock().endpoints.get(id.0).map(|e| e.name.clone())
    }

    /// Total bytes transmitted onto the medium
    pub fn bytes_carried(&self) -> u64 {
        self.state.lock().bytes_carried
    }
}

/// One station's connection to a [`SharedMedium`]
#[derive(Debug, Clone)]
pub struct MediumPort {
    id: StationId,
    state: Arc<Mutex<MediumState>>,
}

impl MediumPort {
    pub fn id(&self) -> StationId {
        self.id
    }

    /// Boxed halves ready for `LinkEngine::attach`
    pub fn split(&self) -> (Box<dyn ByteSource>, Box<dyn ByteSink>) {
        (Box::new(self.clone()), Box::new(self.clone()))
    }
}

impl ByteSource for MediumPort {
    fn available(&mut self) -> io::Result<usize> {
        Ok(self.state.lock().endpoints[self.id.0].inbox.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let inbox = &mut state.endpoints[self.id.0].inbox;
        let n = buf.len().min(inbox.len());
        for (slot, byte) in buf.iter_mut().zip(inbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ByteSink for MediumPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let from = self.id.0;
        let n = match state.endpoints[from].write_limit {
            Some(0) if !buf.is_empty() => return Err(io::ErrorKind::WouldBlock.into()),
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };

        let MediumState {
            endpoints,
            blocked,
            bytes_carried,
        } = &mut *state;
        for (to, endpoint) in endpoints.iter_mut().enumerate() {
            if to != from && !blocked[from][to] {
                endpoint.inbox.extend(&buf[..n]);
            }
        }
        *bytes_carried += n as u64;

        Ok(n)
    }
}
