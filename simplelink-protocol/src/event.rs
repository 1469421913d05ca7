//! Link events
//!
//! Everything the engine reports to its host is a [`LinkEvent`]. Events are
//! produced synchronously inside `send`, `tick` and `cancel` and handed to an
//! [`EventSink`].

use crate::prn::Prn;
use crate::route::Route;
use bytes::Bytes;
use crossbeam::channel::Sender;
use std::collections::VecDeque;
use std::fmt;

/// Notification from the link engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A data packet addressed to this station was delivered
    Recv {
        prn: Prn,
        route: Route,
        payload: Bytes,
    },
    /// An outstanding packet was acknowledged
    Ack { prn: Prn },
    /// A data packet for another station was overheard
    Observe {
        prn: Prn,
        route: Route,
        payload: Bytes,
    },
    /// An outstanding packet was retransmitted
    Retry { prn: Prn, next_retry_ms: u32 },
    /// An outstanding packet was abandoned or cancelled
    Expire { prn: Prn },
    /// A new packet was accepted for sending
    Send {
        prn: Prn,
        route: Route,
        payload: Bytes,
    },
}

impl LinkEvent {
    pub fn prn(&self) -> Prn {
        match self {
            LinkEvent::Recv { prn, .. }
            | LinkEvent::Ack { prn }
            | LinkEvent::Observe { prn, .. }
            | LinkEvent::Retry { prn, .. }
            | LinkEvent::Expire { prn }
            | LinkEvent::Send { prn, .. } => *prn,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Recv { .. } => "recv",
            LinkEvent::Ack { .. } => "ack",
            LinkEvent::Observe { .. } => "observe",
            LinkEvent::Retry { .. } => "retry",
            LinkEvent::Expire { .. } => "expire",
            LinkEvent::Send { .. } => "send",
        }
    }
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::Recv {
                prn,
                route,
                payload,
            }
            | LinkEvent::Observe {
                prn,
                route,
                payload,
            }
            | LinkEvent::Send {
                prn,
                route,
                payload,
            } => write!(
                f,
                "{} #{} [{}] {}",
                self.name(),
                prn,
                route,
                String::from_utf8_lossy(payload)
            ),
            LinkEvent::Ack { prn } | LinkEvent::Expire { prn } => {
                write!(f, "{} #{}", self.name(), prn)
            }
            LinkEvent::Retry { prn, next_retry_ms } => {
                write!(f, "retry #{} (next in {} ms)", prn, next_retry_ms)
            }
        }
    }
}

/// Receiver of engine events
pub trait EventSink: Send {
    fn emit(&mut self, event: LinkEvent);
}

impl EventSink for Vec<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        self.push(event);
    }
}

impl EventSink for VecDeque<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        self.push_back(event);
    }
}

/// Forward events to another thread; a disconnected receiver drops them
impl EventSink for Sender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        let _ = self.send(event);
    }
}

/// Adapter turning a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: FnMut(LinkEvent) + Send,
{
    fn emit(&mut self, event: LinkEvent) {
        (self.0)(event)
    }
}

/// Wrap a closure as an event sink
pub fn sink_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(LinkEvent) + Send,
{
    FnSink(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_prn_accessor() {
        let event = LinkEvent::Retry {
            prn: Prn::new(4),
            next_retry_ms: 1000,
        };
        assert_eq!(event.prn(), Prn::new(4));
        assert_eq!(event.name(), "retry");
    }

    #[test]
    fn test_display() {
        let route = Route::new(&[Address::encode("KI7EST").unwrap()]).unwrap();
        let event = LinkEvent::Send {
            prn: Prn::new(1),
            route,
            payload: Bytes::from_static(b"Foo"),
        };
        assert_eq!(event.to_string(), "send #1 [| KI7EST] Foo");
        assert_eq!(LinkEvent::Ack { prn: Prn::new(2) }.to_string(), "ack #2");
    }

    #[test]
    fn test_channel_sink() {
        let (tx, rx) = unbounded();
        let mut sink = tx;
        sink.emit(LinkEvent::Expire { prn: Prn::new(9) });
        assert_eq!(rx.try_recv().unwrap(), LinkEvent::Expire { prn: Prn::new(9) });

        // Dropped receiver is not an error
        drop(rx);
        sink.emit(LinkEvent::Expire { prn: Prn::new(10) });
    }

    #[test]
    fn test_closure_sink() {
        let mut count = 0;
        {
            let mut sink = sink_fn(|_event| count += 1);
            sink.emit(LinkEvent::Ack { prn: Prn::new(1) });
            sink.emit(LinkEvent::Ack { prn: Prn::new(2) });
        }
        assert_eq!(count, 2);
    }
}
