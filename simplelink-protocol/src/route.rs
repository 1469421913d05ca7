//! Source Routes
//!
//! A route is the ordered list of stations a packet visits. It is split by a
//! cursor into the hops already traversed (origin first) and the hops still
//! remaining. On the wire the cursor is a single zero address inside a fixed
//! array of [`WIRE_SLOTS`] addresses.

use crate::address::{Address, AddressError};
use std::fmt;
use thiserror::Error;

/// Maximum number of stations in a route (consumed + remaining)
pub const ROUTE_CAPACITY: usize = 16;

/// Number of addresses in the wire representation (capacity + separator)
pub const WIRE_SLOTS: usize = ROUTE_CAPACITY + 1;

/// Separator used in text routes, e.g. `KF7SJK->KI7EST`
pub const PATH_SEPARATOR: &str = "->";

/// Fixed wire representation of a route
pub type WireRoute = [Address; WIRE_SLOTS];

/// Route errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route too long: {len} stations (max {max})")]
    RouteTooLong { len: usize, max: usize },

    #[error("Route contains the reserved zero address")]
    ReservedAddress,

    #[error("Route has no remaining hops")]
    Empty,

    #[error("Wire route has no separator")]
    MissingSeparator,

    #[error("Invalid address in route: {0}")]
    InvalidAddress(#[from] AddressError),
}

/// Source route with a traversal cursor
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Route {
    consumed: Vec<Address>,
    remaining: Vec<Address>,
}

impl Route {
    /// Create a route that has not been traversed yet
    pub fn new(hops: &[Address]) -> Result<Self, RouteError> {
        Self::from_parts(Vec::new(), hops.to_vec())
    }

    /// Create a route from explicit consumed and remaining segments
    pub fn from_parts(consumed: Vec<Address>, remaining: Vec<Address>) -> Result<Self, RouteError> {
        let len = consumed.len() + remaining.len();
        if len > ROUTE_CAPACITY {
            return Err(RouteError::RouteTooLong {
                len,
                max: ROUTE_CAPACITY,
            });
        }
        if consumed.iter().chain(remaining.iter()).any(|a| a.is_none()) {
            return Err(RouteError::ReservedAddress);
        }

        Ok(Route {
            consumed,
            remaining,
        })
    }

    /// Parse a text route of the form `CALL1->CALL2->CALL3`
    pub fn parse(text: &str) -> Result<Self, RouteError> {
        let hops = text
            .split(PATH_SEPARATOR)
            .map(|hop| Address::encode(hop.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Route::new(&hops)
    }

    /// Split a wire route at its first zero entry
    ///
    /// Entries after a second zero are ignored since senders always transmit
    /// the full fixed-size array.
    pub fn from_wire(raw: &WireRoute) -> Result<Self, RouteError> {
        let cursor = raw
            .iter()
            .position(|addr| addr.is_none())
            .ok_or(RouteError::MissingSeparator)?;

        let consumed = raw[..cursor].to_vec();
        let remaining = raw[cursor + 1..]
            .iter()
            .copied()
            .take_while(|addr| !addr.is_none())
            .collect();

        Ok(Route {
            consumed,
            remaining,
        })
    }

    /// Serialize to the fixed wire representation
    pub fn to_wire(&self) -> WireRoute {
        let mut wire = [Address::NONE; WIRE_SLOTS];
        let cursor = self.consumed.len();

        wire[..cursor].copy_from_slice(&self.consumed);
        wire[cursor + 1..cursor + 1 + self.remaining.len()].copy_from_slice(&self.remaining);

        wire
    }

    /// Hops already traversed, in transmit order
    pub fn consumed(&self) -> &[Address] {
        &self.consumed
    }

    /// Hops still to traverse
    pub fn remaining(&self) -> &[Address] {
        &self.remaining
    }

    /// Total stations in the route
    pub fn len(&self) -> usize {
        self.consumed.len() + self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The next station to receive this packet
    pub fn current_hop(&self) -> Option<Address> {
        self.remaining.first().copied()
    }

    /// True when the current hop is the last station of the route
    pub fn is_final_hop(&self) -> bool {
        self.remaining.len() == 1
    }

    /// True when every hop has been traversed
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The station that originated the packet
    pub fn origin(&self) -> Option<Address> {
        self.consumed.first().copied()
    }

    /// The last station of the route
    pub fn final_destination(&self) -> Option<Address> {
        self.remaining
            .last()
            .or_else(|| self.consumed.last())
            .copied()
    }

    /// Move the current hop to the consumed segment
    pub fn advance(&self) -> Route {
        let mut next = self.clone();
        if !next.remaining.is_empty() {
            let hop = next.remaining.remove(0);
            next.consumed.push(hop);
        }
        next
    }

    /// Move the current hop to the consumed segment, recording `station` in
    /// its place
    ///
    /// Used when a station claims a broadcast hop.
    pub fn advance_as(&self, station: Address) -> Route {
        let mut next = self.clone();
        if !next.remaining.is_empty() {
            next.remaining.remove(0);
            next.consumed.push(station);
        }
        next
    }

    /// Record the originating station as the first consumed hop
    pub fn depart(&self, origin: Address) -> Result<Route, RouteError> {
        let mut consumed = Vec::with_capacity(self.consumed.len() + 1);
        consumed.push(origin);
        consumed.extend_from_slice(&self.consumed);

        Route::from_parts(consumed, self.remaining.clone())
    }

    /// Route back to the origin along the traversed path
    ///
    /// The station holding the final hop becomes the only consumed entry and
    /// every other station is visited in reverse order.
    pub fn reply(&self) -> Route {
        let mut path: Vec<Address> = self
            .consumed
            .iter()
            .chain(self.remaining.iter())
            .rev()
            .copied()
            .collect();

        if path.is_empty() {
            return Route::default();
        }

        let remaining = path.split_off(1);
        Route {
            consumed: path,
            remaining,
        }
    }
}

impl fmt::Display for Route {
    /// Renders `ORIGIN -> RELAY | NEXT -> DEST`, where `|` marks the cursor
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |hops: &[Address]| {
            hops.iter()
                .map(|hop| hop.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        };

        match (self.consumed.is_empty(), self.remaining.is_empty()) {
            (true, _) => write!(f, "| {}", join(&self.remaining)),
            (false, true) => write!(f, "{} |", join(&self.consumed)),
            (false, false) => write!(
                f,
                "{} | {}",
                join(&self.consumed),
                join(&self.remaining)
            ),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(call: &str) -> Address {
        Address::encode(call).unwrap()
    }

    fn test_addr(idx: usize) -> Address {
        addr(&format!("TEST{}", idx))
    }

    #[test]
    fn test_new_route() {
        let route = Route::new(&[addr("KF7SJK"), addr("KI7EST")]).unwrap();
        assert!(route.consumed().is_empty());
        assert_eq!(route.current_hop(), Some(addr("KF7SJK")));
        assert!(!route.is_final_hop());
    }

    #[test]
    fn test_too_long() {
        let hops: Vec<_> = (0..17).map(test_addr).collect();
        assert_eq!(
            Route::new(&hops),
            Err(RouteError::RouteTooLong { len: 17, max: 16 })
        );

        let hops: Vec<_> = (0..16).map(test_addr).collect();
        assert!(Route::new(&hops).is_ok());
    }

    #[test]
    fn test_reserved_address() {
        assert_eq!(
            Route::new(&[addr("A1"), Address::NONE]),
            Err(RouteError::ReservedAddress)
        );
    }

    #[test]
    fn test_wire_layout() {
        let route = Route::from_parts(vec![addr("A1"), addr("A2")], vec![addr("B1")]).unwrap();
        let wire = route.to_wire();

        assert_eq!(wire[0], addr("A1"));
        assert_eq!(wire[1], addr("A2"));
        assert_eq!(wire[2], Address::NONE);
        assert_eq!(wire[3], addr("B1"));
        assert!(wire[4..].iter().all(|a| a.is_none()));
    }

    #[test]
    fn test_wire_roundtrip_full() {
        let consumed: Vec<_> = (0..8).map(test_addr).collect();
        let remaining: Vec<_> = (8..16).map(test_addr).collect();
        let route = Route::from_parts(consumed, remaining).unwrap();

        assert_eq!(Route::from_wire(&route.to_wire()).unwrap(), route);
    }

    #[test]
    fn test_from_wire_ignores_trailing_garbage() {
        let mut wire = [Address::NONE; WIRE_SLOTS];
        wire[0] = addr("A1");
        wire[2] = addr("B1");
        wire[3] = addr("B2");
        wire[5] = addr("JUNK");

        let route = Route::from_wire(&wire).unwrap();
        assert_eq!(route.consumed(), &[addr("A1")]);
        assert_eq!(route.remaining(), &[addr("B1"), addr("B2")]);
    }

    #[test]
    fn test_from_wire_missing_separator() {
        let wire = [addr("A1"); WIRE_SLOTS];
        assert_eq!(Route::from_wire(&wire), Err(RouteError::MissingSeparator));
    }

    #[test]
    fn test_advance_through_all_hops() {
        let hops: Vec<_> = (0..5).map(test_addr).collect();
        let mut route = Route::new(&hops).unwrap().depart(addr("KI7EST")).unwrap();

        for i in 0..5 {
            assert_eq!(route.current_hop(), Some(test_addr(i)));
            assert_eq!(route.is_final_hop(), i == 4);
            route = route.advance();
        }

        assert!(route.is_complete());
        assert_eq!(route.current_hop(), None);
        assert_eq!(route.consumed().len(), 6);
        assert_eq!(route.origin(), Some(addr("KI7EST")));
    }

    #[test]
    fn test_advance_as_claims_broadcast() {
        let route = Route::new(&[Address::BROADCAST, addr("DEST")]).unwrap();
        let claimed = route.advance_as(addr("RELAY"));

        assert_eq!(claimed.consumed(), &[addr("RELAY")]);
        assert_eq!(claimed.remaining(), &[addr("DEST")]);
    }

    #[test]
    fn test_depart_capacity() {
        let hops: Vec<_> = (0..16).map(test_addr).collect();
        let route = Route::new(&hops).unwrap();
        assert_eq!(
            route.depart(addr("KI7EST")),
            Err(RouteError::RouteTooLong { len: 17, max: 16 })
        );
    }

    #[test]
    fn test_reply() {
        let route = Route::from_parts(
            vec![addr("ORIG"), addr("R1"), addr("R2")],
            vec![addr("DEST")],
        )
        .unwrap();

        let reply = route.reply();
        assert_eq!(reply.consumed(), &[addr("DEST")]);
        assert_eq!(reply.remaining(), &[addr("R2"), addr("R1"), addr("ORIG")]);
        assert_eq!(reply.final_destination(), Some(addr("ORIG")));
    }

    #[test]
    fn test_parse() {
        let route = Route::parse("kf7sjk->KI7EST").unwrap();
        assert_eq!(route.remaining(), &[addr("KF7SJK"), addr("KI7EST")]);

        assert!(matches!(
            Route::parse("KF7SJK->"),
            Err(RouteError::InvalidAddress(AddressError::Empty))
        ));
    }

    #[test]
    fn test_display() {
        let route = Route::from_parts(vec![addr("A1")], vec![addr("B1"), addr("B2")]).unwrap();
        assert_eq!(route.to_string(), "A1 | B1 -> B2");
        assert_eq!(route.advance().advance().to_string(), "A1 -> B1 -> B2 |");
    }
}
