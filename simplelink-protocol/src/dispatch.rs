//! Packet classification
//!
//! Decides what a station does with a decoded packet based only on the packet
//! and the station's own address. The engine applies the result.

use crate::address::Address;
use crate::packet::{Packet, PacketKind};
use crate::route::Route;

/// Outcome of classifying one received packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Data whose final hop is this station
    Deliver {
        /// Route with the final hop consumed
        route: Route,
        /// Route the acknowledgement travels back on
        ack_route: Route,
    },
    /// Data for another station, overheard
    Observe,
    /// This station holds the current hop and more hops remain
    Forward {
        /// Route with this station's hop consumed
        route: Route,
    },
    /// Acknowledgement whose final hop is this station
    Acknowledged,
    /// Nothing to do (overheard ack or spent route)
    Ignore,
}

/// Classify a packet received by `station`
///
/// A broadcast hop counts as this station's hop and is recorded as
/// `station` once claimed. Stations already on the path (including the
/// origin) and the final destination never claim one.
pub fn classify(packet: &Packet, station: Address) -> Disposition {
    let hop = match packet.route.current_hop() {
        Some(hop) => hop,
        None => {
            return match packet.kind {
                PacketKind::Data => Disposition::Observe,
                PacketKind::Ack => Disposition::Ignore,
            }
        }
    };

    let ours =
        hop == station || (hop.is_broadcast() && may_claim_broadcast(&packet.route, station));
    if !ours {
        return match packet.kind {
            PacketKind::Data => Disposition::Observe,
            PacketKind::Ack => Disposition::Ignore,
        };
    }

    let claimed = packet.route.advance_as(station);
    match (packet.kind, packet.route.is_final_hop()) {
        (PacketKind::Data, true) => Disposition::Deliver {
            ack_route: claimed.reply(),
            route: claimed,
        },
        (PacketKind::Ack, true) => Disposition::Acknowledged,
        (_, false) => Disposition::Forward { route: claimed },
    }
}

fn may_claim_broadcast(route: &Route, station: Address) -> bool {
    !route.consumed().contains(&station) && route.remaining().last() != Some(&station)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prn::Prn;
    use bytes::Bytes;

    fn addr(call: &str) -> Address {
        Address::encode(call).unwrap()
    }

    fn data(consumed: &[&str], remaining: &[&str]) -> Packet {
        let route = Route::from_parts(
            consumed.iter().map(|c| addr(c)).collect(),
            remaining.iter().map(|c| addr(c)).collect(),
        )
        .unwrap();
        Packet::data(Prn::new(1), route, Bytes::from_static(b"hi"))
    }

    #[test]
    fn test_deliver_final_hop() {
        let packet = data(&["A1"], &["B1"]);

        match classify(&packet, addr("B1")) {
            Disposition::Deliver { route, ack_route } => {
                assert!(route.is_complete());
                assert_eq!(ack_route.consumed(), &[addr("B1")]);
                assert_eq!(ack_route.remaining(), &[addr("A1")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_observe_other_station() {
        let packet = data(&["A1"], &["B1"]);
        assert_eq!(classify(&packet, addr("C1")), Disposition::Observe);
        // The originator hearing its own frame only observes it
        assert_eq!(classify(&packet, addr("A1")), Disposition::Observe);
    }

    #[test]
    fn test_forward_intermediate() {
        let packet = data(&["A1"], &["R1", "B1"]);

        assert_eq!(
            classify(&packet, addr("R1")),
            Disposition::Forward {
                route: packet.route.advance()
            }
        );
        // Later hops wait for their turn
        assert_eq!(classify(&packet, addr("B1")), Disposition::Observe);
    }

    #[test]
    fn test_broadcast_hop_claimed() {
        let route = Route::from_parts(vec![addr("A1")], vec![Address::BROADCAST]).unwrap();
        let packet = Packet::data(Prn::new(1), route, Bytes::new());

        match classify(&packet, addr("ANY")) {
            Disposition::Deliver { route, ack_route } => {
                assert_eq!(route.consumed(), &[addr("A1"), addr("ANY")]);
                assert_eq!(ack_route.remaining(), &[addr("A1")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_relay() {
        let route =
            Route::from_parts(vec![addr("A1")], vec![Address::BROADCAST, addr("B1")]).unwrap();
        let packet = Packet::data(Prn::new(1), route, Bytes::new());

        match classify(&packet, addr("R9")) {
            Disposition::Forward { route } => {
                assert_eq!(route.consumed(), &[addr("A1"), addr("R9")]);
                assert_eq!(route.current_hop(), Some(addr("B1")));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_not_claimed_by_path_members() {
        let route = Route::from_parts(
            vec![addr("A1"), addr("R1")],
            vec![Address::BROADCAST, addr("B1")],
        )
        .unwrap();
        let packet = Packet::data(Prn::new(1), route, Bytes::new());

        // The origin hearing its own packet relayed
        assert_eq!(classify(&packet, addr("A1")), Disposition::Observe);
        // An earlier relay
        assert_eq!(classify(&packet, addr("R1")), Disposition::Observe);
        // The destination waits for a relay to claim the broadcast hop
        assert_eq!(classify(&packet, addr("B1")), Disposition::Observe);
        assert!(matches!(
            classify(&packet, addr("R2")),
            Disposition::Forward { .. }
        ));

        let ack = Packet::ack(Prn::new(1), packet.route.clone());
        assert_eq!(classify(&ack, addr("A1")), Disposition::Ignore);
    }

    #[test]
    fn test_ack_dispositions() {
        let route = Route::from_parts(vec![addr("B1")], vec![addr("R1"), addr("A1")]).unwrap();
        let ack = Packet::ack(Prn::new(1), route);

        assert!(matches!(
            classify(&ack, addr("R1")),
            Disposition::Forward { .. }
        ));
        assert_eq!(classify(&ack, addr("A1")), Disposition::Ignore);
        assert_eq!(classify(&ack, addr("Z9")), Disposition::Ignore);

        let arrived = ack.with_route(ack.route.advance());
        assert_eq!(classify(&arrived, addr("A1")), Disposition::Acknowledged);
    }

    #[test]
    fn test_spent_route() {
        let packet = data(&["A1", "B1"], &[]);
        assert_eq!(classify(&packet, addr("B1")), Disposition::Observe);
    }
}
