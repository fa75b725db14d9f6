use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::network::device::arp_cache::{ArpCache, ArpRequest, QueueOutcome};
use crate::network::device::nat::{NatConfig, NatTable};
use crate::network::device::nic::PacketTransport;
use crate::network::ethernet::{
    ByteSerializable, EtherType, EthernetFrame, MacAddress, ETHERNET_HEADER_LEN,
};
use crate::network::ipv4::interface::{Interface, InterfaceTable};
use crate::network::ipv4::{
    mask_len, ArpFrame, ArpOperation, IcmpFrame, Ipv4Address, Ipv4Frame, FLAG_DONT_FRAGMENT,
    ICMP_CODE_HOST_UNREACHABLE, ICMP_CODE_PORT_UNREACHABLE, ICMP_DEST_UNREACHABLE,
    ICMP_ECHO_REQUEST, ICMP_TIME_EXCEEDED, IPV4_MIN_HEADER_LEN, PROTOCOL_ICMP,
};
use crate::tick::Tickable;
use crate::{mac_addr, mac_broadcast_addr, network_address};

/// A route in the router's routing table. Immutable; the set is fixed at
/// startup.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Route {
    pub destination: Ipv4Address, // Network address
    pub mask: Ipv4Address,
    pub gateway: Ipv4Address,
    pub iface_name: String,
}

impl Route {
    pub fn new(
        destination: Ipv4Address,
        mask: Ipv4Address,
        gateway: Ipv4Address,
        iface_name: &str,
    ) -> Self {
        Self {
            destination,
            mask,
            gateway,
            iface_name: iface_name.to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}/{} via {}.{}.{}.{} dev {}",
            self.destination[0],
            self.destination[1],
            self.destination[2],
            self.destination[3],
            mask_len(self.mask),
            self.gateway[0],
            self.gateway[1],
            self.gateway[2],
            self.gateway[3],
            self.iface_name,
        )
    }
}

/// Static routing table with longest-prefix lookup.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Longest-prefix match: among routes whose masked destination equals
    /// the masked lookup address, the greatest mask length wins; ties go to
    /// the earliest-registered route.
    pub fn lookup(&self, destination: Ipv4Address) -> Option<&Route> {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if network_address!(destination, route.mask)
                != network_address!(route.destination, route.mask)
            {
                continue;
            }
            let better = match best {
                Some(current) => mask_len(route.mask) > mask_len(current.mask),
                None => true,
            };
            if better {
                best = Some(route);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for route in &self.routes {
            writeln!(f, "{}", route)?;
        }
        Ok(())
    }
}

/// A software IPv4 router: demultiplexes raw Ethernet frames arriving on a
/// set of local interfaces, answers ARP and ICMP echo, forwards transit
/// datagrams by longest-prefix match, and reports failures with ICMP
/// errors.
///
/// `handle_packet` is the per-frame entry point and may be called from any
/// number of ingress threads; `tick` is driven by the timekeeper. Shared
/// state lives in the ARP cache and NAT table, each behind its own mutex.
pub struct Router {
    interfaces: InterfaceTable,
    routes: RoutingTable,
    arp_cache: ArpCache,
    nat: Option<NatTable>,
    nic: Arc<dyn PacketTransport>,
    ident: AtomicU16,
}

impl Router {
    pub fn new(
        interfaces: InterfaceTable,
        routes: RoutingTable,
        nic: Arc<dyn PacketTransport>,
    ) -> Self {
        Self {
            interfaces,
            routes,
            arp_cache: ArpCache::new(),
            nat: None,
            nic,
            ident: AtomicU16::new(0),
        }
    }

    /// Turns on endpoint translation, mapping internal flows onto the named
    /// externally-facing interface.
    ///
    /// # Panics
    /// Panics if `external_iface_name` is not a registered interface.
    pub fn enable_nat(&mut self, external_iface_name: &str, config: NatConfig) {
        let external = self
            .interfaces
            .get(external_iface_name)
            .unwrap_or_else(|| panic!("unknown interface {}", external_iface_name));

        log::info!("nat enabled on {}", external_iface_name);
        self.nat = Some(NatTable::new(external.ip, config));
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn nat(&self) -> Option<&NatTable> {
        self.nat.as_ref()
    }

    /// Ingress entry point: one raw Ethernet frame as received on
    /// `iface_name`. The buffer is borrowed for the duration of the call;
    /// anything that outlives it is copied.
    pub fn handle_packet(&self, frame: &[u8], iface_name: &str) {
        let Some(iface) = self.interfaces.get(iface_name) else {
            log::debug!("frame on unknown interface {}", iface_name);
            return;
        };

        let eth = match EthernetFrame::from_bytes(frame) {
            Ok(eth) => eth,
            Err(e) => {
                log::trace!("dropping frame on {}: {}", iface_name, e);
                return;
            }
        };

        if eth.destination != iface.mac && eth.destination != mac_broadcast_addr!() {
            log::trace!("dropping frame on {}: not for us", iface_name);
            return;
        }

        let now = Instant::now();
        match eth.ether_type {
            EtherType::Arp => self._receive_arp(&eth, iface, now),
            EtherType::Ipv4 => self._receive_ipv4(&eth.data, iface, now),
        }
    }

    fn _receive_arp(&self, eth: &EthernetFrame, iface: &Interface, now: Instant) {
        let arp = match ArpFrame::from_bytes(&eth.data) {
            Ok(arp) => arp,
            Err(e) => {
                log::trace!("dropping arp frame on {}: {}", iface.name, e);
                return;
            }
        };

        match arp.opcode {
            ArpOperation::Request if arp.target_ip == iface.ip => {
                let reply = ArpFrame::new(
                    ArpOperation::Reply,
                    iface.mac,
                    iface.ip,
                    arp.sender_mac,
                    arp.sender_ip,
                );
                let frame =
                    EthernetFrame::new(arp.sender_mac, iface.mac, EtherType::Arp, reply.to_bytes());
                self.nic.send_packet(&frame.to_bytes(), &iface.name);
            }
            ArpOperation::Reply if arp.target_ip == iface.ip => {
                if let Some(request) = self.arp_cache.insert(arp.sender_ip, arp.sender_mac, now) {
                    self._drain_request(request, arp.sender_mac);
                }
            }
            _ => {}
        }
    }

    /// Sends every frame parked behind a freshly resolved address, oldest
    /// first, with the learned MAC written over the placeholder destination.
    fn _drain_request(&self, request: ArpRequest, mac: MacAddress) {
        for mut pending in request.frames {
            pending.bytes[0..6].copy_from_slice(&mac);
            self.nic.send_packet(&pending.bytes, &pending.iface_name);
        }
    }

    fn _receive_ipv4(&self, datagram: &[u8], iface: &Interface, now: Instant) {
        let ip = match Ipv4Frame::from_bytes(datagram) {
            Ok(ip) => ip,
            Err(e) => {
                log::trace!("dropping ipv4 datagram on {}: {}", iface.name, e);
                return;
            }
        };

        // Quoting in ICMP errors must use the datagram exactly as received,
        // trimmed of any link padding.
        let datagram = &datagram[..ip.total_length as usize];

        if self.interfaces.is_local(ip.destination) {
            if ip.protocol == PROTOCOL_ICMP {
                self._receive_icmp(&ip, now);
            } else {
                self._send_icmp_error(
                    ICMP_DEST_UNREACHABLE,
                    ICMP_CODE_PORT_UNREACHABLE,
                    datagram,
                    now,
                );
            }
            return;
        }

        if ip.ttl <= 1 {
            self._send_icmp_error(ICMP_TIME_EXCEEDED, 0, datagram, now);
            return;
        }

        let mut forwarded = ip;
        forwarded.ttl -= 1;
        self._forward(forwarded.to_bytes(), Some(iface.name.as_str()), now);
    }

    /// ICMP addressed to one of our interfaces: answer echo requests,
    /// ignore everything else.
    fn _receive_icmp(&self, ip: &Ipv4Frame, now: Instant) {
        let icmp = match IcmpFrame::from_bytes(&ip.data) {
            Ok(icmp) => icmp,
            Err(e) => {
                log::trace!("dropping icmp message: {}", e);
                return;
            }
        };

        if icmp.icmp_type != ICMP_ECHO_REQUEST {
            return;
        }

        let mut reply = ip.clone();
        reply.source = ip.destination;
        reply.destination = ip.source;
        reply.ttl = 64;
        reply.id = self._next_ident();
        reply.flags_fragment_offset = FLAG_DONT_FRAGMENT;
        reply.data =
            IcmpFrame::echo_reply(icmp.identifier, icmp.sequence_number, icmp.data).to_bytes();

        self._forward(reply.to_bytes(), None, now);
    }

    /// Routes and transmits a complete IP datagram. `ingress` is the
    /// receiving interface for transit traffic and `None` for datagrams we
    /// originated.
    fn _forward(&self, datagram: Vec<u8>, ingress: Option<&str>, now: Instant) {
        let destination: Ipv4Address = datagram[16..20].try_into().unwrap();

        let route = match self.routes.lookup(destination) {
            // A route pointing back out the ingress interface is as good as
            // no route: the sender is on that network already.
            Some(route) if ingress != Some(route.iface_name.as_str()) => route,
            _ => {
                self._send_icmp_error(
                    ICMP_DEST_UNREACHABLE,
                    ICMP_CODE_HOST_UNREACHABLE,
                    &datagram,
                    now,
                );
                return;
            }
        };

        let Some(egress) = self.interfaces.get(&route.iface_name) else {
            log::debug!("route {} names an unknown interface", route);
            return;
        };

        let next_hop = if route.gateway == [0, 0, 0, 0] {
            destination
        } else {
            route.gateway
        };

        let frame = EthernetFrame::new(mac_addr!(0), egress.mac, EtherType::Ipv4, datagram);

        match self.arp_cache.lookup(next_hop, now) {
            Some(mac) => {
                let mut bytes = frame.to_bytes();
                bytes[0..6].copy_from_slice(&mac);
                self.nic.send_packet(&bytes, &egress.name);
            }
            None => match self
                .arp_cache
                .queue(next_hop, frame.to_bytes(), &egress.name, now)
            {
                QueueOutcome::Resolved { mac, mut frame } => {
                    frame[0..6].copy_from_slice(&mac);
                    self.nic.send_packet(&frame, &egress.name);
                }
                QueueOutcome::Created => {
                    self._broadcast_arp_request(next_hop, egress);
                    self.arp_cache.request_sent(next_hop, now);
                }
                QueueOutcome::Appended => {}
            },
        }
    }

    fn _broadcast_arp_request(&self, target: Ipv4Address, iface: &Interface) {
        let request = ArpFrame::new(
            ArpOperation::Request,
            iface.mac,
            iface.ip,
            mac_addr!(0),
            target,
        );
        let frame = EthernetFrame::new(
            mac_broadcast_addr!(),
            iface.mac,
            EtherType::Arp,
            request.to_bytes(),
        );
        self.nic.send_packet(&frame.to_bytes(), &iface.name);
    }

    /// Builds and routes an ICMP error quoting `original`. The source
    /// address is the IP of the interface the reverse route selects. Errors
    /// about our own datagrams are suppressed to prevent reflection loops.
    fn _send_icmp_error(&self, icmp_type: u8, code: u8, original: &[u8], now: Instant) {
        if original.len() < IPV4_MIN_HEADER_LEN {
            return;
        }

        let original_source: Ipv4Address = original[12..16].try_into().unwrap();
        if self.interfaces.is_local(original_source) {
            log::trace!("suppressing icmp error about our own datagram");
            return;
        }

        let Some(route) = self.routes.lookup(original_source) else {
            log::debug!("no route back toward the source of a failed datagram");
            return;
        };
        let Some(egress) = self.interfaces.get(&route.iface_name) else {
            return;
        };

        let icmp = if icmp_type == ICMP_TIME_EXCEEDED {
            IcmpFrame::time_exceeded(original)
        } else {
            IcmpFrame::destination_unreachable(code, original)
        };

        let mut ip = Ipv4Frame::new(
            egress.ip,
            original_source,
            64,
            icmp.to_bytes(),
            PROTOCOL_ICMP,
        );
        ip.id = self._next_ident();
        ip.flags_fragment_offset = FLAG_DONT_FRAGMENT;

        self._forward(ip.to_bytes(), None, now);
    }

    fn _next_ident(&self) -> u16 {
        self.ident.fetch_add(1, Ordering::Relaxed)
    }
}

impl Tickable for Router {
    /// One timekeeper pass: drive ARP retries and failures, then NAT
    /// expiry. All frame emission happens here, outside the cache locks.
    fn tick(&self, now: Instant) {
        let sweep = self.arp_cache.sweep(now);

        for retry in sweep.retries {
            if let Some(iface) = self.interfaces.get(&retry.iface_name) {
                self._broadcast_arp_request(retry.target, iface);
            }
        }

        for request in sweep.failed {
            log::debug!(
                "arp: giving up on {}.{}.{}.{} after {} broadcasts",
                request.target[0],
                request.target[1],
                request.target[2],
                request.target[3],
                request.times_sent,
            );
            for pending in &request.frames {
                if pending.bytes.len() > ETHERNET_HEADER_LEN {
                    self._send_icmp_error(
                        ICMP_DEST_UNREACHABLE,
                        ICMP_CODE_HOST_UNREACHABLE,
                        &pending.bytes[ETHERNET_HEADER_LEN..],
                        now,
                    );
                }
            }
        }

        if let Some(nat) = &self.nat {
            nat.sweep(now);
        }
    }
}
