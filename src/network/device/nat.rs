use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::network::ipv4::Ipv4Address;

/// First external identifier handed out for each protocol.
pub const NAT_AUX_FIRST: u16 = 50000;

/// Last external identifier; allocation wraps back to `NAT_AUX_FIRST`.
pub const NAT_AUX_LAST: u16 = 59999;

/// Idle timeouts per mapping protocol. Both TCP states currently share the
/// established timeout; the transitory knob is carried so the embedding
/// application's configuration surface is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatConfig {
    pub icmp_timeout: Duration,
    pub tcp_established_timeout: Duration,
    pub tcp_transitory_timeout: Duration,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            icmp_timeout: Duration::from_secs(60),
            tcp_established_timeout: Duration::from_secs(7440),
            tcp_transitory_timeout: Duration::from_secs(300),
        }
    }
}

/// Protocols whose endpoint identifiers the table rewrites. The auxiliary
/// value is the ICMP query identifier or the TCP source port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NatProtocol {
    Icmp,
    Tcp,
}

/// A tracked TCP peer endpoint.
// TODO: record SYN/FIN observations here so transitory mappings can expire
// on tcp_transitory_timeout instead of riding the established timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConnection {
    pub peer_ip: Ipv4Address,
    pub peer_port: u16,
}

/// One translation: (internal ip, internal aux) <=> (external ip, external
/// aux) for a protocol. Lookups return snapshot copies.
#[derive(Debug, Clone)]
pub struct NatMapping {
    pub protocol: NatProtocol,
    pub internal_ip: Ipv4Address,
    pub internal_aux: u16,
    pub external_ip: Ipv4Address,
    pub external_aux: u16,
    pub last_updated: Instant,
    /// TCP only; presently always empty.
    pub connections: Vec<TcpConnection>,
}

struct NatInner {
    /// (protocol, external aux) => mapping. External values are unique per
    /// protocol, so this is the owning map.
    mappings: HashMap<(NatProtocol, u16), NatMapping>,
    /// (protocol, internal ip, internal aux) => external aux.
    by_internal: HashMap<(NatProtocol, Ipv4Address, u16), u16>,
    next_icmp_aux: u16,
    next_tcp_aux: u16,
}

impl NatInner {
    fn next_aux(&mut self, protocol: NatProtocol) -> &mut u16 {
        match protocol {
            NatProtocol::Icmp => &mut self.next_icmp_aux,
            NatProtocol::Tcp => &mut self.next_tcp_aux,
        }
    }
}

/// Thread-shared NAT endpoint table with idle expiry.
///
/// One mutex guards both indexes and the allocation counters. Nothing here
/// touches the NIC; the pipeline rewrites packets with the snapshots these
/// methods return.
pub struct NatTable {
    external_ip: Ipv4Address,
    config: NatConfig,
    inner: Mutex<NatInner>,
}

impl NatTable {
    /// * `external_ip` - Address of the externally-facing interface,
    ///   stamped on every mapping.
    pub fn new(external_ip: Ipv4Address, config: NatConfig) -> Self {
        Self {
            external_ip,
            config,
            inner: Mutex::new(NatInner {
                mappings: HashMap::new(),
                by_internal: HashMap::new(),
                next_icmp_aux: NAT_AUX_FIRST,
                next_tcp_aux: NAT_AUX_FIRST,
            }),
        }
    }

    #[cfg(test)]
    /// Starts allocation at an arbitrary counter position.
    pub fn with_next_aux(external_ip: Ipv4Address, config: NatConfig, next_aux: u16) -> Self {
        let table = Self::new(external_ip, config);
        {
            let mut inner = table.inner.lock().unwrap();
            inner.next_icmp_aux = next_aux;
            inner.next_tcp_aux = next_aux;
        }
        table
    }

    pub fn external_ip(&self) -> Ipv4Address {
        self.external_ip
    }

    /// Mapping for an internal endpoint, refreshed to `now`.
    pub fn lookup_internal(
        &self,
        protocol: NatProtocol,
        internal_ip: Ipv4Address,
        internal_aux: u16,
        now: Instant,
    ) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let external_aux = *inner
            .by_internal
            .get(&(protocol, internal_ip, internal_aux))?;
        let mapping = inner.mappings.get_mut(&(protocol, external_aux))?;
        mapping.last_updated = now;
        Some(mapping.clone())
    }

    /// Mapping for an external identifier, refreshed to `now`.
    pub fn lookup_external(
        &self,
        protocol: NatProtocol,
        external_aux: u16,
        now: Instant,
    ) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();
        let mapping = inner.mappings.get_mut(&(protocol, external_aux))?;
        mapping.last_updated = now;
        Some(mapping.clone())
    }

    /// Creates a mapping for an internal endpoint, allocating the next free
    /// external identifier of the protocol. Returns `None` when all of
    /// [`NAT_AUX_FIRST`, `NAT_AUX_LAST`] is in use. Inserting an endpoint
    /// that is already mapped refreshes and returns the existing mapping.
    pub fn insert(
        &self,
        protocol: NatProtocol,
        internal_ip: Ipv4Address,
        internal_aux: u16,
        now: Instant,
    ) -> Option<NatMapping> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(&external_aux) = inner.by_internal.get(&(protocol, internal_ip, internal_aux))
        {
            let mapping = inner.mappings.get_mut(&(protocol, external_aux))?;
            mapping.last_updated = now;
            return Some(mapping.clone());
        }

        let range = (NAT_AUX_LAST - NAT_AUX_FIRST + 1) as usize;
        let mut external_aux = None;
        for _ in 0..range {
            let candidate = *inner.next_aux(protocol);
            *inner.next_aux(protocol) = if candidate == NAT_AUX_LAST {
                NAT_AUX_FIRST
            } else {
                candidate + 1
            };

            if !inner.mappings.contains_key(&(protocol, candidate)) {
                external_aux = Some(candidate);
                break;
            }
        }

        let external_aux = match external_aux {
            Some(aux) => aux,
            None => {
                log::debug!("nat: external identifier space exhausted for {:?}", protocol);
                return None;
            }
        };

        let mapping = NatMapping {
            protocol,
            internal_ip,
            internal_aux,
            external_ip: self.external_ip,
            external_aux,
            last_updated: now,
            connections: Vec::new(),
        };

        inner
            .by_internal
            .insert((protocol, internal_ip, internal_aux), external_aux);
        inner.mappings.insert((protocol, external_aux), mapping.clone());

        Some(mapping)
    }

    /// One timekeeper pass: drops mappings idle past their protocol's
    /// timeout, from both indexes.
    pub fn sweep(&self, now: Instant) {
        let mut inner = self.inner.lock().unwrap();

        let icmp_timeout = self.config.icmp_timeout;
        let tcp_timeout = self.config.tcp_established_timeout;

        let mut dropped: Vec<(NatProtocol, Ipv4Address, u16)> = Vec::new();
        inner.mappings.retain(|_, mapping| {
            let timeout = match mapping.protocol {
                NatProtocol::Icmp => icmp_timeout,
                NatProtocol::Tcp => tcp_timeout,
            };
            let live = now.duration_since(mapping.last_updated) <= timeout;
            if !live {
                log::trace!(
                    "nat: {:?} mapping {} for {}.{}.{}.{} expired",
                    mapping.protocol,
                    mapping.external_aux,
                    mapping.internal_ip[0],
                    mapping.internal_ip[1],
                    mapping.internal_ip[2],
                    mapping.internal_ip[3],
                );
                dropped.push((mapping.protocol, mapping.internal_ip, mapping.internal_aux));
            }
            live
        });

        for key in dropped {
            inner.by_internal.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn mapping_count(&self) -> usize {
        self.inner.lock().unwrap().mappings.len()
    }
}
