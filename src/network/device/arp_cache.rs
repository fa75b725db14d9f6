use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::network::ethernet::MacAddress;
use crate::network::ipv4::Ipv4Address;

/// How long a resolved entry answers lookups before it is evicted.
pub const ARP_ENTRY_TIMEOUT: Duration = Duration::from_secs(15);

/// Minimum quiet time before an outstanding request is re-broadcast.
pub const ARP_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Broadcasts attempted before a request is abandoned.
pub const ARP_MAX_SENDS: u8 = 5;

/// A resolved IPv4 => MAC binding.
#[derive(Debug, Clone)]
struct ArpEntry {
    mac: MacAddress,
    inserted_at: Instant,
}

/// A complete, egress-ready Ethernet frame parked until its next hop
/// resolves. The destination MAC bytes are filled in at send time.
#[derive(Debug, Clone)]
pub struct PendingFrame {
    pub bytes: Vec<u8>,
    pub iface_name: String,
}

/// An unresolved next hop: the retry state and the frames waiting on it.
#[derive(Debug)]
pub struct ArpRequest {
    pub target: Ipv4Address,
    pub times_sent: u8,
    pub last_sent: Instant,
    pub iface_name: String,
    pub frames: Vec<PendingFrame>,
}

/// Result of queueing a frame behind an unresolved address.
#[derive(Debug, PartialEq, Eq)]
pub enum QueueOutcome {
    /// An unexpired entry already covers the address. The frame is handed
    /// back untouched; the caller sends it immediately.
    Resolved { mac: MacAddress, frame: Vec<u8> },
    /// A request was created. The caller broadcasts the first ARP request
    /// and records it with `request_sent`.
    Created,
    /// The frame joined an existing request's queue.
    Appended,
}

/// A retry the sweep wants broadcast, emitted after the lock is released.
#[derive(Debug, PartialEq, Eq)]
pub struct ArpRetry {
    pub target: Ipv4Address,
    pub iface_name: String,
}

/// Everything a sweep decided: requests to re-broadcast and requests that
/// exhausted their retries, detached with their queued frames.
#[derive(Debug, Default)]
pub struct ArpSweep {
    pub retries: Vec<ArpRetry>,
    pub failed: Vec<ArpRequest>,
}

struct ArpCacheInner {
    entries: HashMap<Ipv4Address, ArpEntry>,
    requests: HashMap<Ipv4Address, ArpRequest>,
}

/// Thread-shared IPv4 => MAC cache with per-address request queues.
///
/// One mutex guards the whole cache. No method emits frames: state
/// transitions that imply transmission hand ownership back to the caller
/// (`insert` detaches the satisfied request, `sweep` detaches retries and
/// failures), so the NIC is only touched after the lock is released.
///
/// An address never has both a resolved entry and an outstanding request.
pub struct ArpCache {
    inner: Mutex<ArpCacheInner>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ArpCacheInner {
                entries: HashMap::new(),
                requests: HashMap::new(),
            }),
        }
    }

    /// Installs or refreshes a resolved entry. If a request was outstanding
    /// for `ip` it is detached and returned so the caller can drain its
    /// queued frames.
    pub fn insert(&self, ip: Ipv4Address, mac: MacAddress, now: Instant) -> Option<ArpRequest> {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(
            ip,
            ArpEntry {
                mac,
                inserted_at: now,
            },
        );
        inner.requests.remove(&ip)
    }

    /// Snapshot of the MAC for `ip`, if an unexpired entry exists.
    pub fn lookup(&self, ip: Ipv4Address, now: Instant) -> Option<MacAddress> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&ip)
            .filter(|e| now.duration_since(e.inserted_at) < ARP_ENTRY_TIMEOUT)
            .map(|e| e.mac)
    }

    /// Parks `frame` until `ip` resolves, creating a request if none exists.
    ///
    /// If an entry for `ip` appeared since the caller's lookup the frame is
    /// not queued and the MAC is returned instead; queueing it would leave
    /// the address both resolved and pending.
    pub fn queue(
        &self,
        ip: Ipv4Address,
        frame: Vec<u8>,
        iface_name: &str,
        now: Instant,
    ) -> QueueOutcome {
        let mut inner = self.inner.lock().unwrap();

        if let Some(entry) = inner.entries.get(&ip) {
            if now.duration_since(entry.inserted_at) < ARP_ENTRY_TIMEOUT {
                return QueueOutcome::Resolved {
                    mac: entry.mac,
                    frame,
                };
            }
        }

        let pending = PendingFrame {
            bytes: frame,
            iface_name: iface_name.to_string(),
        };

        match inner.requests.get_mut(&ip) {
            Some(request) => {
                request.frames.push(pending);
                QueueOutcome::Appended
            }
            None => {
                inner.requests.insert(
                    ip,
                    ArpRequest {
                        target: ip,
                        times_sent: 0,
                        last_sent: now,
                        iface_name: iface_name.to_string(),
                        frames: vec![pending],
                    },
                );
                QueueOutcome::Created
            }
        }
    }

    /// Records that an ARP request for `ip` was broadcast.
    pub fn request_sent(&self, ip: Ipv4Address, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(request) = inner.requests.get_mut(&ip) {
            request.times_sent += 1;
            request.last_sent = now;
        }
    }

    /// Removes a request and its queued frames without sending them.
    pub fn destroy(&self, ip: Ipv4Address) -> Option<ArpRequest> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.remove(&ip)
    }

    /// One timekeeper pass: evicts expired entries and drives the retry
    /// state machine. Requests quiet for `ARP_RETRY_INTERVAL` either become
    /// retries (send count stamped here, broadcast by the caller) or, after
    /// `ARP_MAX_SENDS` broadcasts, are detached into `failed` for
    /// host-unreachable handling.
    pub fn sweep(&self, now: Instant) -> ArpSweep {
        let mut inner = self.inner.lock().unwrap();
        let mut sweep = ArpSweep::default();

        inner
            .entries
            .retain(|ip, entry| {
                let live = now.duration_since(entry.inserted_at) < ARP_ENTRY_TIMEOUT;
                if !live {
                    log::trace!("arp: entry for {}.{}.{}.{} expired", ip[0], ip[1], ip[2], ip[3]);
                }
                live
            });

        let mut exhausted: Vec<Ipv4Address> = Vec::new();
        for (ip, request) in inner.requests.iter_mut() {
            if now.duration_since(request.last_sent) < ARP_RETRY_INTERVAL {
                continue;
            }
            if request.times_sent >= ARP_MAX_SENDS {
                exhausted.push(*ip);
            } else {
                request.times_sent += 1;
                request.last_sent = now;
                sweep.retries.push(ArpRetry {
                    target: *ip,
                    iface_name: request.iface_name.clone(),
                });
            }
        }

        for ip in exhausted {
            if let Some(request) = inner.requests.remove(&ip) {
                sweep.failed.push(request);
            }
        }

        sweep
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    #[cfg(test)]
    pub fn request_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}
