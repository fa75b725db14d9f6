use std::fmt;

use super::Ipv4Address;
use crate::network::ethernet::MacAddress;

/// A local interface: a name the embedding application knows it by, the MAC
/// stamped on egress frames, and the IPv4 address the router answers for.
/// Immutable after registration.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddress,
    pub ip: Ipv4Address,
}

impl Interface {
    pub fn new(name: &str, mac: MacAddress, ip: Ipv4Address) -> Self {
        Self {
            name: name.to_string(),
            mac,
            ip,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}\t{}.{}.{}.{}",
            self.name,
            self.mac[0],
            self.mac[1],
            self.mac[2],
            self.mac[3],
            self.mac[4],
            self.mac[5],
            self.ip[0],
            self.ip[1],
            self.ip[2],
            self.ip[3],
        )
    }
}

/// The set of local interfaces, fixed at startup.
#[derive(Debug, Default, Clone)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Exact-match lookup by interface address.
    pub fn get_by_ip(&self, ip: Ipv4Address) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.ip == ip)
    }

    /// True if `ip` is the address of any local interface.
    pub fn is_local(&self, ip: Ipv4Address) -> bool {
        self.get_by_ip(ip).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }
}

impl fmt::Display for InterfaceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for interface in &self.interfaces {
            writeln!(f, "{}", interface)?;
        }
        Ok(())
    }
}
