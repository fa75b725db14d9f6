pub mod ethernet;
pub mod ipv4;

pub mod device {
    pub mod arp_cache;
    pub mod nat;
    pub mod nic;
    pub mod router;
}

/// Reasons a frame fails to decode. The pipeline drops malformed frames, so
/// these surface only in logs and tests.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Frame shorter than its fixed header.
    #[error("frame too short")]
    Runt,
    /// Frame longer than the protocol permits.
    #[error("frame too long")]
    Giant,
    /// Unrecognized EtherType.
    #[error("unrecognized ethertype {0:#06x}")]
    EtherType(u16),
    /// ARP hardware type other than Ethernet.
    #[error("unsupported ARP hardware type {0}")]
    HardwareType(u16),
    /// ARP protocol type other than IPv4.
    #[error("unsupported ARP protocol type {0:#06x}")]
    ProtocolType(u16),
    /// ARP hardware address length other than 6.
    #[error("bad ARP hardware address length {0}")]
    HardwareLen(u8),
    /// ARP protocol address length other than 4.
    #[error("bad ARP protocol address length {0}")]
    ProtocolLen(u8),
    /// ARP opcode other than request/reply.
    #[error("unsupported ARP opcode {0}")]
    Opcode(u16),
    /// IP version field other than 4.
    #[error("unsupported IP version {0}")]
    Version(u8),
    /// IPv4 header length field below five words or past the buffer.
    #[error("bad IPv4 header length {0}")]
    HeaderLen(u8),
    /// IPv4 total length smaller than the header or past the buffer.
    #[error("bad IPv4 total length {0}")]
    TotalLen(u16),
    /// Checksum did not verify.
    #[error("checksum mismatch")]
    Checksum,
}
