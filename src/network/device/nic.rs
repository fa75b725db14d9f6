/// The virtualized NIC boundary. The embedding application implements this
/// over whatever carries its frames (a tun/tap device, a socket to a
/// simulator, a test recorder).
///
/// `send_packet` is fire-and-forget: synchronous, non-blocking, no
/// delivery feedback. The frame slice is borrowed only for the call.
pub trait PacketTransport: Send + Sync {
    fn send_packet(&self, frame: &[u8], iface_name: &str);
}
