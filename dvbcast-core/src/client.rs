//! The per-client stream descriptor owned by the control plane and shared
//! with at most one streaming worker.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Destination and liveness state of one streaming client.
///
/// `self_destruct` is a one-shot: the first failure marks the client, later
/// sends are suppressed and the control plane reaps it.
pub struct StreamClient {
    rtp_addr: SocketAddr,
    rtcp_addr: SocketAddr,
    ssrc: u32,
    self_destruct: AtomicBool,
}

impl StreamClient {
    /// RTCP conventionally uses the next port up from RTP.
    pub fn new(rtp_addr: SocketAddr, ssrc: u32) -> Self {
        let mut rtcp_addr = rtp_addr;
        rtcp_addr.set_port(rtp_addr.port().wrapping_add(1));
        StreamClient {
            rtp_addr,
            rtcp_addr,
            ssrc,
            self_destruct: AtomicBool::new(false),
        }
    }

    pub fn rtp_addr(&self) -> SocketAddr {
        self.rtp_addr
    }

    pub fn rtcp_addr(&self) -> SocketAddr {
        self.rtcp_addr
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn is_self_destructing(&self) -> bool {
        self.self_destruct.load(Ordering::Relaxed)
    }

    /// Mark the client dead. Returns true only for the call that actually
    /// flipped the flag.
    pub fn self_destruct(&self) -> bool {
        !self.self_destruct.swap(true, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtcp_port_follows_rtp() {
        let client = StreamClient::new("127.0.0.1:5004".parse().unwrap(), 42);
        assert_eq!(client.rtp_addr().port(), 5004);
        assert_eq!(client.rtcp_addr().port(), 5005);
        assert_eq!(client.ssrc(), 42);
    }

    #[test]
    fn self_destruct_fires_once() {
        let client = StreamClient::new("127.0.0.1:5004".parse().unwrap(), 1);
        assert!(!client.is_self_destructing());
        assert!(client.self_destruct());
        assert!(!client.self_destruct()); // second call reports already-dead
        assert!(client.is_self_destructing());
    }
}
