//! RTP/UDP output: stamps the sequence number and 90 kHz timestamp into the
//! buffer's header prefix and sends the frame without blocking.

use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use log::{error, info};
use socket2::{Domain, Protocol, Socket, Type};

use super::rtcp::RtcpSender;
use super::StreamOutput;
use crate::client::StreamClient;
use crate::error::StreamError;
use crate::mpegts::packet_buffer::RTP_HEADER_LEN;
use crate::mpegts::PacketBuffer;

/// Grow SO_SNDBUF to this multiple of the system default; bursts from the
/// demux would otherwise overrun it.
const SEND_BUFFER_FACTOR: usize = 20;

pub struct RtpOutput {
    socket: Option<UdpSocket>,
    rtcp: RtcpSender,
    start: Instant,
    packet_count: u32,
    octet_count: u32,
}

impl Default for RtpOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl RtpOutput {
    pub fn new() -> Self {
        RtpOutput {
            socket: None,
            rtcp: RtcpSender::new(),
            start: Instant::now(),
            packet_count: 0,
            octet_count: 0,
        }
    }

    fn open_socket(addr: SocketAddr) -> Result<UdpSocket, StreamError> {
        let domain = Domain::for_address(addr);
        let socket =
            Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(StreamError::Socket)?;
        let buffer_size = socket
            .send_buffer_size()
            .map_err(StreamError::Socket)?
            .saturating_mul(SEND_BUFFER_FACTOR);
        socket
            .set_send_buffer_size(buffer_size)
            .map_err(StreamError::Socket)?;
        info!(
            "RTP/UDP set network buffer size: {} KBytes",
            buffer_size / 1024
        );
        let socket: UdpSocket = socket.into();
        // non-blocking sends stand in for MSG_DONTWAIT
        socket.set_nonblocking(true).map_err(StreamError::Socket)?;
        Ok(socket)
    }
}

impl StreamOutput for RtpOutput {
    fn protocol(&self) -> &'static str {
        "RTP/UDP"
    }

    fn start(&mut self, client: &StreamClient) -> Result<(), StreamError> {
        self.socket = Some(Self::open_socket(client.rtp_addr())?);
        self.rtcp.start(client)?;
        Ok(())
    }

    fn write_data(&mut self, buffer: &mut PacketBuffer, client: &StreamClient, seq: u16) -> bool {
        // A dead client gets no further sends; the control plane reaps it.
        if client.is_self_destructing() {
            return true;
        }
        let Some(socket) = self.socket.as_ref() else {
            return false;
        };

        let ticks_ms = self.start.elapsed().as_millis() as u64;
        let timestamp = ticks_ms.wrapping_mul(90) as u32;
        buffer.set_sequence(seq);
        buffer.set_timestamp(timestamp);

        match socket.send_to(buffer.frame(), client.rtp_addr()) {
            Ok(_) => {
                self.packet_count = self.packet_count.wrapping_add(1);
                self.octet_count = self
                    .octet_count
                    .wrapping_add((buffer.frame().len() - RTP_HEADER_LEN) as u32);
                self.rtcp.maybe_report(
                    client,
                    timestamp,
                    self.packet_count,
                    self.octet_count,
                );
            }
            Err(e) => {
                if client.self_destruct() {
                    error!(
                        "Error sending RTP/UDP data to {}: {}",
                        client.rtp_addr(),
                        e
                    );
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn full_buffer(ssrc: u32) -> PacketBuffer {
        let mut buffer = PacketBuffer::new();
        buffer.init_rtp_header(ssrc);
        buffer.commit(buffer.bytes_to_write());
        buffer
    }

    #[test]
    fn send_failure_marks_the_client_exactly_once() {
        // Port 0 is an invalid UDP destination, so every send errors.
        let client = Arc::new(StreamClient::new("127.0.0.1:0".parse().unwrap(), 9));
        let mut output = RtpOutput::new();
        output.start(&client).unwrap();

        let mut buffer = full_buffer(9);
        assert!(output.write_data(&mut buffer, &client, 1));
        assert!(client.is_self_destructing());

        // Subsequent writes are suppressed and keep the flag as-is.
        assert!(output.write_data(&mut buffer, &client, 2));
        assert!(client.is_self_destructing());
    }

    #[test]
    fn frames_are_stamped_before_sending() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let client = Arc::new(StreamClient::new(receiver.local_addr().unwrap(), 0xABCD));
        let mut output = RtpOutput::new();
        output.start(&client).unwrap();

        let mut buffer = full_buffer(0xABCD);
        assert!(output.write_data(&mut buffer, &client, 0x0102));

        let mut frame = [0u8; 2048];
        let n = receiver.recv(&mut frame).unwrap();
        assert_eq!(n, crate::mpegts::packet_buffer::FRAME_SIZE);
        assert_eq!(&frame[2..4], &[0x01, 0x02]);
        assert!(!client.is_self_destructing());
    }
}
