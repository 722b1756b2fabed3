//! RTCP sidecar: periodic sender reports (SR + SDES) on the port above the
//! RTP stream.

use std::net::UdpSocket;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use log::debug;

use crate::client::StreamClient;
use crate::error::StreamError;

/// Sender-report cadence.
const REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const RTCP_SENDER_REPORT: u8 = 200;
const RTCP_SDES: u8 = 202;
const SDES_CNAME: u8 = 1;

fn ntp_now() -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let seconds = (now.as_secs() + NTP_UNIX_OFFSET) as u32;
    let fraction = ((u64::from(now.subsec_nanos()) << 32) / 1_000_000_000) as u32;
    (seconds, fraction)
}

/// Compose one compound RTCP packet: a sender report followed by an SDES
/// chunk with the CNAME item, padded to a 32-bit boundary.
pub fn sender_report(ssrc: u32, rtp_timestamp: u32, packet_count: u32, octet_count: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);

    // SR: header word + SSRC + NTP (2 words) + RTP ts + counts = 7 words.
    buf.put_u8(0x80); // V=2, no padding, no report blocks
    buf.put_u8(RTCP_SENDER_REPORT);
    buf.put_u16(6); // length in words minus one
    buf.put_u32(ssrc);
    let (ntp_sec, ntp_frac) = ntp_now();
    buf.put_u32(ntp_sec);
    buf.put_u32(ntp_frac);
    buf.put_u32(rtp_timestamp);
    buf.put_u32(packet_count);
    buf.put_u32(octet_count);

    // SDES: one chunk, CNAME item, end-of-list, zero-padded to a word.
    let cname = b"dvbcast";
    let chunk_len = 4 + 2 + cname.len() + 1; // SSRC + item header + text + end
    let padded = chunk_len.div_ceil(4) * 4;
    buf.put_u8(0x81); // one chunk
    buf.put_u8(RTCP_SDES);
    buf.put_u16((padded / 4) as u16);
    buf.put_u32(ssrc);
    buf.put_u8(SDES_CNAME);
    buf.put_u8(cname.len() as u8);
    buf.put_slice(cname);
    buf.put_u8(0);
    buf.put_bytes(0, padded - chunk_len);

    buf.freeze()
}

/// Emits sender reports on its own cadence, driven from the RTP send path.
pub struct RtcpSender {
    socket: Option<UdpSocket>,
    last_report: Instant,
}

impl Default for RtcpSender {
    fn default() -> Self {
        Self::new()
    }
}

impl RtcpSender {
    pub fn new() -> Self {
        RtcpSender {
            socket: None,
            last_report: Instant::now(),
        }
    }

    pub fn start(&mut self, _client: &StreamClient) -> Result<(), StreamError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(StreamError::Socket)?;
        socket.set_nonblocking(true).map_err(StreamError::Socket)?;
        self.socket = Some(socket);
        self.last_report = Instant::now();
        Ok(())
    }

    /// Send a report if the interval elapsed. RTCP is advisory; failures are
    /// only traced.
    pub fn maybe_report(
        &mut self,
        client: &StreamClient,
        rtp_timestamp: u32,
        packet_count: u32,
        octet_count: u32,
    ) {
        if self.last_report.elapsed() < REPORT_INTERVAL {
            return;
        }
        self.last_report = Instant::now();
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        let report = sender_report(client.ssrc(), rtp_timestamp, packet_count, octet_count);
        if let Err(e) = socket.send_to(&report, client.rtcp_addr()) {
            debug!("RTCP report to {} failed: {}", client.rtcp_addr(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_report_layout() {
        let report = sender_report(0x0102_0304, 90_000, 7, 1316 * 7);

        // SR header
        assert_eq!(report[0], 0x80);
        assert_eq!(report[1], RTCP_SENDER_REPORT);
        assert_eq!(u16::from_be_bytes([report[2], report[3]]), 6);
        assert_eq!(&report[4..8], &[0x01, 0x02, 0x03, 0x04]);
        // RTP timestamp and counters
        assert_eq!(&report[16..20], &90_000u32.to_be_bytes());
        assert_eq!(&report[20..24], &7u32.to_be_bytes());
        assert_eq!(&report[24..28], &(1316u32 * 7).to_be_bytes());

        // SDES follows the 28-byte SR and the whole packet is word-aligned.
        assert_eq!(report[28], 0x81);
        assert_eq!(report[29], RTCP_SDES);
        assert_eq!(report.len() % 4, 0);
        let sdes_words = u16::from_be_bytes([report[30], report[31]]) as usize;
        assert_eq!(report.len(), 28 + 4 + sdes_words * 4);
        // CNAME item
        assert_eq!(report[36], SDES_CNAME);
        assert_eq!(&report[38..45], b"dvbcast");
    }

    #[test]
    fn ntp_fraction_is_sub_second() {
        let (seconds, _fraction) = ntp_now();
        assert!(u64::from(seconds) > NTP_UNIX_OFFSET);
    }
}
