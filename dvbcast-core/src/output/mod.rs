//! Streaming workers: one thread per active client, draining the frontend's
//! demux into an output variant (RTP/UDP or a TS file).

pub mod rtcp;
pub mod rtp;
pub mod ts_writer;

pub use rtp::RtpOutput;
pub use ts_writer::TsFileOutput;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::info;

use crate::client::StreamClient;
use crate::error::StreamError;
use crate::frontend::Frontend;
use crate::mpegts::PacketBuffer;

/// A framing/transport variant driven by [`StreamThread`].
pub trait StreamOutput: Send {
    fn protocol(&self) -> &'static str;

    /// Create sockets / open files before the first frame.
    fn start(&mut self, client: &StreamClient) -> Result<(), StreamError>;

    /// Emit one full buffer. `seq` is the worker's frame counter (the RTP
    /// sequence number); file variants ignore it.
    fn write_data(&mut self, buffer: &mut PacketBuffer, client: &StreamClient, seq: u16) -> bool;

    fn stop(&mut self, _client: &StreamClient) {}
}

/// Owns the per-client worker thread. The terminate flag is checked at the
/// loop head and after every blocking call, so the worker winds down within
/// one poll interval.
pub struct StreamThread {
    protocol: &'static str,
    terminate: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    pub fn start(
        frontend: Arc<Frontend>,
        client: Arc<StreamClient>,
        mut output: Box<dyn StreamOutput>,
    ) -> Result<Self, StreamError> {
        output.start(&client)?;
        let protocol = output.protocol();
        info!(
            "Frontend: {}, Start {} stream to {}",
            frontend.id(),
            protocol,
            client.rtp_addr()
        );
        let terminate = Arc::new(AtomicBool::new(false));
        let flag = terminate.clone();
        let handle = thread::Builder::new()
            .name(format!("stream-fe{}", frontend.id()))
            .spawn(move || streaming_loop(frontend, client, output, flag))
            .map_err(StreamError::Thread)?;
        Ok(StreamThread {
            protocol,
            terminate,
            handle: Some(handle),
        })
    }

    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Signal the worker and wait for it to exit.
    pub fn terminate(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn streaming_loop(
    frontend: Arc<Frontend>,
    client: Arc<StreamClient>,
    mut output: Box<dyn StreamOutput>,
    terminate: Arc<AtomicBool>,
) {
    let mut buffer = PacketBuffer::new();
    buffer.init_rtp_header(client.ssrc());
    let mut seq: u16 = 0;

    while !terminate.load(Ordering::Relaxed) {
        if !frontend.is_data_available() {
            continue;
        }
        while frontend.read_full_ts_packet(&mut buffer) {
            seq = seq.wrapping_add(1);
            output.write_data(&mut buffer, &client, seq);
            buffer.mark_empty();
            if terminate.load(Ordering::Relaxed) {
                break;
            }
        }
    }
    output.stop(&client);
    info!(
        "Frontend: {}, Stopped {} stream to {}",
        frontend.id(),
        output.protocol(),
        client.rtp_addr()
    );
}
