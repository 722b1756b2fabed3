//! TS file output: writes the raw payload, without the RTP header prefix.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use log::{error, info};

use super::StreamOutput;
use crate::client::StreamClient;
use crate::error::StreamError;
use crate::mpegts::PacketBuffer;

pub struct TsFileOutput {
    path: PathBuf,
    file: Option<File>,
}

impl TsFileOutput {
    pub fn new(path: PathBuf) -> Self {
        TsFileOutput { path, file: None }
    }
}

impl StreamOutput for TsFileOutput {
    fn protocol(&self) -> &'static str {
        "FILE"
    }

    fn start(&mut self, _client: &StreamClient) -> Result<(), StreamError> {
        let file = File::create(&self.path).map_err(|source| StreamError::File {
            path: self.path.clone(),
            source,
        })?;
        info!("Writing TS stream to {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    fn write_data(&mut self, buffer: &mut PacketBuffer, _client: &StreamClient, _seq: u16) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        if let Err(e) = file.write_all(buffer.ts_payload()) {
            error!("Error writing TS data to {}: {}", self.path.display(), e);
            return false;
        }
        true
    }

    fn stop(&mut self, _client: &StreamClient) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpegts::packet_buffer::RTP_HEADER_LEN;
    use std::sync::Arc;

    #[test]
    fn writes_payload_without_rtp_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.ts");
        let client = Arc::new(StreamClient::new("127.0.0.1:5004".parse().unwrap(), 1));

        let mut output = TsFileOutput::new(path.clone());
        output.start(&client).unwrap();

        let mut buffer = PacketBuffer::new();
        buffer.init_rtp_header(1);
        let payload: Vec<u8> = (0..buffer.bytes_to_write()).map(|i| i as u8).collect();
        buffer.write_buffer()[..payload.len()].copy_from_slice(&payload);
        buffer.commit(payload.len());
        assert!(buffer.full());

        assert!(output.write_data(&mut buffer, &client, 1));
        output.stop(&client);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, payload);
        assert_eq!(written.len(), buffer.frame().len() - RTP_HEADER_LEN);
    }

    #[test]
    fn unopenable_path_is_an_error() {
        let client = Arc::new(StreamClient::new("127.0.0.1:5004".parse().unwrap(), 1));
        let mut output = TsFileOutput::new(PathBuf::from("/nonexistent-dir/capture.ts"));
        assert!(matches!(
            output.start(&client),
            Err(StreamError::File { .. })
        ));
    }
}
