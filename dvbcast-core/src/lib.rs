//! dvbcast-core: locally attached DVB tuners as network-streamable MPEG-TS
//! sources.
//!
//! The crate covers the per-tuner control-and-data pipeline:
//!
//! - [`frontend::Frontend`]: device lifecycle and the tuning state machine
//! - [`delivery`]: DVB-S/S2, DVB-T/T2 and DVB-C tuning, including DiSEqC
//! - [`transform`]: declarative request remapping
//! - [`output`]: per-client streaming workers (RTP/UDP with an RTCP sidecar,
//!   or a TS file)
//! - [`enumerate`]: adapter-tree discovery
//!
//! The control plane (RTSP/HTTP), settings persistence and CA decryption are
//! external collaborators; this crate only exposes the hooks they drive.

pub mod client;
pub mod delivery;
pub mod device;
pub mod enumerate;
pub mod error;
pub mod frontend;
pub mod mpegts;
pub mod output;
pub mod request;
pub mod transform;
pub mod tuning;

#[cfg(test)]
pub(crate) mod testing;

pub use client::StreamClient;
pub use device::{default_driver, DvbDriver, FeId};
pub use enumerate::enumerate_frontends;
pub use error::{FrontendError, RequestError, StreamError};
pub use frontend::{Frontend, FrontendSettings, MonitorSnapshot};
pub use output::{RtpOutput, StreamOutput, StreamThread, TsFileOutput};
pub use tuning::DeliverySystem;
