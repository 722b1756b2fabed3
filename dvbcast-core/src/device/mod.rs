//! Abstraction over the kernel DVB character devices.
//!
//! The frontend controller talks to the devices through the [`DvbDriver`],
//! [`FrontendIo`] and [`DemuxIo`] traits so the state machine compiles and
//! tests everywhere; the Linux implementation does the actual ioctls.

#[cfg(target_os = "linux")]
pub(crate) mod api;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod unsupported;

#[cfg(target_os = "linux")]
pub use self::linux::LinuxDriver;
#[cfg(not(target_os = "linux"))]
pub use self::unsupported::UnsupportedDriver;

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::tuning::DeliverySystem;

/// Identity of a frontend within this process, assigned during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeId(pub u16);

impl fmt::Display for FeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Legacy frontend type from FE_GET_INFO, used when the delivery-system
/// enumeration property is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeType {
    Qpsk,
    Qam,
    Ofdm,
    Atsc,
}

impl FeType {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(FeType::Qpsk),
            1 => Some(FeType::Qam),
            2 => Some(FeType::Ofdm),
            3 => Some(FeType::Atsc),
            _ => None,
        }
    }
}

/// Frontend capability flag bits from FE_GET_INFO.
pub mod caps {
    pub const CAN_QAM_64: u32 = 0x2000;
    pub const CAN_QAM_256: u32 = 0x8000;
    pub const CAN_QAM_AUTO: u32 = 0x0001_0000;
    pub const CAN_2G_MODULATION: u32 = 0x1000_0000;
}

/// Static device information read once per frontend during setup.
#[derive(Debug, Clone)]
pub struct FrontendInfo {
    pub name: String,
    pub frequency_min: u32,
    pub frequency_max: u32,
    pub symbol_rate_min: u32,
    pub symbol_rate_max: u32,
    pub caps: u32,
    pub fe_type: Option<FeType>,
    /// Filled in by the controller after delivery-system enumeration.
    pub delivery_systems: Vec<DeliverySystem>,
}

impl FrontendInfo {
    /// Placeholder used before setup or when the device is absent.
    pub fn named(name: &str) -> Self {
        FrontendInfo {
            name: name.to_string(),
            frequency_min: 0,
            frequency_max: 0,
            symbol_rate_min: 0,
            symbol_rate_max: 0,
            caps: 0,
            fe_type: None,
            delivery_systems: Vec::new(),
        }
    }
}

/// FE_READ_STATUS bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeStatus(pub u32);

impl FeStatus {
    pub const HAS_SIGNAL: u32 = 0x01;
    pub const HAS_CARRIER: u32 = 0x02;
    pub const HAS_VITERBI: u32 = 0x04;
    pub const HAS_SYNC: u32 = 0x08;
    pub const HAS_LOCK: u32 = 0x10;
    pub const TIMEDOUT: u32 = 0x20;

    pub fn has_lock(self) -> bool {
        self.0 & Self::HAS_LOCK != 0
    }
}

/// One entry of a frontend property sequence (DTV_* command plus value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtvProp {
    pub cmd: u32,
    pub value: u32,
}

impl DtvProp {
    pub const fn new(cmd: u32, value: u32) -> Self {
        DtvProp { cmd, value }
    }
}

/// DTV property command numbers used by the tuning sequences.
pub mod dtv {
    pub const TUNE: u32 = 1;
    pub const CLEAR: u32 = 2;
    pub const FREQUENCY: u32 = 3;
    pub const MODULATION: u32 = 4;
    pub const BANDWIDTH_HZ: u32 = 5;
    pub const INVERSION: u32 = 6;
    pub const SYMBOL_RATE: u32 = 8;
    pub const INNER_FEC: u32 = 9;
    pub const PILOT: u32 = 12;
    pub const ROLLOFF: u32 = 13;
    pub const DELIVERY_SYSTEM: u32 = 17;
    pub const CODE_RATE_HP: u32 = 36;
    pub const CODE_RATE_LP: u32 = 37;
    pub const GUARD_INTERVAL: u32 = 38;
    pub const TRANSMISSION_MODE: u32 = 39;
    pub const HIERARCHY: u32 = 40;
    pub const STREAM_ID: u32 = 42;
    pub const ENUM_DELSYS: u32 = 44;
    pub const STAT_SIGNAL_STRENGTH: u32 = 62;
    pub const STAT_CNR: u32 = 63;
    pub const STAT_ERROR_BLOCK_COUNT: u32 = 68;
}

/// Scale of a modern statistics sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatScale {
    NotAvailable,
    Decibel,
    Relative,
    Counter,
}

/// One scaled sample from the DTV_STAT_* properties.
#[derive(Debug, Clone, Copy)]
pub struct ScaledStat {
    pub scale: StatScale,
    /// Signed value for Decibel scale; reinterpret as unsigned otherwise.
    pub value: i64,
}

impl ScaledStat {
    pub const NOT_AVAILABLE: ScaledStat = ScaledStat {
        scale: StatScale::NotAvailable,
        value: 0,
    };

    pub fn uvalue(&self) -> u64 {
        self.value as u64
    }
}

/// The modern statistics triple read in one FE_GET_PROPERTY call.
#[derive(Debug, Clone, Copy)]
pub struct SignalStats {
    pub strength: ScaledStat,
    pub cnr: ScaledStat,
    pub error_blocks: ScaledStat,
}

/// LNB supply voltage (doubles as polarization selector).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecVoltage {
    V13,
    V18,
    Off,
}

/// DiSEqC tone-burst selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiniBurst {
    A,
    B,
}

/// Operations on an open frontend device.
pub trait FrontendIo: Send + Sync {
    fn get_info(&self) -> io::Result<FrontendInfo>;

    /// Modern DTV_ENUM_DELSYS query. An `Err` makes the controller fall back
    /// to inferring the systems from the legacy type and capability flags.
    fn enum_delivery_systems(&self) -> io::Result<Vec<DeliverySystem>>;

    fn set_properties(&self, props: &[DtvProp]) -> io::Result<()>;

    fn read_status(&self) -> io::Result<FeStatus>;

    /// Modern scaled statistics (strength, CNR, error blocks).
    fn read_signal_stats(&self) -> io::Result<SignalStats>;

    // Legacy per-value statistics ioctls.
    fn read_signal_strength(&self) -> io::Result<u16>;
    fn read_snr(&self) -> io::Result<u16>;
    fn read_ber(&self) -> io::Result<u32>;
    fn read_uncorrected_blocks(&self) -> io::Result<u32>;

    fn set_tone(&self, on: bool) -> io::Result<()>;
    fn set_voltage(&self, voltage: SecVoltage) -> io::Result<()>;
    fn diseqc_send_master_cmd(&self, msg: &[u8]) -> io::Result<()>;
    fn diseqc_send_burst(&self, burst: MiniBurst) -> io::Result<()>;

    /// Drain any queued frontend events before tuning.
    fn clear_events(&self);
}

/// Operations on an open demux device.
pub trait DemuxIo: Send + Sync {
    fn set_buffer_size(&self, bytes: u64) -> io::Result<()>;

    /// Install the initial PES filter (input FRONTEND, output TSDEMUX_TAP,
    /// type OTHER, immediate start).
    fn set_pes_filter(&self, pid: u16) -> io::Result<()>;

    fn add_pid(&self, pid: u16) -> io::Result<()>;
    fn remove_pid(&self, pid: u16) -> io::Result<()>;
    fn set_source(&self, source: u32) -> io::Result<()>;

    /// Poll the demux fd for readability.
    fn poll_readable(&self, timeout_ms: i32) -> io::Result<bool>;

    /// Non-blocking read; `WouldBlock` means no data right now.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Factory opening the per-tuner devices. Handles close their fd on drop.
pub trait DvbDriver: Send + Sync {
    fn open_frontend(&self, path: &Path, readonly: bool) -> io::Result<Box<dyn FrontendIo>>;
    fn open_demux(&self, path: &Path) -> io::Result<Box<dyn DemuxIo>>;
}

/// The platform driver for this build.
pub fn default_driver() -> Arc<dyn DvbDriver> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(LinuxDriver)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(UnsupportedDriver)
    }
}
