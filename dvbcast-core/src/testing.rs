//! Scripted mock devices for the state-machine tests: every ioctl-level call
//! is appended to a journal, statuses and statistics can be queued, and
//! demux reads are fed from canned TS chunks.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{
    DemuxIo, DtvProp, DvbDriver, FeStatus, FeType, FrontendInfo, FrontendIo, MiniBurst,
    ScaledStat, SecVoltage, SignalStats,
};
use crate::tuning::DeliverySystem;

#[derive(Default)]
pub struct MockState {
    pub journal: Mutex<Vec<String>>,
    /// Scripted FE_READ_STATUS results; when drained, `default_status` is
    /// returned.
    pub statuses: Mutex<VecDeque<u32>>,
    pub default_status: Mutex<u32>,
    /// Scripted modern statistics; when drained the triple reads
    /// NotAvailable (which latches the legacy path).
    pub modern_stats: Mutex<VecDeque<SignalStats>>,
    pub modern_calls: AtomicUsize,
    pub legacy_strength: Mutex<u16>,
    pub legacy_snr: Mutex<u16>,
    pub diseqc_fail_remaining: AtomicUsize,
    pub diseqc_attempts: AtomicUsize,
    /// Number of demux opens to fail before succeeding.
    pub demux_open_failures: AtomicUsize,
    /// `None` makes the modern delivery-system enumeration fail (legacy
    /// fallback path).
    pub enum_systems: Mutex<Option<Vec<DeliverySystem>>>,
    pub info: Mutex<Option<FrontendInfo>>,
    /// Canned demux data, handed out chunk by chunk.
    pub read_chunks: Mutex<VecDeque<Vec<u8>>>,
    /// Fail every frontend open (device absent).
    pub fail_frontend_open: Mutex<bool>,
}

impl MockState {
    fn log(&self, entry: String) {
        self.journal.lock().push(entry);
    }
}

fn not_available() -> SignalStats {
    SignalStats {
        strength: ScaledStat::NOT_AVAILABLE,
        cnr: ScaledStat::NOT_AVAILABLE,
        error_blocks: ScaledStat::NOT_AVAILABLE,
    }
}

fn default_info() -> FrontendInfo {
    FrontendInfo {
        name: "Mock DVB Card".to_string(),
        frequency_min: 950_000_000,
        frequency_max: 2_150_000_000,
        symbol_rate_min: 1_000_000,
        symbol_rate_max: 45_000_000,
        caps: 0,
        fe_type: Some(FeType::Qpsk),
        delivery_systems: Vec::new(),
    }
}

/// A standalone mock frontend for delivery-module tests.
pub struct MockFrontendIo {
    state: Arc<MockState>,
}

impl Default for MockFrontendIo {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFrontendIo {
    pub fn new() -> Self {
        MockFrontendIo {
            state: Arc::new(MockState::default()),
        }
    }

    pub fn with_state(state: Arc<MockState>) -> Self {
        MockFrontendIo { state }
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.journal.lock().clone()
    }

    pub fn fail_diseqc_times(&self, times: usize) {
        self.state
            .diseqc_fail_remaining
            .store(times, Ordering::Relaxed);
    }

    pub fn diseqc_attempts(&self) -> usize {
        self.state.diseqc_attempts.load(Ordering::Relaxed)
    }
}

impl FrontendIo for MockFrontendIo {
    fn get_info(&self) -> io::Result<FrontendInfo> {
        Ok(self.state.info.lock().clone().unwrap_or_else(default_info))
    }

    fn enum_delivery_systems(&self) -> io::Result<Vec<DeliverySystem>> {
        match self.state.enum_systems.lock().clone() {
            Some(systems) => Ok(systems),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "DTV_ENUM_DELSYS not supported",
            )),
        }
    }

    fn set_properties(&self, props: &[DtvProp]) -> io::Result<()> {
        let formatted: Vec<String> = props
            .iter()
            .map(|p| format!("{}:{}", p.cmd, p.value))
            .collect();
        self.state.log(format!("SET_PROPS {}", formatted.join(" ")));
        Ok(())
    }

    fn read_status(&self) -> io::Result<FeStatus> {
        let status = self
            .state
            .statuses
            .lock()
            .pop_front()
            .unwrap_or(*self.state.default_status.lock());
        Ok(FeStatus(status))
    }

    fn read_signal_stats(&self) -> io::Result<SignalStats> {
        self.state.modern_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .state
            .modern_stats
            .lock()
            .pop_front()
            .unwrap_or_else(not_available))
    }

    fn read_signal_strength(&self) -> io::Result<u16> {
        Ok(*self.state.legacy_strength.lock())
    }

    fn read_snr(&self) -> io::Result<u16> {
        Ok(*self.state.legacy_snr.lock())
    }

    fn read_ber(&self) -> io::Result<u32> {
        Ok(0)
    }

    fn read_uncorrected_blocks(&self) -> io::Result<u32> {
        Ok(0)
    }

    fn set_tone(&self, on: bool) -> io::Result<()> {
        self.state
            .log(format!("TONE {}", if on { "on" } else { "off" }));
        Ok(())
    }

    fn set_voltage(&self, voltage: SecVoltage) -> io::Result<()> {
        let label = match voltage {
            SecVoltage::V13 => "13",
            SecVoltage::V18 => "18",
            SecVoltage::Off => "off",
        };
        self.state.log(format!("VOLTAGE {label}"));
        Ok(())
    }

    fn diseqc_send_master_cmd(&self, msg: &[u8]) -> io::Result<()> {
        self.state.diseqc_attempts.fetch_add(1, Ordering::Relaxed);
        let remaining = self.state.diseqc_fail_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.state
                    .diseqc_fail_remaining
                    .store(remaining - 1, Ordering::Relaxed);
            }
            return Err(io::Error::new(io::ErrorKind::TimedOut, "bus collision"));
        }
        let formatted: Vec<String> = msg.iter().map(|b| format!("{b:02x}")).collect();
        self.state.log(format!("DISEQC_MSG {}", formatted.join(" ")));
        Ok(())
    }

    fn diseqc_send_burst(&self, burst: MiniBurst) -> io::Result<()> {
        let label = match burst {
            MiniBurst::A => "A",
            MiniBurst::B => "B",
        };
        self.state.log(format!("BURST {label}"));
        Ok(())
    }

    fn clear_events(&self) {
        self.state.log("CLEAR_EVENTS".to_string());
    }
}

pub struct MockDemuxIo {
    state: Arc<MockState>,
}

impl DemuxIo for MockDemuxIo {
    fn set_buffer_size(&self, bytes: u64) -> io::Result<()> {
        self.state.log(format!("DMX_BUF {bytes}"));
        Ok(())
    }

    fn set_pes_filter(&self, pid: u16) -> io::Result<()> {
        self.state.log(format!("PES_FILTER {pid}"));
        Ok(())
    }

    fn add_pid(&self, pid: u16) -> io::Result<()> {
        self.state.log(format!("ADD_PID {pid}"));
        Ok(())
    }

    fn remove_pid(&self, pid: u16) -> io::Result<()> {
        self.state.log(format!("REMOVE_PID {pid}"));
        Ok(())
    }

    fn set_source(&self, source: u32) -> io::Result<()> {
        self.state.log(format!("DMX_SOURCE {source}"));
        Ok(())
    }

    fn poll_readable(&self, _timeout_ms: i32) -> io::Result<bool> {
        Ok(!self.state.read_chunks.lock().is_empty())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut chunks = self.state.read_chunks.lock();
        let Some(chunk) = chunks.pop_front() else {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunks.push_front(chunk[n..].to_vec());
        }
        Ok(n)
    }
}

/// Driver handing out mock frontends and demuxes over one shared state.
pub struct MockDriver {
    pub state: Arc<MockState>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        let state = Arc::new(MockState::default());
        // Device reports both satellite generations plus DVB-T by default.
        *state.enum_systems.lock() = Some(vec![
            DeliverySystem::DvbS,
            DeliverySystem::DvbS2,
            DeliverySystem::DvbT,
        ]);
        *state.default_status.lock() = FeStatus::HAS_LOCK;
        MockDriver { state }
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.state.journal.lock().clear();
    }

    pub fn queue_chunk(&self, chunk: Vec<u8>) {
        self.state.read_chunks.lock().push_back(chunk);
    }
}

impl DvbDriver for MockDriver {
    fn open_frontend(&self, _path: &Path, readonly: bool) -> io::Result<Box<dyn FrontendIo>> {
        if *self.state.fail_frontend_open.lock() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        self.state
            .log(format!("FE_OPEN {}", if readonly { "ro" } else { "rw" }));
        Ok(Box::new(MockFrontendIo::with_state(self.state.clone())))
    }

    fn open_demux(&self, _path: &Path) -> io::Result<Box<dyn DemuxIo>> {
        let failures = self.state.demux_open_failures.load(Ordering::Relaxed);
        if failures > 0 {
            self.state
                .demux_open_failures
                .store(failures - 1, Ordering::Relaxed);
            return Err(io::Error::from(io::ErrorKind::ResourceBusy));
        }
        self.state.log("DMX_OPEN".to_string());
        Ok(Box::new(MockDemuxIo {
            state: self.state.clone(),
        }))
    }
}
