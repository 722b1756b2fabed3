//! The per-tuner controller: device lifecycle, tuning state machine, PID
//! filter management and signal monitoring.

pub mod data;
pub mod settings;

pub use data::{FrontendData, MonitorSnapshot};
pub use settings::FrontendSettings;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use parking_lot::RwLock;

use crate::delivery::{Delivery, Dvbc, Dvbs, Dvbt};
use crate::device::{
    caps, DemuxIo, DvbDriver, FeId, FeType, FrontendInfo, FrontendIo, StatScale,
};
use crate::error::{FrontendError, RequestError};
use crate::mpegts::{PacketBuffer, MAX_PIDS};
use crate::transform::Transform;
use crate::tuning::DeliverySystem;

pub const DEFAULT_DVR_BUFFER_MB: u32 = 18;
pub const MAX_DVR_BUFFER_MB: u32 = 180;
pub const DEFAULT_WAIT_ON_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);
pub const MAX_WAIT_ON_LOCK_TIMEOUT: Duration = Duration::from_millis(3500);

/// Pause between closing and reopening the frontend on a re-tune.
const POST_CLOSE_DELAY: Duration = Duration::from_millis(5);
/// FE_READ_STATUS poll interval while waiting for lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Demux readability poll timeout.
const DATA_POLL_TIMEOUT_MS: i32 = 180;
/// Demux open retries (20 ms apart) before giving up on a PID.
const DEMUX_OPEN_ATTEMPTS: usize = 4;
const DEMUX_OPEN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Delivery-system tallies reported to the control plane, after the
/// transform's advertised-family swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub dvbs2: usize,
    pub dvbt: usize,
    pub dvbt2: usize,
    pub dvbc: usize,
}

struct Inner {
    info: FrontendInfo,
    counts: DeliveryCounts,
    systems: Vec<Box<dyn Delivery>>,
    fe: Option<Box<dyn FrontendIo>>,
    dmx: Option<Box<dyn DemuxIo>>,
    tuned: bool,
    data: FrontendData,
    transform: Transform,
    dvr_buffer_mb: u32,
    wait_on_lock_timeout: Duration,
    /// Sticky latch: once the modern statistics properties report
    /// NotAvailable, stay on the legacy ioctls for good.
    old_api_call_stats: bool,
}

/// One tuner: constructed from the device paths at enumeration, torn down
/// only at shutdown.
///
/// Control operations take the write lock; the streaming thread's data-path
/// reads take the read lock (per-PID counters are atomic).
pub struct Frontend {
    id: FeId,
    path_fe: PathBuf,
    path_dmx: PathBuf,
    path_dvr: PathBuf,
    driver: Arc<dyn DvbDriver>,
    inner: RwLock<Inner>,
}

impl Frontend {
    pub fn new(
        id: FeId,
        driver: Arc<dyn DvbDriver>,
        path_fe: PathBuf,
        path_dmx: PathBuf,
        path_dvr: PathBuf,
    ) -> Self {
        let frontend = Frontend {
            id,
            path_fe,
            path_dmx,
            path_dvr,
            driver,
            inner: RwLock::new(Inner {
                info: FrontendInfo::named("Not Set"),
                counts: DeliveryCounts::default(),
                systems: Vec::new(),
                fe: None,
                dmx: None,
                tuned: false,
                data: FrontendData::new(),
                transform: Transform::default(),
                dvr_buffer_mb: DEFAULT_DVR_BUFFER_MB,
                wait_on_lock_timeout: DEFAULT_WAIT_ON_LOCK_TIMEOUT,
                old_api_call_stats: false,
            }),
        };
        frontend.setup();
        frontend
    }

    pub fn id(&self) -> FeId {
        self.id
    }

    pub fn name(&self) -> String {
        self.inner.read().info.name.clone()
    }

    pub fn info(&self) -> FrontendInfo {
        self.inner.read().info.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path_fe
    }

    pub fn dvr_path(&self) -> &Path {
        &self.path_dvr
    }

    pub fn is_tuned(&self) -> bool {
        self.inner.read().tuned
    }

    // === Setup =============================================================

    /// Open the frontend read-only, read its identity, enumerate the
    /// delivery systems and register the matching modules. A missing device
    /// leaves the frontend inert but enumerable.
    fn setup(&self) {
        let mut inner = self.inner.write();

        let fe = match self.open_frontend_device(true) {
            Ok(fe) => fe,
            Err(e) => {
                error!("Frontend: {}, {}", self.id, e);
                inner.info = FrontendInfo::named("Not Found");
                return;
            }
        };

        match fe.get_info() {
            Ok(info) => inner.info = info,
            Err(e) => {
                error!("Frontend: {}, FE_GET_INFO failed: {}", self.id, e);
                return;
            }
        }
        info!("Frontend Name: {}", inner.info.name);

        let systems = match fe.enum_delivery_systems() {
            Ok(systems) => systems,
            Err(_) => {
                // DVB API older than the enumeration property.
                debug!("Unable to enumerate the delivery systems, deriving from the frontend type");
                match legacy_delivery_systems(&inner.info) {
                    Ok(systems) => systems,
                    Err(e) => {
                        error!("Frontend: {}, {}", self.id, e);
                        return;
                    }
                }
            }
        };
        drop(fe);

        for &system in &systems {
            info!("Frontend Type: {system}");
            match system {
                DeliverySystem::DvbS | DeliverySystem::DvbS2 => inner.counts.dvbs2 += 1,
                DeliverySystem::DvbT => inner.counts.dvbt += 1,
                DeliverySystem::DvbT2 => inner.counts.dvbt2 += 1,
                // One physical cable tuner regardless of annex entries.
                DeliverySystem::DvbCAnnexA
                | DeliverySystem::DvbCAnnexB
                | DeliverySystem::DvbCAnnexC => inner.counts.dvbc = 1,
                DeliverySystem::Undefined => {}
            }
        }
        inner.info.delivery_systems = systems;
        info!(
            "Frontend Freq: {} Hz to {} Hz",
            inner.info.frequency_min, inner.info.frequency_max
        );
        info!(
            "Frontend srat: {} symbols/s to {} symbols/s",
            inner.info.symbol_rate_min, inner.info.symbol_rate_max
        );

        if inner.counts.dvbs2 > 0 {
            inner.systems.push(Box::new(Dvbs::new(self.id)));
        }
        if inner.counts.dvbt > 0 || inner.counts.dvbt2 > 0 {
            inner.systems.push(Box::new(Dvbt::new(self.id)));
        }
        if inner.counts.dvbc > 0 {
            inner.systems.push(Box::new(Dvbc::new(self.id)));
        }

        self.detect_stb_source();
    }

    /// On Enigma2 set-top boxes the demux needs an explicit source binding.
    fn detect_stb_source(&self) {
        if !Path::new("/proc/stb/info/version").exists() {
            return;
        }
        let offset: u32 = std::fs::read_to_string("/proc/stb/frontend/dvr_source_offset")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        match self.driver.open_demux(&self.path_dmx) {
            Ok(dmx) => {
                let source = u32::from(self.id.0) + offset;
                if let Err(e) = dmx.set_source(source) {
                    error!(
                        "DMX_SET_SOURCE ({}) failed: {}",
                        self.path_dmx.display(),
                        e
                    );
                }
                info!(
                    "Set DMX_SET_SOURCE for frontend {} (Offset: {})",
                    self.id, offset
                );
            }
            Err(e) => error!(
                "Frontend: {}, Failed to open {}: {}",
                self.id,
                self.path_dmx.display(),
                e
            ),
        }
    }

    // === Capability queries ================================================

    pub fn capable_of(&self, system: DeliverySystem) -> bool {
        self.inner
            .read()
            .systems
            .iter()
            .any(|s| s.is_capable_of(system))
    }

    /// Whether a transformed version of this request could be served here.
    pub fn capable_to_transform(&self, msg: &str, method: &str) -> bool {
        let inner = self.inner.read();
        match inner.transform.transformation_system_for(msg, method) {
            Some(system) => inner.systems.iter().any(|s| s.is_capable_of(system)),
            None => false,
        }
    }

    /// Delivery-system tallies with the transform's advertised-family swap
    /// applied (an advertised DVB-C device reports its satellite count as
    /// cable and vice versa).
    pub fn delivery_counts(&self) -> DeliveryCounts {
        let inner = self.inner.read();
        let physical = inner.counts;
        DeliveryCounts {
            dvbs2: if inner.transform.advertise_as_dvbs2() {
                physical.dvbc
            } else if inner.transform.advertise_as_dvbc() {
                0
            } else {
                physical.dvbs2
            },
            dvbt: physical.dvbt,
            dvbt2: physical.dvbt2,
            dvbc: if inner.transform.advertise_as_dvbc() {
                physical.dvbs2
            } else if inner.transform.advertise_as_dvbs2() {
                0
            } else {
                physical.dvbc
            },
        }
    }

    // === Control plane =====================================================

    /// Parse a stream request, first through the transform table, into the
    /// tuning descriptor and desired PID set.
    pub fn parse_stream_string(&self, msg: &str, method: &str) -> Result<(), RequestError> {
        info!("Frontend: {}, Parsing transport parameters...", self.id);
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let msg = inner
            .transform
            .transform_stream_string(self.id, msg, method);
        inner.data.parse_stream_string(self.id, &msg, method)?;
        debug!(
            "Frontend: {}, Parsing transport parameters (Finished)",
            self.id
        );
        Ok(())
    }

    pub fn has_device_data_changed(&self) -> bool {
        self.inner.read().data.has_changed()
    }

    /// Bring the device in line with the parsed request: re-tune when the
    /// descriptor changed, then synchronise the PID filters. Returns false
    /// when tuning failed; the state stays idle for the next attempt.
    pub fn update(&self) -> bool {
        info!("Frontend: {}, Updating frontend...", self.id);
        let started = Instant::now();
        let mut inner = self.inner.write();

        if inner.data.has_changed() {
            inner.data.reset_changed();
            inner.tuned = false;
            // Close the installed filters but keep the desired set: it is
            // the client's intent and must survive the re-tune.
            self.close_active_pids(&mut inner);
            inner.data.pids_mut().mark_changed();
            inner.dmx = None;
            inner.fe = None;
            thread::sleep(POST_CLOSE_DELAY);
        }

        if let Err(e) = self.setup_and_tune(&mut inner) {
            error!("Frontend: {}, {}", self.id, e);
            info!("Frontend: {}, Updating frontend (Failed)", self.id);
            return false;
        }
        self.update_pid_filters_locked(&mut inner);
        info!(
            "Frontend: {}, Updating frontend (Finished in {} ms)",
            self.id,
            started.elapsed().as_millis()
        );
        true
    }

    /// Release the devices and reset all per-session state.
    pub fn teardown(&self) -> bool {
        let mut inner = self.inner.write();
        self.close_active_pids(&mut inner);
        inner.tuned = false;
        inner.dmx = None;
        inner.fe = None;
        inner.data.initialize();
        inner.transform.reset();
        info!("Frontend: {}, Teardown", self.id);
        true
    }

    /// Sample the signal statistics. Prefers the scaled property triple and
    /// latches to the legacy ioctls permanently on the first NotAvailable.
    pub fn monitor_signal(&self, show_status: bool) -> MonitorSnapshot {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        let Some(fe) = inner.fe.as_deref() else {
            return inner.data.monitor();
        };

        let status = match fe.read_status() {
            Ok(status) => status,
            Err(e) => {
                error!("Frontend: {}, FE_READ_STATUS failed: {}", self.id, e);
                return inner.data.monitor();
            }
        };

        let mut strength = 0u16;
        let mut snr = 0u16;
        let mut ber = 0u32;
        let mut ublocks = 0u32;

        if !inner.old_api_call_stats {
            match fe.read_signal_stats() {
                Ok(stats) => {
                    match stats.strength.scale {
                        StatScale::Decibel => {
                            strength = (stats.strength.value as f64 * 0.0001) as u16;
                        }
                        StatScale::Relative => strength = stats.strength.uvalue() as u16,
                        _ => inner.old_api_call_stats = true,
                    }
                    match stats.cnr.scale {
                        StatScale::Decibel => {
                            snr = (stats.cnr.value as f64 * 0.0001) as u16;
                        }
                        StatScale::Relative => snr = stats.cnr.uvalue() as u16,
                        _ => inner.old_api_call_stats = true,
                    }
                    match stats.error_blocks.scale {
                        StatScale::Decibel | StatScale::Relative | StatScale::Counter => {
                            ber = (stats.error_blocks.uvalue() & 0x7FFF) as u32;
                        }
                        StatScale::NotAvailable => inner.old_api_call_stats = true,
                    }
                }
                Err(e) => {
                    error!("Frontend: {}, FE_GET_PROPERTY failed: {}", self.id, e);
                    inner.old_api_call_stats = true;
                }
            }
        }

        if inner.old_api_call_stats {
            // Not every frontend supports each of these; missing values
            // simply read zero.
            strength = fe.read_signal_strength().unwrap_or(0);
            snr = fe.read_snr().unwrap_or(0);
            ber = fe.read_ber().unwrap_or(0);
            ublocks = fe.read_uncorrected_blocks().unwrap_or(0);
            strength = ((u32::from(strength) * 240) / 0xFFFF) as u16;
            snr = ((u32::from(snr) * 15) / 0xFFFF) as u16;
        }

        if show_status {
            info!(
                "status {:02x} | signal {:3} | snr {:3} | ber {} | unc {} | Locked {}",
                status.0,
                strength,
                snr,
                ber,
                ublocks,
                u8::from(status.has_lock())
            );
        }
        inner.data.set_monitor_data(status, strength, snr, ber, ublocks);
        inner.data.monitor()
    }

    /// Latest snapshot without touching the device.
    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        self.inner.read().data.monitor()
    }

    pub fn attribute_describe_string(&self) -> String {
        self.inner.read().data.attribute_describe_string(self.id)
    }

    /// Synchronise the kernel PID filters with the desired set.
    pub fn update_pid_filters(&self) {
        let mut inner = self.inner.write();
        self.update_pid_filters_locked(&mut inner);
    }

    // === Data path =========================================================

    /// Poll the demux for readability; used by the streaming workers.
    pub fn is_data_available(&self) -> bool {
        let inner = self.inner.read();
        let Some(dmx) = inner.dmx.as_deref() else {
            return false;
        };
        match dmx.poll_readable(DATA_POLL_TIMEOUT_MS) {
            Ok(readable) => readable,
            Err(e) => {
                error!(
                    "Frontend: {}, Error during polling frontend for data: {}",
                    self.id, e
                );
                false
            }
        }
    }

    /// Read as much as fits into the buffer. Returns true when the buffer
    /// filled up and its statistics were accounted; partial data is retained
    /// for the next call.
    pub fn read_full_ts_packet(&self, buffer: &mut PacketBuffer) -> bool {
        let inner = self.inner.read();
        let Some(dmx) = inner.dmx.as_deref() else {
            return false;
        };
        match dmx.read(buffer.write_buffer()) {
            Ok(bytes) if bytes > 0 => {
                buffer.commit(bytes);
                if buffer.full() {
                    inner.data.add_filter_data(self.id, buffer);
                    return true;
                }
                false
            }
            Ok(_) => false,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(e) => {
                error!("Frontend: {}, Error reading data: {}", self.id, e);
                false
            }
        }
    }

    // === Settings hooks ====================================================

    pub fn settings(&self) -> FrontendSettings {
        let inner = self.inner.read();
        FrontendSettings {
            frontend_name: inner.info.name.clone(),
            path_name: self.path_fe.display().to_string(),
            frequency_range_hz: (inner.info.frequency_min, inner.info.frequency_max),
            symbol_rate_range: (inner.info.symbol_rate_min, inner.info.symbol_rate_max),
            dvr_buffer_mb: inner.dvr_buffer_mb,
            wait_on_lock_timeout_ms: inner.wait_on_lock_timeout.as_millis() as u64,
            transform: inner.transform.settings().clone(),
            delivery_systems: inner.systems.iter().map(|s| s.settings()).collect(),
        }
    }

    pub fn apply_settings(&self, settings: &FrontendSettings) {
        let mut inner = self.inner.write();
        inner.dvr_buffer_mb = if settings.dvr_buffer_mb < MAX_DVR_BUFFER_MB {
            settings.dvr_buffer_mb
        } else {
            DEFAULT_DVR_BUFFER_MB
        };
        inner.wait_on_lock_timeout = Duration::from_millis(settings.wait_on_lock_timeout_ms)
            .min(MAX_WAIT_ON_LOCK_TIMEOUT);
        inner.transform.apply_settings(settings.transform.clone());
        for applied in &settings.delivery_systems {
            for system in &mut inner.systems {
                if system.name() == applied.kind {
                    system.apply_settings(applied);
                }
            }
        }
    }

    // === Internals =========================================================

    fn open_frontend_device(
        &self,
        readonly: bool,
    ) -> Result<Box<dyn FrontendIo>, FrontendError> {
        self.driver
            .open_frontend(&self.path_fe, readonly)
            .map_err(|source| FrontendError::OpenFailed {
                path: self.path_fe.clone(),
                source,
            })
    }

    fn setup_and_tune(&self, inner: &mut Inner) -> Result<(), FrontendError> {
        if inner.tuned {
            return Ok(());
        }
        if inner.fe.is_none() {
            let opened = Instant::now();
            let fe = self.open_frontend_device(false)?;
            info!(
                "Frontend: {}, Opened {} for Read/Write ({} ms)",
                self.id,
                self.path_fe.display(),
                opened.elapsed().as_millis()
            );
            inner.fe = Some(fe);
        }

        self.tune(inner)?;
        inner.tuned = true;
        info!("Frontend: {}, Tuned, waiting on lock...", self.id);

        let Some(fe) = inner.fe.as_deref() else {
            return Ok(());
        };
        let waiting = Instant::now();
        loop {
            if let Ok(status) = fe.read_status() {
                if status.has_lock() {
                    inner.data.set_monitor_data(
                        crate::device::FeStatus(crate::device::FeStatus::HAS_LOCK),
                        100,
                        8,
                        0,
                        0,
                    );
                    info!(
                        "Frontend: {}, Tuned and locked (FE status 0x{:02x})",
                        self.id, status.0
                    );
                    break;
                }
                info!(
                    "Frontend: {}, Not locked yet (FE status 0x{:02x})...",
                    self.id, status.0
                );
            }
            if waiting.elapsed() > inner.wait_on_lock_timeout {
                info!(
                    "Frontend: {}, Not locked yet (Timeout {} ms)...",
                    self.id,
                    waiting.elapsed().as_millis()
                );
                break;
            }
            thread::sleep(LOCK_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Pick the first registered module capable of the requested system.
    fn tune(&self, inner: &mut Inner) -> Result<(), FrontendError> {
        let Inner {
            fe, systems, data, ..
        } = inner;
        let Some(fe) = fe.as_deref() else {
            return Err(FrontendError::Io(std::io::ErrorKind::NotConnected.into()));
        };
        let delsys = data.tuning().delsys;
        for system in systems.iter() {
            if system.is_capable_of(delsys) {
                return system.tune(fe, data.tuning());
            }
        }
        Err(FrontendError::NoCapableDeliverySystem(delsys))
    }

    /// Close every installed filter (used on re-tune and teardown); the
    /// desired flags are left to the caller.
    fn close_active_pids(&self, inner: &mut Inner) {
        let Inner { dmx, data, .. } = inner;
        let opened: Vec<u16> = data.pids().opened_pids().collect();
        for pid in opened {
            if let Some(dmx) = dmx.as_deref() {
                if let Err(e) = dmx.remove_pid(pid) {
                    error!("Frontend: {}, DMX_REMOVE_PID: PID {:04} {}", self.id, pid, e);
                }
            }
            debug!(
                "Frontend: {}, Remove filter PID: {:04} - Packet Count: {}:{}{}",
                self.id,
                pid,
                data.pids().packet_count(pid),
                data.pids().cc_errors(pid),
                if data.pids().is_pmt(pid) { " - PMT" } else { "" }
            );
            data.pids_mut().set_closed(pid);
        }
    }

    fn update_pid_filters_locked(&self, inner: &mut Inner) {
        if !inner.data.pids().has_changed() {
            return;
        }
        if !inner.tuned {
            info!(
                "Frontend: {}, Update PID filters requested, but frontend not tuned!",
                self.id
            );
            return;
        }
        inner.data.pids_mut().reset_changed();
        info!("Frontend: {}, Updating PID filters...", self.id);
        for pid in 0..MAX_PIDS as u16 {
            // close first, then open, in one pass
            self.close_pid(inner, pid);
            self.open_pid(inner, pid);
        }
    }

    fn open_pid(&self, inner: &mut Inner, pid: u16) {
        if !inner.data.pids().should_open(pid) {
            return;
        }
        if inner.dmx.is_none() {
            let mut attempts = 0;
            let dmx = loop {
                match self.driver.open_demux(&self.path_dmx) {
                    Ok(dmx) => break dmx,
                    Err(e) => {
                        attempts += 1;
                        if attempts >= DEMUX_OPEN_ATTEMPTS {
                            error!(
                                "Frontend: {}, Failed to open {}: {}",
                                self.id,
                                self.path_dmx.display(),
                                e
                            );
                            return;
                        }
                        thread::sleep(DEMUX_OPEN_RETRY_DELAY);
                    }
                }
            };
            if inner.dvr_buffer_mb > 0 {
                let size = u64::from(inner.dvr_buffer_mb) * 1024 * 1024;
                match dmx.set_buffer_size(size) {
                    Ok(()) => info!(
                        "Frontend: {}, Set DMX buffer size to {} Bytes",
                        self.id, size
                    ),
                    Err(e) => error!(
                        "Frontend: {}, Failed to set DMX_SET_BUFFER_SIZE: {}",
                        self.id, e
                    ),
                }
            }
            if let Err(e) = dmx.set_pes_filter(pid) {
                error!(
                    "Frontend: {}, Failed to set DMX_SET_PES_FILTER for PID: {:04}: {}",
                    self.id, pid, e
                );
                return;
            }
            info!("Frontend: {}, Opened {}", self.id, self.path_dmx.display());
            inner.dmx = Some(dmx);
        } else if let Some(dmx) = inner.dmx.as_deref() {
            if let Err(e) = dmx.add_pid(pid) {
                error!(
                    "Frontend: {}, Failed to set DMX_ADD_PID for PID: {:04}: {}",
                    self.id, pid, e
                );
                return;
            }
        }
        inner.data.pids_mut().set_opened(pid);
        debug!(
            "Frontend: {}, Set filter PID: {:04}{}",
            self.id,
            pid,
            if inner.data.pids().is_pmt(pid) {
                " - PMT"
            } else {
                ""
            }
        );
    }

    fn close_pid(&self, inner: &mut Inner, pid: u16) {
        if !inner.data.pids().should_close(pid) {
            return;
        }
        if let Some(dmx) = inner.dmx.as_deref() {
            if let Err(e) = dmx.remove_pid(pid) {
                error!("Frontend: {}, DMX_REMOVE_PID: PID {:04} {}", self.id, pid, e);
                return;
            }
        }
        debug!(
            "Frontend: {}, Remove filter PID: {:04} - Packet Count: {}:{}{}",
            self.id,
            pid,
            inner.data.pids().packet_count(pid),
            inner.data.pids().cc_errors(pid),
            if inner.data.pids().is_pmt(pid) {
                " - PMT"
            } else {
                ""
            }
        );
        inner.data.pids_mut().set_closed(pid);
    }
}

/// Infer the supported systems from the legacy frontend type and capability
/// flags (kernels without DTV_ENUM_DELSYS).
fn legacy_delivery_systems(info: &FrontendInfo) -> Result<Vec<DeliverySystem>, FrontendError> {
    let mut systems = Vec::new();
    match info.fe_type {
        Some(FeType::Qpsk) => {
            if info.caps & caps::CAN_2G_MODULATION != 0 {
                systems.push(DeliverySystem::DvbS2);
            }
            systems.push(DeliverySystem::DvbS);
        }
        Some(FeType::Ofdm) => {
            if info.caps & caps::CAN_2G_MODULATION != 0 {
                systems.push(DeliverySystem::DvbT2);
            }
            systems.push(DeliverySystem::DvbT);
        }
        Some(FeType::Qam) => systems.push(DeliverySystem::DvbCAnnexA),
        Some(FeType::Atsc)
            if info.caps & (caps::CAN_QAM_64 | caps::CAN_QAM_256 | caps::CAN_QAM_AUTO) != 0 =>
        {
            systems.push(DeliverySystem::DvbCAnnexB);
        }
        _ => return Err(FrontendError::NoDeliverySystems),
    }
    Ok(systems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ScaledStat, SignalStats, StatScale};
    use crate::testing::MockDriver;

    const DVBS2_REQUEST: &str =
        "src=1&freq=11836&pol=h&ro=0.35&msys=dvbs2&mtype=8psk&plts=on&sr=27500&fec=23&pids=0";

    fn mock_frontend() -> (Arc<MockDriver>, Frontend) {
        let driver = Arc::new(MockDriver::new());
        let frontend = Frontend::new(
            FeId(0),
            driver.clone(),
            PathBuf::from("/dev/dvb/adapter0/frontend0"),
            PathBuf::from("/dev/dvb/adapter0/demux0"),
            PathBuf::from("/dev/dvb/adapter0/dvr0"),
        );
        (driver, frontend)
    }

    #[test]
    fn setup_registers_delivery_modules() {
        let (_driver, frontend) = mock_frontend();
        let info = frontend.info();
        assert_eq!(info.name, "Mock DVB Card");
        assert!(frontend.capable_of(DeliverySystem::DvbS2));
        assert!(frontend.capable_of(DeliverySystem::DvbT));
        assert!(!frontend.capable_of(DeliverySystem::DvbCAnnexA));
        // DVB-S and DVB-S2 both count toward the satellite tally.
        assert_eq!(
            frontend.delivery_counts(),
            DeliveryCounts {
                dvbs2: 2,
                dvbt: 1,
                dvbt2: 0,
                dvbc: 0
            }
        );
    }

    #[test]
    fn absent_device_reports_not_found() {
        let driver = Arc::new(MockDriver::new());
        *driver.state.fail_frontend_open.lock() = true;
        let frontend = Frontend::new(
            FeId(3),
            driver,
            PathBuf::from("/dev/dvb/adapter3/frontend0"),
            PathBuf::from("/dev/dvb/adapter3/demux0"),
            PathBuf::from("/dev/dvb/adapter3/dvr0"),
        );
        assert_eq!(frontend.name(), "Not Found");
        assert!(!frontend.update());
    }

    #[test]
    fn legacy_fallback_derives_systems_from_caps() {
        let driver = Arc::new(MockDriver::new());
        *driver.state.enum_systems.lock() = None;
        {
            let mut info = crate::device::FrontendInfo::named("Old QPSK Card");
            info.fe_type = Some(FeType::Qpsk);
            info.caps = caps::CAN_2G_MODULATION;
            *driver.state.info.lock() = Some(info);
        }
        let frontend = Frontend::new(
            FeId(0),
            driver,
            PathBuf::from("/dev/dvb/adapter0/frontend0"),
            PathBuf::from("/dev/dvb/adapter0/demux0"),
            PathBuf::from("/dev/dvb/adapter0/dvr0"),
        );
        assert!(frontend.capable_of(DeliverySystem::DvbS));
        assert!(frontend.capable_of(DeliverySystem::DvbS2));
        assert!(!frontend.capable_of(DeliverySystem::DvbT));
    }

    #[test]
    fn dvbs2_tune_with_single_pid() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.has_device_data_changed());
        assert!(frontend.update());
        assert!(frontend.is_tuned());

        let journal = driver.journal();
        // 18V for horizontal polarization, S2 + 8PSK + 27500 ksym/s
        assert!(journal.contains(&"VOLTAGE 18".to_string()));
        let props = journal
            .iter()
            .find(|l| l.starts_with("SET_PROPS"))
            .unwrap();
        assert!(props.contains("17:6")); // DELIVERY_SYSTEM = SYS_DVBS2
        assert!(props.contains("4:9")); // MODULATION = PSK_8
        assert!(props.contains("8:27500000")); // SYMBOL_RATE
        // exactly one filter installed, via the initial PES filter
        assert!(journal.contains(&"PES_FILTER 0".to_string()));
        assert!(!journal.iter().any(|l| l.starts_with("ADD_PID")));
        // lock seeds the monitor snapshot
        let monitor = frontend.monitor_snapshot();
        assert!(monitor.status.has_lock());
        assert_eq!(monitor.strength, 100);
        assert_eq!(monitor.snr, 8);
    }

    #[test]
    fn mid_stream_pid_change_adds_without_retune() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());
        driver.clear_journal();

        let msg = DVBS2_REQUEST.replace("pids=0", "pids=0,16,17");
        frontend.parse_stream_string(&msg, "PLAY").unwrap();
        assert!(!frontend.has_device_data_changed());
        assert!(frontend.update());

        let journal = driver.journal();
        assert!(!journal.iter().any(|l| l.starts_with("SET_PROPS")));
        assert!(!journal.iter().any(|l| l.starts_with("REMOVE_PID")));
        assert!(journal.contains(&"ADD_PID 16".to_string()));
        assert!(journal.contains(&"ADD_PID 17".to_string()));
    }

    #[test]
    fn delivery_change_forces_full_retune() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());
        driver.clear_journal();

        frontend
            .parse_stream_string("msys=dvbt&freq=474&bw=8&tmode=8k&gi=18&pids=all", "PLAY")
            .unwrap();
        assert!(frontend.has_device_data_changed());
        assert!(frontend.update());

        let journal = driver.journal();
        // old filter dropped, frontend reopened, terrestrial module invoked
        assert!(journal.contains(&"FE_OPEN rw".to_string()));
        let props = journal
            .iter()
            .find(|l| l.starts_with("SET_PROPS"))
            .unwrap();
        assert!(props.contains("17:3")); // SYS_DVBT
        assert!(props.contains("5:8000000")); // BANDWIDTH_HZ
        // all PIDs desired again after the retune
        let inner = frontend.inner.read();
        assert_eq!(inner.data.pids().desired_count(), MAX_PIDS);
        assert_eq!(inner.data.pids().opened_count(), MAX_PIDS);
    }

    #[test]
    fn lock_timeout_still_latches_tuned() {
        let (driver, frontend) = mock_frontend();
        *driver.state.default_status.lock() = 0; // never locks
        frontend.apply_settings(&FrontendSettings {
            wait_on_lock_timeout_ms: 60,
            ..frontend.settings()
        });

        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());
        assert!(frontend.is_tuned());
        assert!(!frontend.monitor_snapshot().status.has_lock());
    }

    #[test]
    fn modern_stats_latch_to_legacy_once() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());

        *driver.state.legacy_strength.lock() = 0xFFFF;
        *driver.state.legacy_snr.lock() = 0x7FFF;

        // First call: the scripted queue is empty, so the modern path reads
        // NotAvailable and latches.
        let snapshot = frontend.monitor_signal(false);
        assert_eq!(snapshot.strength, 240);
        assert_eq!(snapshot.snr, 7);

        // Queue a modern sample; the latch must ignore it.
        driver.state.modern_stats.lock().push_back(SignalStats {
            strength: ScaledStat {
                scale: StatScale::Relative,
                value: 10,
            },
            cnr: ScaledStat {
                scale: StatScale::Relative,
                value: 10,
            },
            error_blocks: ScaledStat {
                scale: StatScale::Counter,
                value: 0,
            },
        });
        frontend.monitor_signal(false);
        assert_eq!(
            driver
                .state
                .modern_calls
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn legacy_normalisation_stays_in_range() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());

        for (raw_strength, raw_snr) in [(0u16, 0u16), (0x8000, 0x8000), (0xFFFF, 0xFFFF)] {
            *driver.state.legacy_strength.lock() = raw_strength;
            *driver.state.legacy_snr.lock() = raw_snr;
            let snapshot = frontend.monitor_signal(false);
            assert!(snapshot.strength <= 240);
            assert!(snapshot.snr <= 15);
        }
    }

    #[test]
    fn pid_filter_sync_is_noop_without_changes() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());
        driver.clear_journal();

        frontend.update_pid_filters();
        assert!(driver.journal().is_empty());
    }

    #[test]
    fn opened_matches_desired_after_filter_sync() {
        let (_driver, frontend) = mock_frontend();
        frontend
            .parse_stream_string(&DVBS2_REQUEST.replace("pids=0", "pids=0,100,200"), "PLAY")
            .unwrap();
        assert!(frontend.update());

        frontend
            .parse_stream_string("delpids=100&addpids=300", "PLAY")
            .unwrap();
        frontend.update_pid_filters();

        let inner = frontend.inner.read();
        for pid in 0..MAX_PIDS as u16 {
            assert_eq!(
                inner.data.pids().opened(pid),
                inner.data.pids().desired(pid),
                "PID {pid} diverged"
            );
        }
    }

    #[test]
    fn demux_open_retries_then_gives_up() {
        let (driver, frontend) = mock_frontend();
        driver
            .state
            .demux_open_failures
            .store(DEMUX_OPEN_ATTEMPTS, std::sync::atomic::Ordering::Relaxed);
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update()); // tune succeeds, the PID just stays closed

        let inner = frontend.inner.read();
        assert!(!inner.data.pids().opened(0));
        assert!(inner.data.pids().desired(0));
    }

    #[test]
    fn teardown_resets_all_session_state() {
        let (driver, frontend) = mock_frontend();
        frontend.parse_stream_string(DVBS2_REQUEST, "PLAY").unwrap();
        assert!(frontend.update());

        assert!(frontend.teardown());
        assert!(!frontend.is_tuned());
        let journal = driver.journal();
        assert!(journal.contains(&"REMOVE_PID 0".to_string()));
        let inner = frontend.inner.read();
        assert_eq!(inner.data.pids().desired_count(), 0);
        assert_eq!(inner.data.pids().opened_count(), 0);
    }

    #[test]
    fn settings_roundtrip_with_clamping() {
        let (_driver, frontend) = mock_frontend();
        let mut settings = frontend.settings();
        assert_eq!(settings.dvr_buffer_mb, DEFAULT_DVR_BUFFER_MB);

        settings.dvr_buffer_mb = 200; // above the cap, falls back to default
        settings.wait_on_lock_timeout_ms = 10_000; // clamped to the max
        frontend.apply_settings(&settings);

        let applied = frontend.settings();
        assert_eq!(applied.dvr_buffer_mb, DEFAULT_DVR_BUFFER_MB);
        assert_eq!(
            applied.wait_on_lock_timeout_ms,
            MAX_WAIT_ON_LOCK_TIMEOUT.as_millis() as u64
        );
    }
}
