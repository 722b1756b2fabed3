//! The mutable per-frontend tuning intent: descriptor, desired PID set and
//! the latest signal monitor snapshot.

use log::debug;

use crate::device::{FeId, FeStatus};
use crate::error::RequestError;
use crate::mpegts::{self, PacketBuffer, PidTable, TsHeader, MAX_PIDS, PAT_PID, TS_PACKET_SIZE};
use crate::request::{format_pid_list, parse_pid_spec, query_pairs, PidSpec};
use crate::tuning::{
    bandwidth_hz_from_token, bandwidth_token, DeliverySystem, FecInner, GuardInterval, Inversion,
    Modulation, Pilot, Polarization, RollOff, TransmissionMode, TuningDescriptor,
};

/// Latest signal statistics, written by `monitor_signal`, read by the control
/// plane. Stale reads are fine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSnapshot {
    pub status: FeStatus,
    /// 0..=240 on the legacy statistics path.
    pub strength: u16,
    /// 0..=15 on the legacy statistics path.
    pub snr: u16,
    pub ber: u32,
    pub uncorrected_blocks: u32,
}

#[derive(Default)]
pub struct FrontendData {
    tuning: TuningDescriptor,
    /// Any tuning-field change; forces the close-and-retune path in `update`.
    changed: bool,
    pids: PidTable,
    monitor: MonitorSnapshot,
}

impl FrontendData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything; used by teardown.
    pub fn initialize(&mut self) {
        *self = Self::default();
    }

    pub fn tuning(&self) -> &TuningDescriptor {
        &self.tuning
    }

    pub fn pids(&self) -> &PidTable {
        &self.pids
    }

    pub fn pids_mut(&mut self) -> &mut PidTable {
        &mut self.pids
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    pub fn monitor(&self) -> MonitorSnapshot {
        self.monitor
    }

    pub fn set_monitor_data(
        &mut self,
        status: FeStatus,
        strength: u16,
        snr: u16,
        ber: u32,
        uncorrected_blocks: u32,
    ) {
        self.monitor = MonitorSnapshot {
            status,
            strength,
            snr,
            ber,
            uncorrected_blocks,
        };
    }

    fn set<T: PartialEq>(field: &mut T, value: T, changed: &mut bool) {
        if *field != value {
            *field = value;
            *changed = true;
        }
    }

    /// Parse a stream request into the descriptor and the desired PID set.
    ///
    /// Tuning fields flag the device-data change only when a value actually
    /// differs, so re-sending the same request does not force a re-tune; PID
    /// edits flag the PID table only.
    pub fn parse_stream_string(
        &mut self,
        id: FeId,
        msg: &str,
        _method: &str,
    ) -> Result<(), RequestError> {
        let changed = &mut self.changed;
        let tuning = &mut self.tuning;
        for (key, value) in query_pairs(msg) {
            match key.as_str() {
                "msys" => {
                    let delsys = DeliverySystem::from_msys(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.delsys, delsys, changed);
                }
                "freq" => {
                    let mhz: f64 = value
                        .parse()
                        .map_err(|_| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.freq_khz, (mhz * 1000.0) as u32, changed);
                }
                "src" => {
                    let src: u8 = value
                        .parse()
                        .map_err(|_| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.src, src, changed);
                }
                "pol" => {
                    let pol = Polarization::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.polarization, pol, changed);
                }
                "ro" => {
                    let ro = RollOff::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.rolloff, ro, changed);
                }
                "mtype" => {
                    let mtype = Modulation::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.modulation, mtype, changed);
                }
                "plts" => {
                    let plts = Pilot::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.pilot, plts, changed);
                }
                "sr" => {
                    let ksym: u32 = value
                        .parse()
                        .map_err(|_| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.symbol_rate, ksym.saturating_mul(1000), changed);
                }
                "fec" => {
                    let fec = FecInner::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.fec, fec, changed);
                }
                "bw" => {
                    let bw = bandwidth_hz_from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.bandwidth_hz, bw, changed);
                }
                "tmode" => {
                    let tmode = TransmissionMode::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.transmission_mode, tmode, changed);
                }
                "gi" => {
                    let gi = GuardInterval::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.guard_interval, gi, changed);
                }
                "plp" => {
                    let plp: u8 = value
                        .parse()
                        .map_err(|_| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.plp_id, Some(plp), changed);
                }
                "specinv" => {
                    let inv = Inversion::from_token(value)
                        .ok_or_else(|| RequestError::invalid(&key, value))?;
                    Self::set(&mut tuning.inversion, inv, changed);
                }
                "pids" => match parse_pid_spec(&key, value)? {
                    PidSpec::All => self.pids.set_all_desired(),
                    PidSpec::None => self.pids.clear_desired(),
                    PidSpec::List(list) => {
                        let mut wanted = [false; MAX_PIDS];
                        for pid in list {
                            wanted[pid as usize] = true;
                        }
                        for pid in 0..MAX_PIDS as u16 {
                            self.pids.set_desired(pid, wanted[pid as usize]);
                        }
                    }
                },
                "addpids" => {
                    if let PidSpec::List(list) = parse_pid_spec(&key, value)? {
                        for pid in list {
                            self.pids.set_desired(pid, true);
                        }
                    }
                }
                "delpids" => {
                    if let PidSpec::List(list) = parse_pid_spec(&key, value)? {
                        for pid in list {
                            self.pids.set_desired(pid, false);
                        }
                    }
                }
                _ => debug!("Frontend: {id}, Ignoring request key '{key}'"),
            }
        }
        Ok(())
    }

    fn freq_mhz_string(&self) -> String {
        if self.tuning.freq_khz % 1000 == 0 {
            (self.tuning.freq_khz / 1000).to_string()
        } else {
            format!("{}", f64::from(self.tuning.freq_khz) / 1000.0)
        }
    }

    fn pids_string(&self) -> String {
        let desired = self.pids.desired_pids();
        if desired.len() == MAX_PIDS {
            "all".to_string()
        } else if desired.is_empty() {
            "none".to_string()
        } else {
            format_pid_list(&desired)
        }
    }

    /// Serialise the descriptor back into the request grammar. Parsing the
    /// result reproduces an equivalent descriptor and PID set.
    pub fn to_stream_string(&self) -> String {
        let t = &self.tuning;
        let mut out = format!("freq={}&msys={}", self.freq_mhz_string(), t.delsys.msys());
        if t.delsys.is_satellite() {
            out.push_str(&format!(
                "&src={}&pol={}&ro={}&mtype={}&plts={}&sr={}&fec={}",
                t.src,
                t.polarization.token(),
                t.rolloff.token(),
                t.modulation.token(),
                t.pilot.token(),
                t.symbol_rate / 1000,
                t.fec.token()
            ));
        } else if t.delsys.is_terrestrial() {
            out.push_str(&format!(
                "&bw={}&tmode={}&gi={}",
                bandwidth_token(t.bandwidth_hz),
                t.transmission_mode.token(),
                t.guard_interval.token()
            ));
            if let Some(plp) = t.plp_id {
                out.push_str(&format!("&plp={plp}"));
            }
        } else if t.delsys.is_cable() {
            out.push_str(&format!(
                "&mtype={}&sr={}&fec={}",
                t.modulation.token(),
                t.symbol_rate / 1000,
                t.fec.token()
            ));
        }
        out.push_str(&format!("&pids={}", self.pids_string()));
        out
    }

    /// The SAT>IP-style describe attribute for the current state.
    pub fn attribute_describe_string(&self, id: FeId) -> String {
        let t = &self.tuning;
        let m = &self.monitor;
        let lock = u8::from(m.status.has_lock());
        if t.delsys.is_terrestrial() {
            format!(
                "ver=1.1;tuner={},{},{},{},{},{},{},{},{},{};pids={}",
                id,
                m.strength,
                lock,
                m.snr,
                self.freq_mhz_string(),
                bandwidth_token(t.bandwidth_hz),
                t.delsys.msys(),
                t.transmission_mode.token(),
                t.modulation.token(),
                t.guard_interval.token(),
                self.pids_string()
            )
        } else if t.delsys.is_cable() {
            format!(
                "ver=1.2;tuner={},{},{},{},{},{},{},{};pids={}",
                id,
                m.strength,
                lock,
                m.snr,
                self.freq_mhz_string(),
                t.delsys.msys(),
                t.modulation.token(),
                t.symbol_rate / 1000,
                self.pids_string()
            )
        } else {
            format!(
                "ver=1.0;src={};tuner={},{},{},{},{},{},{},{},{},{},{},{};pids={}",
                t.src,
                id,
                m.strength,
                lock,
                m.snr,
                self.freq_mhz_string(),
                t.polarization.token(),
                t.delsys.msys(),
                t.modulation.token(),
                t.pilot.token(),
                t.rolloff.token(),
                t.symbol_rate / 1000,
                t.fec.token(),
                self.pids_string()
            )
        }
    }

    /// Account a full buffer of TS packets: per-PID counters, continuity
    /// errors, and PMT marking from PAT inspection.
    pub fn add_filter_data(&self, _id: FeId, buffer: &PacketBuffer) {
        for packet in buffer.ts_payload().chunks_exact(TS_PACKET_SIZE) {
            let Some(header) = TsHeader::parse(packet) else {
                continue;
            };
            self.pids
                .record_packet(header.pid, header.continuity_counter, header.has_payload);
            if header.pid == PAT_PID && header.payload_start && header.has_payload {
                for pmt_pid in mpegts::pat_pmt_pids(&packet[header.payload_offset..]) {
                    if !self.pids.is_pmt(pmt_pid) {
                        debug!("Frontend: {_id}, PID {pmt_pid} carries a PMT");
                        self.pids.mark_pmt(pmt_pid);
                    }
                }
            }
        }
    }
}
