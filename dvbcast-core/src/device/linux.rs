//! Linux implementation of the device traits: non-blocking character-device
//! fds plus the frontend/demux ioctls.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use log::{debug, warn};

use super::api;
use super::{
    DemuxIo, DtvProp, DvbDriver, FeStatus, FeType, FrontendInfo, FrontendIo, MiniBurst,
    ScaledStat, SecVoltage, SignalStats, StatScale,
};
use crate::tuning::DeliverySystem;

/// Owned file descriptor, closed on drop.
struct Fd(RawFd);

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

fn open_nonblock(path: &Path, flags: libc::c_int) -> io::Result<Fd> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let fd = unsafe { libc::open(cpath.as_ptr(), flags | libc::O_NONBLOCK) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(Fd(fd))
}

/// `ioctl` with a pointer argument.
unsafe fn ioctl_ptr<T>(fd: RawFd, request: u64, arg: *mut T) -> io::Result<()> {
    if libc::ioctl(fd, request as libc::c_ulong, arg) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `ioctl` with an integer argument passed by value.
fn ioctl_int(fd: RawFd, request: u64, arg: libc::c_ulong) -> io::Result<()> {
    if unsafe { libc::ioctl(fd, request as libc::c_ulong, arg) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn scaled_stat(stats: &api::DtvFeStats) -> ScaledStat {
    if stats.len == 0 {
        return ScaledStat::NOT_AVAILABLE;
    }
    let sample = stats.stat[0];
    let scale = match sample.scale {
        api::FE_SCALE_DECIBEL => StatScale::Decibel,
        api::FE_SCALE_RELATIVE => StatScale::Relative,
        api::FE_SCALE_COUNTER => StatScale::Counter,
        _ => StatScale::NotAvailable,
    };
    ScaledStat {
        scale,
        value: sample.value,
    }
}

pub struct LinuxFrontend {
    fd: Fd,
}

impl LinuxFrontend {
    fn get_properties(&self, props: &mut [api::DtvProperty]) -> io::Result<()> {
        let mut cmdseq = api::DtvProperties {
            num: props.len() as u32,
            props: props.as_mut_ptr(),
        };
        unsafe { ioctl_ptr(self.fd.0, api::FE_GET_PROPERTY, &mut cmdseq) }
    }
}

impl FrontendIo for LinuxFrontend {
    fn get_info(&self) -> io::Result<FrontendInfo> {
        let mut raw = unsafe { std::mem::zeroed::<api::DvbFrontendInfo>() };
        unsafe { ioctl_ptr(self.fd.0, api::FE_GET_INFO, &mut raw)? };
        let name_bytes: Vec<u8> = raw
            .name
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        Ok(FrontendInfo {
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
            frequency_min: raw.frequency_min,
            frequency_max: raw.frequency_max,
            symbol_rate_min: raw.symbol_rate_min,
            symbol_rate_max: raw.symbol_rate_max,
            caps: raw.caps,
            fe_type: FeType::from_raw(raw.fe_type),
            delivery_systems: Vec::new(),
        })
    }

    fn enum_delivery_systems(&self) -> io::Result<Vec<DeliverySystem>> {
        let mut props = [api::DtvProperty::data(
            super::dtv::ENUM_DELSYS,
            api::DTV_UNDEFINED,
        )];
        self.get_properties(&mut props)?;
        let buffer = unsafe { props[0].u.buffer };
        let len = (buffer.len as usize).min(buffer.data.len());
        let mut systems = Vec::new();
        for &raw in &buffer.data[..len] {
            match DeliverySystem::from_sys(raw as u32) {
                Some(sys) => systems.push(sys),
                None => debug!("Skipping unsupported delivery system value {raw}"),
            }
        }
        Ok(systems)
    }

    fn set_properties(&self, props: &[DtvProp]) -> io::Result<()> {
        let mut cells: Vec<api::DtvProperty> = props
            .iter()
            .map(|p| api::DtvProperty::data(p.cmd, p.value))
            .collect();
        let mut cmdseq = api::DtvProperties {
            num: cells.len() as u32,
            props: cells.as_mut_ptr(),
        };
        unsafe { ioctl_ptr(self.fd.0, api::FE_SET_PROPERTY, &mut cmdseq) }
    }

    fn read_status(&self) -> io::Result<FeStatus> {
        let mut status: u32 = 0;
        unsafe { ioctl_ptr(self.fd.0, api::FE_READ_STATUS, &mut status)? };
        Ok(FeStatus(status))
    }

    fn read_signal_stats(&self) -> io::Result<SignalStats> {
        let mut props = [
            api::DtvProperty::data(super::dtv::STAT_SIGNAL_STRENGTH, api::DTV_UNDEFINED),
            api::DtvProperty::data(super::dtv::STAT_CNR, api::DTV_UNDEFINED),
            api::DtvProperty::data(super::dtv::STAT_ERROR_BLOCK_COUNT, api::DTV_UNDEFINED),
        ];
        self.get_properties(&mut props)?;
        let stats = unsafe {
            SignalStats {
                strength: scaled_stat(&{ props[0].u.st }),
                cnr: scaled_stat(&{ props[1].u.st }),
                error_blocks: scaled_stat(&{ props[2].u.st }),
            }
        };
        Ok(stats)
    }

    fn read_signal_strength(&self) -> io::Result<u16> {
        let mut value: u16 = 0;
        unsafe { ioctl_ptr(self.fd.0, api::FE_READ_SIGNAL_STRENGTH, &mut value)? };
        Ok(value)
    }

    fn read_snr(&self) -> io::Result<u16> {
        let mut value: u16 = 0;
        unsafe { ioctl_ptr(self.fd.0, api::FE_READ_SNR, &mut value)? };
        Ok(value)
    }

    fn read_ber(&self) -> io::Result<u32> {
        let mut value: u32 = 0;
        unsafe { ioctl_ptr(self.fd.0, api::FE_READ_BER, &mut value)? };
        Ok(value)
    }

    fn read_uncorrected_blocks(&self) -> io::Result<u32> {
        let mut value: u32 = 0;
        unsafe { ioctl_ptr(self.fd.0, api::FE_READ_UNCORRECTED_BLOCKS, &mut value)? };
        Ok(value)
    }

    fn set_tone(&self, on: bool) -> io::Result<()> {
        let arg = if on { api::SEC_TONE_ON } else { api::SEC_TONE_OFF };
        ioctl_int(self.fd.0, api::FE_SET_TONE, arg as libc::c_ulong)
    }

    fn set_voltage(&self, voltage: SecVoltage) -> io::Result<()> {
        let arg = match voltage {
            SecVoltage::V13 => api::SEC_VOLTAGE_13,
            SecVoltage::V18 => api::SEC_VOLTAGE_18,
            SecVoltage::Off => api::SEC_VOLTAGE_OFF,
        };
        ioctl_int(self.fd.0, api::FE_SET_VOLTAGE, arg as libc::c_ulong)
    }

    fn diseqc_send_master_cmd(&self, msg: &[u8]) -> io::Result<()> {
        let mut cmd = api::DvbDiseqcMasterCmd {
            msg: [0; 6],
            msg_len: msg.len().min(6) as u8,
        };
        cmd.msg[..msg.len().min(6)].copy_from_slice(&msg[..msg.len().min(6)]);
        unsafe { ioctl_ptr(self.fd.0, api::FE_DISEQC_SEND_MASTER_CMD, &mut cmd) }
    }

    fn diseqc_send_burst(&self, burst: MiniBurst) -> io::Result<()> {
        let arg = match burst {
            MiniBurst::A => api::SEC_MINI_A,
            MiniBurst::B => api::SEC_MINI_B,
        };
        ioctl_int(self.fd.0, api::FE_DISEQC_SEND_BURST, arg as libc::c_ulong)
    }

    fn clear_events(&self) {
        // Drain whatever is queued; bounded in case the device misbehaves.
        for _ in 0..8 {
            let mut event = unsafe { std::mem::zeroed::<api::DvbFrontendEvent>() };
            if unsafe { ioctl_ptr(self.fd.0, api::FE_GET_EVENT, &mut event) }.is_err() {
                break;
            }
        }
    }
}

pub struct LinuxDemux {
    fd: Fd,
}

impl DemuxIo for LinuxDemux {
    fn set_buffer_size(&self, bytes: u64) -> io::Result<()> {
        ioctl_int(self.fd.0, api::DMX_SET_BUFFER_SIZE, bytes as libc::c_ulong)
    }

    fn set_pes_filter(&self, pid: u16) -> io::Result<()> {
        let mut params = api::DmxPesFilterParams {
            pid,
            input: api::DMX_IN_FRONTEND,
            output: api::DMX_OUT_TSDEMUX_TAP,
            pes_type: api::DMX_PES_OTHER,
            flags: api::DMX_IMMEDIATE_START,
        };
        unsafe { ioctl_ptr(self.fd.0, api::DMX_SET_PES_FILTER, &mut params) }
    }

    fn add_pid(&self, pid: u16) -> io::Result<()> {
        let mut pid = pid;
        unsafe { ioctl_ptr(self.fd.0, api::DMX_ADD_PID, &mut pid) }
    }

    fn remove_pid(&self, pid: u16) -> io::Result<()> {
        let mut pid = pid;
        unsafe { ioctl_ptr(self.fd.0, api::DMX_REMOVE_PID, &mut pid) }
    }

    fn set_source(&self, source: u32) -> io::Result<()> {
        let mut source = source;
        unsafe { ioctl_ptr(self.fd.0, api::DMX_SET_SOURCE, &mut source) }
    }

    fn poll_readable(&self, timeout_ms: i32) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd.0,
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret > 0 && (pfd.revents & libc::POLLIN) != 0)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe { libc::read(self.fd.0, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(ret as usize)
    }
}

/// Driver opening the real `/dev/dvb` character devices.
pub struct LinuxDriver;

impl DvbDriver for LinuxDriver {
    fn open_frontend(&self, path: &Path, readonly: bool) -> io::Result<Box<dyn FrontendIo>> {
        let flags = if readonly {
            libc::O_RDONLY
        } else {
            libc::O_RDWR
        };
        let fd = open_nonblock(path, flags)?;
        debug!("Opened frontend {} fd: {}", path.display(), fd.0);
        Ok(Box::new(LinuxFrontend { fd }))
    }

    fn open_demux(&self, path: &Path) -> io::Result<Box<dyn DemuxIo>> {
        let fd = match open_nonblock(path, libc::O_RDWR) {
            Ok(fd) => fd,
            Err(e) => {
                warn!("Failed to open demux {}: {}", path.display(), e);
                return Err(e);
            }
        };
        debug!("Opened demux {} fd: {}", path.display(), fd.0);
        Ok(Box::new(LinuxDemux { fd }))
    }
}
