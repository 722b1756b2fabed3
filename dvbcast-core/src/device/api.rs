//! Hand-declared subset of the Linux DVB API (frontend.h / dmx.h): ioctl
//! request numbers and the `#[repr(C)]` structures they exchange.

#![allow(dead_code)]

use std::mem::size_of;

use libc::{c_char, c_void};

// ioctl request encoding (asm-generic/ioctl.h).
const IOC_NONE: u64 = 0;
const IOC_WRITE: u64 = 1;
const IOC_READ: u64 = 2;

const IOC_NRSHIFT: u64 = 0;
const IOC_TYPESHIFT: u64 = 8;
const IOC_SIZESHIFT: u64 = 16;
const IOC_DIRSHIFT: u64 = 30;

const fn ioc(dir: u64, ty: u8, nr: u8, size: usize) -> u64 {
    (dir << IOC_DIRSHIFT)
        | ((ty as u64) << IOC_TYPESHIFT)
        | ((nr as u64) << IOC_NRSHIFT)
        | ((size as u64) << IOC_SIZESHIFT)
}

const fn io(ty: u8, nr: u8) -> u64 {
    ioc(IOC_NONE, ty, nr, 0)
}

const fn ior<T>(ty: u8, nr: u8) -> u64 {
    ioc(IOC_READ, ty, nr, size_of::<T>())
}

const fn iow<T>(ty: u8, nr: u8) -> u64 {
    ioc(IOC_WRITE, ty, nr, size_of::<T>())
}

// Frontend ioctls ('o').
pub const FE_GET_INFO: u64 = ior::<DvbFrontendInfo>(b'o', 61);
pub const FE_DISEQC_SEND_MASTER_CMD: u64 = iow::<DvbDiseqcMasterCmd>(b'o', 63);
pub const FE_DISEQC_SEND_BURST: u64 = io(b'o', 65);
pub const FE_SET_TONE: u64 = io(b'o', 66);
pub const FE_SET_VOLTAGE: u64 = io(b'o', 67);
pub const FE_READ_STATUS: u64 = ior::<u32>(b'o', 69);
pub const FE_READ_BER: u64 = ior::<u32>(b'o', 70);
pub const FE_READ_SIGNAL_STRENGTH: u64 = ior::<u16>(b'o', 71);
pub const FE_READ_SNR: u64 = ior::<u16>(b'o', 72);
pub const FE_READ_UNCORRECTED_BLOCKS: u64 = ior::<u32>(b'o', 73);
pub const FE_GET_EVENT: u64 = ior::<DvbFrontendEvent>(b'o', 78);
pub const FE_SET_PROPERTY: u64 = iow::<DtvProperties>(b'o', 82);
pub const FE_GET_PROPERTY: u64 = ior::<DtvProperties>(b'o', 83);

// Demux ioctls ('o').
pub const DMX_SET_PES_FILTER: u64 = iow::<DmxPesFilterParams>(b'o', 44);
pub const DMX_SET_BUFFER_SIZE: u64 = io(b'o', 45);
pub const DMX_SET_SOURCE: u64 = iow::<u32>(b'o', 49);
pub const DMX_ADD_PID: u64 = iow::<u16>(b'o', 51);
pub const DMX_REMOVE_PID: u64 = iow::<u16>(b'o', 52);

// fe_sec_voltage_t / fe_sec_tone_mode_t / fe_sec_mini_cmd_t.
pub const SEC_VOLTAGE_13: i32 = 0;
pub const SEC_VOLTAGE_18: i32 = 1;
pub const SEC_VOLTAGE_OFF: i32 = 2;
pub const SEC_TONE_ON: i32 = 0;
pub const SEC_TONE_OFF: i32 = 1;
pub const SEC_MINI_A: i32 = 0;
pub const SEC_MINI_B: i32 = 1;

// fecap_scale_params.
pub const FE_SCALE_NOT_AVAILABLE: u8 = 0;
pub const FE_SCALE_DECIBEL: u8 = 1;
pub const FE_SCALE_RELATIVE: u8 = 2;
pub const FE_SCALE_COUNTER: u8 = 3;

// dmx_pes_filter_params fields.
pub const DMX_IN_FRONTEND: u32 = 0;
pub const DMX_OUT_TSDEMUX_TAP: u32 = 3;
pub const DMX_PES_OTHER: u32 = 20;
pub const DMX_IMMEDIATE_START: u32 = 4;

pub const DTV_UNDEFINED: u32 = 0;

#[repr(C)]
pub struct DvbFrontendInfo {
    pub name: [c_char; 128],
    pub fe_type: u32,
    pub frequency_min: u32,
    pub frequency_max: u32,
    pub frequency_stepsize: u32,
    pub frequency_tolerance: u32,
    pub symbol_rate_min: u32,
    pub symbol_rate_max: u32,
    pub symbol_rate_tolerance: u32,
    pub notifier_delay: u32,
    pub caps: u32,
}

#[repr(C)]
pub struct DvbDiseqcMasterCmd {
    pub msg: [u8; 6],
    pub msg_len: u8,
}

/// dvb_frontend_event: status plus the legacy parameter block, which this
/// code never inspects (largest union arm is the 7-word OFDM variant).
#[repr(C)]
pub struct DvbFrontendEvent {
    pub status: u32,
    pub parameters: [u8; 36],
}

#[repr(C)]
pub struct DmxPesFilterParams {
    pub pid: u16,
    pub input: u32,
    pub output: u32,
    pub pes_type: u32,
    pub flags: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DtvStats {
    pub scale: u8,
    /// Union of `u64 uvalue` / `s64 svalue`; stored signed, reinterpreted by
    /// the reader according to `scale`.
    pub value: i64,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DtvFeStats {
    pub len: u8,
    pub stat: [DtvStats; 4],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DtvBuffer {
    pub data: [u8; 32],
    pub len: u32,
    pub reserved1: [u32; 3],
    pub reserved2: *mut c_void,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub union DtvPropertyData {
    pub data: u32,
    pub st: DtvFeStats,
    pub buffer: DtvBuffer,
}

#[repr(C, packed)]
pub struct DtvProperty {
    pub cmd: u32,
    pub reserved: [u32; 3],
    pub u: DtvPropertyData,
    pub result: i32,
}

impl DtvProperty {
    /// A property cell carrying a plain `u32` payload.
    pub fn data(cmd: u32, value: u32) -> Self {
        let mut u = unsafe { std::mem::zeroed::<DtvPropertyData>() };
        u.data = value;
        DtvProperty {
            cmd,
            reserved: [0; 3],
            u,
            result: 0,
        }
    }
}

#[repr(C)]
pub struct DtvProperties {
    pub num: u32,
    pub props: *mut DtvProperty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_kernel_headers() {
        // Spot checks against the values the kernel headers expand to.
        assert_eq!(FE_SET_TONE, 0x6f42);
        assert_eq!(FE_SET_VOLTAGE, 0x6f43);
        assert_eq!(FE_DISEQC_SEND_BURST, 0x6f41);
        assert_eq!(FE_READ_STATUS, 0x8004_6f45);
        assert_eq!(FE_READ_SIGNAL_STRENGTH, 0x8002_6f47);
        assert_eq!(DMX_ADD_PID, 0x4002_6f33);
        assert_eq!(DMX_REMOVE_PID, 0x4002_6f34);
        assert_eq!(DMX_SET_BUFFER_SIZE, 0x6f2d);
    }

    #[test]
    fn property_cell_is_packed() {
        // 4 (cmd) + 12 (reserved) + 56 (union) + 4 (result)
        assert_eq!(std::mem::size_of::<DtvProperty>(), 76);
        let p = DtvProperty::data(17, 6);
        assert_eq!({ p.cmd }, 17);
        assert_eq!(unsafe { p.u.data }, 6);
    }
}
