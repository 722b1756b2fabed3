//! Stub driver for targets without the Linux DVB API.

use std::io;
use std::path::Path;

use super::{DemuxIo, DvbDriver, FrontendIo};

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "DVB devices are only available on Linux",
    )
}

/// Driver that fails every open; lets the rest of the crate build and run
/// (enumeration finds nothing) on non-Linux targets.
pub struct UnsupportedDriver;

impl DvbDriver for UnsupportedDriver {
    fn open_frontend(&self, _path: &Path, _readonly: bool) -> io::Result<Box<dyn FrontendIo>> {
        Err(unsupported())
    }

    fn open_demux(&self, _path: &Path) -> io::Result<Box<dyn DemuxIo>> {
        Err(unsupported())
    }
}
