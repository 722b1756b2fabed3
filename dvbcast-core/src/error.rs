//! Error types for the tuner pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::tuning::DeliverySystem;

/// Errors raised by the frontend controller and the device layer.
#[derive(Error, Debug)]
pub enum FrontendError {
    /// The frontend character device could not be opened.
    #[error("Failed to open frontend device {path:?}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The frontend reports no delivery system this build knows about.
    #[error("Frontend does not have any known delivery systems")]
    NoDeliverySystems,

    /// No registered delivery-system module can drive the requested system.
    #[error("No delivery system capable of {0}")]
    NoCapableDeliverySystem(DeliverySystem),

    /// A property-set or DiSEqC ioctl failed while tuning.
    #[error("Tuning failed: {0}")]
    Tune(#[source] io::Error),

    /// Any other device I/O error.
    #[error("Device error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while parsing a client stream request string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// A key carried a value that does not parse.
    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    /// A PID outside 0..8192 was requested.
    #[error("PID out of range: {0}")]
    PidOutOfRange(u32),
}

impl RequestError {
    pub(crate) fn invalid(key: &str, value: &str) -> Self {
        RequestError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Errors raised by the streaming output variants.
#[derive(Error, Debug)]
pub enum StreamError {
    /// UDP socket creation or configuration failed.
    #[error("Socket setup failed: {0}")]
    Socket(#[source] io::Error),

    /// The TS output file could not be opened.
    #[error("Failed to open output file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The worker thread could not be spawned.
    #[error("Failed to start streaming thread: {0}")]
    Thread(#[source] io::Error),
}
