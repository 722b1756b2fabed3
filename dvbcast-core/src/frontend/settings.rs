//! The persisted per-frontend configuration: the extract/apply hook used by
//! the external settings store.

use serde::{Deserialize, Serialize};

use crate::delivery::DeliverySettings;
use crate::transform::TransformSettings;

/// Snapshot of one frontend's identity and mutable configuration.
///
/// The identity fields (`frontend_name`, `path_name`, the ranges) are
/// informational; `apply_settings` only honours the mutable subset, with the
/// same clamping the original store applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendSettings {
    #[serde(default)]
    pub frontend_name: String,
    #[serde(default)]
    pub path_name: String,
    #[serde(default)]
    pub frequency_range_hz: (u32, u32),
    #[serde(default)]
    pub symbol_rate_range: (u32, u32),
    /// Demux buffer size in MiB, 0..=180.
    pub dvr_buffer_mb: u32,
    /// Lock wait bound in milliseconds, 0..=3500.
    pub wait_on_lock_timeout_ms: u64,
    #[serde(default)]
    pub transform: TransformSettings,
    #[serde(default)]
    pub delivery_systems: Vec<DeliverySettings>,
}

impl Default for FrontendSettings {
    fn default() -> Self {
        FrontendSettings {
            frontend_name: String::new(),
            path_name: String::new(),
            frequency_range_hz: (0, 0),
            symbol_rate_range: (0, 0),
            dvr_buffer_mb: super::DEFAULT_DVR_BUFFER_MB,
            wait_on_lock_timeout_ms: super::DEFAULT_WAIT_ON_LOCK_TIMEOUT.as_millis() as u64,
            transform: TransformSettings::default(),
            delivery_systems: Vec::new(),
        }
    }
}
