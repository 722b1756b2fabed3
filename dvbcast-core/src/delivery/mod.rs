//! Delivery-system modules: each translates the tuning descriptor into the
//! device property sequence for its family and issues the tune.

pub mod diseqc;
pub mod dvbc;
pub mod dvbs;
pub mod dvbt;
pub mod lnb;

pub use diseqc::DiseqcSwitch;
pub use dvbc::Dvbc;
pub use dvbs::Dvbs;
pub use dvbt::Dvbt;
pub use lnb::Lnb;

use serde::{Deserialize, Serialize};

use crate::device::FrontendIo;
use crate::error::FrontendError;
use crate::tuning::{DeliverySystem, TuningDescriptor};

/// Capability-based polymorphism over the tuner families. The frontend
/// registers one module per family it supports and picks the first one whose
/// `is_capable_of` matches the requested system.
pub trait Delivery: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_capable_of(&self, system: DeliverySystem) -> bool;

    /// Apply the descriptor to the open frontend. Any property-set failure
    /// aborts the tune; DiSEqC problems are best-effort and only logged.
    fn tune(&self, fe: &dyn FrontendIo, data: &TuningDescriptor) -> Result<(), FrontendError>;

    fn settings(&self) -> DeliverySettings;

    fn apply_settings(&mut self, settings: &DeliverySettings);
}

/// Persisted per-module configuration (the extract/apply hook used by the
/// external settings store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySettings {
    /// Family name, e.g. "DVB-S".
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lnb: Option<Lnb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diseqc_repeats: Option<u8>,
}

impl DeliverySettings {
    pub fn kind_only(kind: &str) -> Self {
        DeliverySettings {
            kind: kind.to_string(),
            lnb: None,
            diseqc_repeats: None,
        }
    }
}
