//! Cable (DVB-C) delivery module.

use log::info;

use super::{Delivery, DeliverySettings};
use crate::device::{dtv, DtvProp, FeId, FrontendIo};
use crate::error::FrontendError;
use crate::tuning::{DeliverySystem, TuningDescriptor};

/// The frontend property sequence for a cable tune, frequency in Hz.
pub fn property_sequence(data: &TuningDescriptor) -> Vec<DtvProp> {
    vec![
        DtvProp::new(dtv::CLEAR, 0),
        DtvProp::new(dtv::DELIVERY_SYSTEM, data.delsys.sys()),
        DtvProp::new(dtv::FREQUENCY, data.freq_khz.saturating_mul(1000)),
        DtvProp::new(dtv::MODULATION, data.modulation.dtv_value()),
        DtvProp::new(dtv::SYMBOL_RATE, data.symbol_rate),
        DtvProp::new(dtv::INNER_FEC, data.fec.dtv_value()),
        DtvProp::new(dtv::INVERSION, data.inversion.dtv_value()),
        DtvProp::new(dtv::TUNE, 0),
    ]
}

pub struct Dvbc {
    id: FeId,
}

impl Dvbc {
    pub fn new(id: FeId) -> Self {
        Dvbc { id }
    }
}

impl Delivery for Dvbc {
    fn name(&self) -> &'static str {
        "DVB-C"
    }

    fn is_capable_of(&self, system: DeliverySystem) -> bool {
        system.is_cable()
    }

    fn tune(&self, fe: &dyn FrontendIo, data: &TuningDescriptor) -> Result<(), FrontendError> {
        fe.clear_events();
        info!(
            "Frontend: {}, Cable tune: freq {} kHz, symbol rate {}",
            self.id, data.freq_khz, data.symbol_rate
        );
        fe.set_properties(&property_sequence(data))
            .map_err(FrontendError::Tune)
    }

    fn settings(&self) -> DeliverySettings {
        DeliverySettings::kind_only(self.name())
    }

    fn apply_settings(&mut self, _settings: &DeliverySettings) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::{FecInner, Modulation};

    #[test]
    fn sequence_programs_qam_parameters() {
        let data = TuningDescriptor {
            delsys: DeliverySystem::DvbCAnnexA,
            freq_khz: 346_000,
            symbol_rate: 6_900_000,
            modulation: Modulation::Qam256,
            fec: FecInner::Auto,
            ..TuningDescriptor::default()
        };
        let seq = property_sequence(&data);
        assert!(seq.contains(&DtvProp::new(dtv::DELIVERY_SYSTEM, 1))); // Annex A
        assert!(seq.contains(&DtvProp::new(dtv::FREQUENCY, 346_000_000)));
        assert!(seq.contains(&DtvProp::new(dtv::SYMBOL_RATE, 6_900_000)));
        assert!(seq.contains(&DtvProp::new(dtv::MODULATION, 5))); // QAM_256
        assert_eq!(seq.len(), 8);
    }

    #[test]
    fn capability_covers_all_annexes() {
        let dvbc = Dvbc::new(FeId(0));
        assert!(dvbc.is_capable_of(DeliverySystem::DvbCAnnexA));
        assert!(dvbc.is_capable_of(DeliverySystem::DvbCAnnexB));
        assert!(dvbc.is_capable_of(DeliverySystem::DvbCAnnexC));
        assert!(!dvbc.is_capable_of(DeliverySystem::DvbS2));
    }
}
