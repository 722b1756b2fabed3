//! Terrestrial (DVB-T/T2) delivery module.

use log::info;

use super::{Delivery, DeliverySettings};
use crate::device::{dtv, DtvProp, FeId, FrontendIo};
use crate::error::FrontendError;
use crate::tuning::{DeliverySystem, FecInner, TuningDescriptor};

/// The frontend property sequence for a terrestrial tune. Terrestrial
/// frequencies are programmed in Hz.
pub fn property_sequence(data: &TuningDescriptor) -> Vec<DtvProp> {
    let mut seq = vec![
        DtvProp::new(dtv::CLEAR, 0),
        DtvProp::new(dtv::DELIVERY_SYSTEM, data.delsys.sys()),
        DtvProp::new(dtv::FREQUENCY, data.freq_khz.saturating_mul(1000)),
        DtvProp::new(dtv::MODULATION, data.modulation.dtv_value()),
        DtvProp::new(dtv::BANDWIDTH_HZ, data.bandwidth_hz),
        DtvProp::new(dtv::CODE_RATE_HP, data.fec.dtv_value()),
        DtvProp::new(dtv::CODE_RATE_LP, FecInner::Auto.dtv_value()),
        DtvProp::new(dtv::TRANSMISSION_MODE, data.transmission_mode.dtv_value()),
        DtvProp::new(dtv::GUARD_INTERVAL, data.guard_interval.dtv_value()),
        DtvProp::new(dtv::HIERARCHY, data.hierarchy.dtv_value()),
        DtvProp::new(dtv::INVERSION, data.inversion.dtv_value()),
    ];
    if data.delsys == DeliverySystem::DvbT2 {
        if let Some(plp) = data.plp_id {
            seq.push(DtvProp::new(dtv::STREAM_ID, u32::from(plp)));
        }
    }
    seq.push(DtvProp::new(dtv::TUNE, 0));
    seq
}

pub struct Dvbt {
    id: FeId,
}

impl Dvbt {
    pub fn new(id: FeId) -> Self {
        Dvbt { id }
    }
}

impl Delivery for Dvbt {
    fn name(&self) -> &'static str {
        "DVB-T"
    }

    fn is_capable_of(&self, system: DeliverySystem) -> bool {
        system.is_terrestrial()
    }

    fn tune(&self, fe: &dyn FrontendIo, data: &TuningDescriptor) -> Result<(), FrontendError> {
        fe.clear_events();
        info!(
            "Frontend: {}, Terrestrial tune: freq {} kHz, bandwidth {} Hz",
            self.id, data.freq_khz, data.bandwidth_hz
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
    use crate::tuning::{GuardInterval, Modulation, TransmissionMode};

    #[test]
    fn sequence_programs_ofdm_parameters() {
        let data = TuningDescriptor {
            delsys: DeliverySystem::DvbT,
            freq_khz: 474_000,
            bandwidth_hz: 8_000_000,
            transmission_mode: TransmissionMode::M8k,
            guard_interval: GuardInterval::G18,
            modulation: Modulation::Qam64,
            ..TuningDescriptor::default()
        };
        let seq = property_sequence(&data);
        assert!(seq.contains(&DtvProp::new(dtv::DELIVERY_SYSTEM, 3))); // SYS_DVBT
        assert!(seq.contains(&DtvProp::new(dtv::FREQUENCY, 474_000_000)));
        assert!(seq.contains(&DtvProp::new(dtv::BANDWIDTH_HZ, 8_000_000)));
        assert!(seq.contains(&DtvProp::new(dtv::TRANSMISSION_MODE, 1)));
        assert!(seq.contains(&DtvProp::new(dtv::GUARD_INTERVAL, 2)));
        assert!(!seq.iter().any(|p| p.cmd == dtv::STREAM_ID));
        assert_eq!(seq.last(), Some(&DtvProp::new(dtv::TUNE, 0)));
    }

    #[test]
    fn t2_sequence_carries_the_plp() {
        let data = TuningDescriptor {
            delsys: DeliverySystem::DvbT2,
            freq_khz: 490_000,
            plp_id: Some(3),
            ..TuningDescriptor::default()
        };
        let seq = property_sequence(&data);
        assert!(seq.contains(&DtvProp::new(dtv::STREAM_ID, 3)));
        // STREAM_ID must precede TUNE
        let stream_at = seq.iter().position(|p| p.cmd == dtv::STREAM_ID).unwrap();
        assert_eq!(stream_at, seq.len() - 2);
    }
}
