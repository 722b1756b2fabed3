//! Satellite (DVB-S/S2) delivery module.

use log::{info, warn};

use super::{Delivery, DeliverySettings, DiseqcSwitch, Lnb};
use crate::device::{dtv, DtvProp, FeId, FrontendIo};
use crate::error::FrontendError;
use crate::tuning::{DeliverySystem, TuningDescriptor};

/// The frontend property sequence for a satellite tune. `if_khz` is the
/// LNB intermediate frequency; satellite frequencies are programmed in kHz.
pub fn property_sequence(data: &TuningDescriptor, if_khz: u32) -> Vec<DtvProp> {
    vec![
        DtvProp::new(dtv::CLEAR, 0),
        DtvProp::new(dtv::DELIVERY_SYSTEM, data.delsys.sys()),
        DtvProp::new(dtv::FREQUENCY, if_khz),
        DtvProp::new(dtv::MODULATION, data.modulation.dtv_value()),
        DtvProp::new(dtv::SYMBOL_RATE, data.symbol_rate),
        DtvProp::new(dtv::INNER_FEC, data.fec.dtv_value()),
        DtvProp::new(dtv::INVERSION, data.inversion.dtv_value()),
        DtvProp::new(dtv::ROLLOFF, data.rolloff.dtv_value()),
        DtvProp::new(dtv::PILOT, data.pilot.dtv_value()),
        DtvProp::new(dtv::TUNE, 0),
    ]
}

pub struct Dvbs {
    id: FeId,
    lnb: Lnb,
    diseqc: DiseqcSwitch,
}

impl Dvbs {
    pub fn new(id: FeId) -> Self {
        Dvbs {
            id,
            lnb: Lnb::default(),
            diseqc: DiseqcSwitch::default(),
        }
    }
}

impl Delivery for Dvbs {
    fn name(&self) -> &'static str {
        "DVB-S"
    }

    fn is_capable_of(&self, system: DeliverySystem) -> bool {
        system.is_satellite()
    }

    fn tune(&self, fe: &dyn FrontendIo, data: &TuningDescriptor) -> Result<(), FrontendError> {
        fe.clear_events();

        let (hiband, if_khz) = self.lnb.band_and_if(data.freq_khz);
        info!(
            "Frontend: {}, Satellite tune: freq {} kHz, {} band, IF {} kHz, src {}",
            self.id,
            data.freq_khz,
            if hiband { "high" } else { "low" },
            if_khz,
            data.src
        );

        // Best-effort: a misbehaving switch should not abort the tune.
        if let Err(e) = self
            .diseqc
            .send(fe, data.src, data.polarization, hiband)
        {
            warn!("Frontend: {}, DiSEqC sequence failed: {}", self.id, e);
        }

        fe.set_properties(&property_sequence(data, if_khz))
            .map_err(FrontendError::Tune)
    }

    fn settings(&self) -> DeliverySettings {
        DeliverySettings {
            kind: self.name().to_string(),
            lnb: Some(self.lnb),
            diseqc_repeats: Some(self.diseqc.repeats),
        }
    }

    fn apply_settings(&mut self, settings: &DeliverySettings) {
        if let Some(lnb) = settings.lnb {
            self.lnb = lnb;
        }
        if let Some(repeats) = settings.diseqc_repeats {
            self.diseqc.repeats = repeats;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFrontendIo;
    use crate::tuning::{FecInner, Modulation, Pilot, Polarization, RollOff};

    fn dvbs2_descriptor() -> TuningDescriptor {
        TuningDescriptor {
            delsys: DeliverySystem::DvbS2,
            freq_khz: 11_836_000,
            src: 1,
            polarization: Polarization::Horizontal,
            rolloff: RollOff::R35,
            pilot: Pilot::On,
            symbol_rate: 27_500_000,
            modulation: Modulation::Psk8,
            fec: FecInner::F23,
            ..TuningDescriptor::default()
        }
    }

    #[test]
    fn sequence_programs_s2_parameters() {
        let data = dvbs2_descriptor();
        let seq = property_sequence(&data, 1_236_000);

        assert_eq!(seq.first(), Some(&DtvProp::new(dtv::CLEAR, 0)));
        assert_eq!(seq.last(), Some(&DtvProp::new(dtv::TUNE, 0)));
        assert!(seq.contains(&DtvProp::new(dtv::DELIVERY_SYSTEM, 6))); // SYS_DVBS2
        assert!(seq.contains(&DtvProp::new(dtv::FREQUENCY, 1_236_000)));
        assert!(seq.contains(&DtvProp::new(dtv::MODULATION, 9))); // PSK_8
        assert!(seq.contains(&DtvProp::new(dtv::SYMBOL_RATE, 27_500_000)));
        assert!(seq.contains(&DtvProp::new(dtv::INNER_FEC, 2))); // FEC_2_3
    }

    #[test]
    fn tune_runs_diseqc_then_properties() {
        let fe = MockFrontendIo::new();
        let dvbs = Dvbs::new(FeId(0));
        dvbs.tune(&fe, &dvbs2_descriptor()).unwrap();

        let journal = fe.journal();
        // horizontal polarization selects 18V
        assert!(journal.contains(&"VOLTAGE 18".to_string()));
        // 11836 MHz is high band: tone on after the switch sequence
        assert!(journal.contains(&"TONE on".to_string()));
        let props_at = journal
            .iter()
            .position(|l| l.starts_with("SET_PROPS"))
            .unwrap();
        let tone_at = journal.iter().position(|l| l == "TONE on").unwrap();
        assert!(tone_at < props_at, "DiSEqC must finish before tuning");
    }

    #[test]
    fn diseqc_failure_does_not_abort_tune() {
        let fe = MockFrontendIo::new();
        fe.fail_diseqc_times(usize::MAX);
        let dvbs = Dvbs::new(FeId(0));
        dvbs.tune(&fe, &dvbs2_descriptor()).unwrap();
        assert!(fe
            .journal()
            .iter()
            .any(|line| line.starts_with("SET_PROPS")));
    }

    #[test]
    fn capability_covers_both_generations() {
        let dvbs = Dvbs::new(FeId(0));
        assert!(dvbs.is_capable_of(DeliverySystem::DvbS));
        assert!(dvbs.is_capable_of(DeliverySystem::DvbS2));
        assert!(!dvbs.is_capable_of(DeliverySystem::DvbT));
    }
}
