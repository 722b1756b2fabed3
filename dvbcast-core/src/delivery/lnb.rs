//! Universal LNB band selection and intermediate-frequency computation.

use serde::{Deserialize, Serialize};

/// Universal LNB local-oscillator configuration, frequencies in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lnb {
    /// Low-band local oscillator.
    pub lof1_khz: u32,
    /// High-band local oscillator.
    pub lof2_khz: u32,
    /// Band switch frequency; at or above this the 22 kHz tone selects the
    /// high band.
    pub switch_khz: u32,
}

impl Default for Lnb {
    fn default() -> Self {
        Lnb {
            lof1_khz: 9_750_000,
            lof2_khz: 10_600_000,
            switch_khz: 11_700_000,
        }
    }
}

impl Lnb {
    /// Select the band for a transponder frequency and compute the
    /// intermediate frequency the tuner actually sees.
    ///
    /// Returns `(hiband, if_khz)`. C-band LNBs have the oscillator above the
    /// downlink, hence the absolute difference.
    pub fn band_and_if(&self, freq_khz: u32) -> (bool, u32) {
        if freq_khz >= self.switch_khz {
            (true, freq_khz.abs_diff(self.lof2_khz))
        } else {
            (false, freq_khz.abs_diff(self.lof1_khz))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_lnb_band_selection() {
        let lnb = Lnb::default();

        // 11836 MHz is above the switch point: high band, IF = f - 10600 MHz.
        let (hiband, if_khz) = lnb.band_and_if(11_836_000);
        assert!(hiband);
        assert_eq!(if_khz, 1_236_000);

        // 10744 MHz is low band, IF = f - 9750 MHz.
        let (hiband, if_khz) = lnb.band_and_if(10_744_000);
        assert!(!hiband);
        assert_eq!(if_khz, 994_000);
    }

    #[test]
    fn c_band_oscillator_above_downlink() {
        let lnb = Lnb {
            lof1_khz: 5_150_000,
            lof2_khz: 5_150_000,
            switch_khz: u32::MAX,
        };
        let (hiband, if_khz) = lnb.band_and_if(3_840_000);
        assert!(!hiband);
        assert_eq!(if_khz, 1_310_000);
    }
}
