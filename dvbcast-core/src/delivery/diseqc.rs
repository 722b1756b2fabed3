//! DiSEqC 1.0 committed-switch driver.
//!
//! The 15 ms gaps between steps are part of the bus timing contract, not a
//! convenience.

use std::io;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::device::{FrontendIo, MiniBurst, SecVoltage};
use crate::tuning::Polarization;

const BUS_SETTLE: Duration = Duration::from_millis(15);

/// Framing byte: master command, no reply expected, first transmission.
const FRAMING_MASTER: u8 = 0xE0;
/// Address: any LNB/switcher.
const ADDRESS_LNB: u8 = 0x10;
/// Command: write to port group 0 (committed switches).
const CMD_WRITE_N0: u8 = 0x38;

/// Committed-switch driver for one frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseqcSwitch {
    /// How often to retry the switch message on a transient bus error.
    pub repeats: u8,
}

impl Default for DiseqcSwitch {
    fn default() -> Self {
        DiseqcSwitch { repeats: 2 }
    }
}

impl DiseqcSwitch {
    /// The committed-switch message for a source, polarization and band.
    ///
    /// Data nibble: bits 3..2 select the port, bit 1 the polarization
    /// (18V = H/L), bit 0 the band (1 = high).
    pub fn switch_message(src: u8, polarization: Polarization, hiband: bool) -> [u8; 6] {
        let port = src.saturating_sub(1) & 0x03;
        let data = 0xF0
            | (port << 2)
            | if polarization.is_high_voltage() { 2 } else { 0 }
            | u8::from(hiband);
        [FRAMING_MASTER, ADDRESS_LNB, CMD_WRITE_N0, data, 0x00, 0x00]
    }

    /// Run the full switch sequence: tone off, select voltage, switch
    /// message, tone burst, then the band tone.
    pub fn send(
        &self,
        fe: &dyn FrontendIo,
        src: u8,
        polarization: Polarization,
        hiband: bool,
    ) -> io::Result<()> {
        let message = Self::switch_message(src, polarization, hiband);
        let port = src.saturating_sub(1) & 0x03;
        debug!(
            "Sending DiSEqC committed switch: port {port} data 0x{:02X}",
            message[3]
        );

        fe.set_tone(false)?;
        let voltage = if polarization.is_high_voltage() {
            SecVoltage::V18
        } else {
            SecVoltage::V13
        };
        fe.set_voltage(voltage)?;
        thread::sleep(BUS_SETTLE);

        let mut attempt = 0;
        loop {
            match fe.diseqc_send_master_cmd(&message[..4]) {
                Ok(()) => break,
                Err(e) if attempt < self.repeats => {
                    attempt += 1;
                    warn!("DiSEqC message failed (attempt {attempt}): {e}");
                    thread::sleep(BUS_SETTLE);
                }
                Err(e) => return Err(e),
            }
        }
        thread::sleep(BUS_SETTLE);

        let burst = if port & 0x01 == 0x01 {
            MiniBurst::B
        } else {
            MiniBurst::A
        };
        fe.diseqc_send_burst(burst)?;
        thread::sleep(BUS_SETTLE);

        fe.set_tone(hiband)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFrontendIo;

    #[test]
    fn switch_message_encoding() {
        // src 1, horizontal, high band: port 0, 18V bit, band bit.
        assert_eq!(
            DiseqcSwitch::switch_message(1, Polarization::Horizontal, true),
            [0xE0, 0x10, 0x38, 0xF3, 0x00, 0x00]
        );
        // src 2, vertical, low band: port 1.
        assert_eq!(
            DiseqcSwitch::switch_message(2, Polarization::Vertical, false),
            [0xE0, 0x10, 0x38, 0xF4, 0x00, 0x00]
        );
        // src 0 is treated as the first port.
        assert_eq!(
            DiseqcSwitch::switch_message(0, Polarization::Vertical, false)[3],
            0xF0
        );
    }

    #[test]
    fn sequence_ordering_and_burst_selection() {
        let fe = MockFrontendIo::new();
        DiseqcSwitch::default()
            .send(&fe, 2, Polarization::Horizontal, true)
            .unwrap();
        assert_eq!(
            fe.journal(),
            vec![
                "TONE off",
                "VOLTAGE 18",
                "DISEQC_MSG e0 10 38 f7",
                "BURST B",
                "TONE on",
            ]
        );
    }

    #[test]
    fn message_retries_on_transient_errors() {
        let fe = MockFrontendIo::new();
        fe.fail_diseqc_times(1);
        DiseqcSwitch::default()
            .send(&fe, 1, Polarization::Vertical, false)
            .unwrap();
        let journal = fe.journal();
        let sends = journal
            .iter()
            .filter(|line| line.starts_with("DISEQC_MSG"))
            .count();
        assert_eq!(sends, 1); // only the successful transmission is recorded
        assert_eq!(fe.diseqc_attempts(), 2);
    }
}
