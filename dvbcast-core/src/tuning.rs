//! Tuning parameter types shared between the request parser, the delivery
//! system modules and the device layer.
//!
//! Every enum maps both ways: to the kernel DVB API value used in property
//! sequences, and to the token used in the client request grammar
//! (`msys=dvbs2`, `mtype=8psk`, ...).

/// Delivery system families a frontend can support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverySystem {
    Undefined,
    DvbS,
    DvbS2,
    DvbT,
    DvbT2,
    DvbCAnnexA,
    DvbCAnnexB,
    DvbCAnnexC,
}

impl DeliverySystem {
    /// Map a kernel `SYS_*` value. Unknown systems map to `None`.
    pub fn from_sys(value: u32) -> Option<Self> {
        match value {
            1 => Some(DeliverySystem::DvbCAnnexA),
            2 => Some(DeliverySystem::DvbCAnnexB),
            3 => Some(DeliverySystem::DvbT),
            5 => Some(DeliverySystem::DvbS),
            6 => Some(DeliverySystem::DvbS2),
            16 => Some(DeliverySystem::DvbT2),
            18 => Some(DeliverySystem::DvbCAnnexC),
            _ => None,
        }
    }

    /// The kernel `SYS_*` value for DTV_DELIVERY_SYSTEM.
    pub fn sys(self) -> u32 {
        match self {
            DeliverySystem::Undefined => 0,
            DeliverySystem::DvbCAnnexA => 1,
            DeliverySystem::DvbCAnnexB => 2,
            DeliverySystem::DvbT => 3,
            DeliverySystem::DvbS => 5,
            DeliverySystem::DvbS2 => 6,
            DeliverySystem::DvbT2 => 16,
            DeliverySystem::DvbCAnnexC => 18,
        }
    }

    /// Parse an `msys=` token. All cable annexes share the `dvbc` token.
    pub fn from_msys(token: &str) -> Option<Self> {
        match token {
            "dvbs" => Some(DeliverySystem::DvbS),
            "dvbs2" => Some(DeliverySystem::DvbS2),
            "dvbt" => Some(DeliverySystem::DvbT),
            "dvbt2" => Some(DeliverySystem::DvbT2),
            "dvbc" => Some(DeliverySystem::DvbCAnnexA),
            _ => None,
        }
    }

    /// The `msys=` token.
    pub fn msys(self) -> &'static str {
        match self {
            DeliverySystem::Undefined => "undefined",
            DeliverySystem::DvbS => "dvbs",
            DeliverySystem::DvbS2 => "dvbs2",
            DeliverySystem::DvbT => "dvbt",
            DeliverySystem::DvbT2 => "dvbt2",
            DeliverySystem::DvbCAnnexA
            | DeliverySystem::DvbCAnnexB
            | DeliverySystem::DvbCAnnexC => "dvbc",
        }
    }

    pub fn is_satellite(self) -> bool {
        matches!(self, DeliverySystem::DvbS | DeliverySystem::DvbS2)
    }

    pub fn is_terrestrial(self) -> bool {
        matches!(self, DeliverySystem::DvbT | DeliverySystem::DvbT2)
    }

    pub fn is_cable(self) -> bool {
        matches!(
            self,
            DeliverySystem::DvbCAnnexA
                | DeliverySystem::DvbCAnnexB
                | DeliverySystem::DvbCAnnexC
        )
    }
}

impl std::fmt::Display for DeliverySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeliverySystem::Undefined => "Undefined",
            DeliverySystem::DvbS => "DVB-S",
            DeliverySystem::DvbS2 => "DVB-S2",
            DeliverySystem::DvbT => "DVB-T",
            DeliverySystem::DvbT2 => "DVB-T2",
            DeliverySystem::DvbCAnnexA => "DVB-C (Annex A)",
            DeliverySystem::DvbCAnnexB => "DVB-C (Annex B)",
            DeliverySystem::DvbCAnnexC => "DVB-C (Annex C)",
        };
        f.write_str(name)
    }
}

/// Satellite signal polarization, controlled via the LNB supply voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarization {
    #[default]
    Horizontal,
    Vertical,
    CircularLeft,
    CircularRight,
}

impl Polarization {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "h" => Some(Polarization::Horizontal),
            "v" => Some(Polarization::Vertical),
            "l" => Some(Polarization::CircularLeft),
            "r" => Some(Polarization::CircularRight),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Polarization::Horizontal => "h",
            Polarization::Vertical => "v",
            Polarization::CircularLeft => "l",
            Polarization::CircularRight => "r",
        }
    }

    /// Horizontal and circular-left select the 18V supply, the others 13V.
    pub fn is_high_voltage(self) -> bool {
        matches!(self, Polarization::Horizontal | Polarization::CircularLeft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modulation {
    Qpsk,
    Psk8,
    Qam16,
    Qam64,
    Qam128,
    Qam256,
    #[default]
    Auto,
}

impl Modulation {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "qpsk" => Some(Modulation::Qpsk),
            "8psk" => Some(Modulation::Psk8),
            "16qam" => Some(Modulation::Qam16),
            "64qam" => Some(Modulation::Qam64),
            "128qam" => Some(Modulation::Qam128),
            "256qam" => Some(Modulation::Qam256),
            "auto" => Some(Modulation::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Modulation::Qpsk => "qpsk",
            Modulation::Psk8 => "8psk",
            Modulation::Qam16 => "16qam",
            Modulation::Qam64 => "64qam",
            Modulation::Qam128 => "128qam",
            Modulation::Qam256 => "256qam",
            Modulation::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            Modulation::Qpsk => 0,
            Modulation::Qam16 => 1,
            Modulation::Qam64 => 3,
            Modulation::Qam128 => 4,
            Modulation::Qam256 => 5,
            Modulation::Auto => 6,
            Modulation::Psk8 => 9,
        }
    }
}

/// Inner forward-error-correction code rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FecInner {
    None,
    F12,
    F23,
    F34,
    F45,
    F56,
    F67,
    F78,
    F89,
    F35,
    F910,
    F25,
    #[default]
    Auto,
}

impl FecInner {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "12" => Some(FecInner::F12),
            "23" => Some(FecInner::F23),
            "34" => Some(FecInner::F34),
            "45" => Some(FecInner::F45),
            "56" => Some(FecInner::F56),
            "67" => Some(FecInner::F67),
            "78" => Some(FecInner::F78),
            "89" => Some(FecInner::F89),
            "35" => Some(FecInner::F35),
            "910" => Some(FecInner::F910),
            "25" => Some(FecInner::F25),
            "none" => Some(FecInner::None),
            "auto" => Some(FecInner::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            FecInner::None => "none",
            FecInner::F12 => "12",
            FecInner::F23 => "23",
            FecInner::F34 => "34",
            FecInner::F45 => "45",
            FecInner::F56 => "56",
            FecInner::F67 => "67",
            FecInner::F78 => "78",
            FecInner::F89 => "89",
            FecInner::F35 => "35",
            FecInner::F910 => "910",
            FecInner::F25 => "25",
            FecInner::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            FecInner::None => 0,
            FecInner::F12 => 1,
            FecInner::F23 => 2,
            FecInner::F34 => 3,
            FecInner::F45 => 4,
            FecInner::F56 => 5,
            FecInner::F67 => 6,
            FecInner::F78 => 7,
            FecInner::F89 => 8,
            FecInner::Auto => 9,
            FecInner::F35 => 10,
            FecInner::F910 => 11,
            FecInner::F25 => 12,
        }
    }
}

/// DVB-S2 roll-off factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollOff {
    R35,
    R25,
    R20,
    #[default]
    Auto,
}

impl RollOff {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "0.35" => Some(RollOff::R35),
            "0.25" => Some(RollOff::R25),
            "0.20" => Some(RollOff::R20),
            "auto" => Some(RollOff::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            RollOff::R35 => "0.35",
            RollOff::R25 => "0.25",
            RollOff::R20 => "0.20",
            RollOff::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            RollOff::R35 => 0,
            RollOff::R20 => 1,
            RollOff::R25 => 2,
            RollOff::Auto => 3,
        }
    }
}

/// DVB-S2 pilot tones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pilot {
    On,
    Off,
    #[default]
    Auto,
}

impl Pilot {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "on" => Some(Pilot::On),
            "off" => Some(Pilot::Off),
            "auto" => Some(Pilot::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Pilot::On => "on",
            Pilot::Off => "off",
            Pilot::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            Pilot::On => 0,
            Pilot::Off => 1,
            Pilot::Auto => 2,
        }
    }
}

/// Spectral inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inversion {
    Off,
    On,
    #[default]
    Auto,
}

impl Inversion {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "0" | "off" => Some(Inversion::Off),
            "1" | "on" => Some(Inversion::On),
            "auto" => Some(Inversion::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Inversion::Off => "0",
            Inversion::On => "1",
            Inversion::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            Inversion::Off => 0,
            Inversion::On => 1,
            Inversion::Auto => 2,
        }
    }
}

/// DVB-T/T2 OFDM transmission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    M2k,
    M8k,
    M4k,
    M1k,
    M16k,
    M32k,
    #[default]
    Auto,
}

impl TransmissionMode {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "2k" => Some(TransmissionMode::M2k),
            "8k" => Some(TransmissionMode::M8k),
            "4k" => Some(TransmissionMode::M4k),
            "1k" => Some(TransmissionMode::M1k),
            "16k" => Some(TransmissionMode::M16k),
            "32k" => Some(TransmissionMode::M32k),
            "auto" => Some(TransmissionMode::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            TransmissionMode::M2k => "2k",
            TransmissionMode::M8k => "8k",
            TransmissionMode::M4k => "4k",
            TransmissionMode::M1k => "1k",
            TransmissionMode::M16k => "16k",
            TransmissionMode::M32k => "32k",
            TransmissionMode::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            TransmissionMode::M2k => 0,
            TransmissionMode::M8k => 1,
            TransmissionMode::Auto => 2,
            TransmissionMode::M4k => 3,
            TransmissionMode::M1k => 4,
            TransmissionMode::M16k => 5,
            TransmissionMode::M32k => 6,
        }
    }
}

/// DVB-T/T2 guard interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardInterval {
    G132,
    G116,
    G18,
    G14,
    G1128,
    G19128,
    G19256,
    #[default]
    Auto,
}

impl GuardInterval {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "132" => Some(GuardInterval::G132),
            "116" => Some(GuardInterval::G116),
            "18" => Some(GuardInterval::G18),
            "14" => Some(GuardInterval::G14),
            "1128" => Some(GuardInterval::G1128),
            "19128" => Some(GuardInterval::G19128),
            "19256" => Some(GuardInterval::G19256),
            "auto" => Some(GuardInterval::Auto),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            GuardInterval::G132 => "132",
            GuardInterval::G116 => "116",
            GuardInterval::G18 => "18",
            GuardInterval::G14 => "14",
            GuardInterval::G1128 => "1128",
            GuardInterval::G19128 => "19128",
            GuardInterval::G19256 => "19256",
            GuardInterval::Auto => "auto",
        }
    }

    pub fn dtv_value(self) -> u32 {
        match self {
            GuardInterval::G132 => 0,
            GuardInterval::G116 => 1,
            GuardInterval::G18 => 2,
            GuardInterval::G14 => 3,
            GuardInterval::Auto => 4,
            GuardInterval::G1128 => 5,
            GuardInterval::G19128 => 6,
            GuardInterval::G19256 => 7,
        }
    }
}

/// DVB-T hierarchical transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hierarchy {
    None,
    H1,
    H2,
    H4,
    #[default]
    Auto,
}

impl Hierarchy {
    pub fn dtv_value(self) -> u32 {
        match self {
            Hierarchy::None => 0,
            Hierarchy::H1 => 1,
            Hierarchy::H2 => 2,
            Hierarchy::H4 => 3,
            Hierarchy::Auto => 4,
        }
    }
}

/// Parse a `bw=` token (MHz) into Hz. `1.712` is the DVB-T2 narrowband mode.
pub fn bandwidth_hz_from_token(token: &str) -> Option<u32> {
    match token {
        "5" => Some(5_000_000),
        "6" => Some(6_000_000),
        "7" => Some(7_000_000),
        "8" => Some(8_000_000),
        "10" => Some(10_000_000),
        "1.712" => Some(1_712_000),
        _ => None,
    }
}

/// Format a bandwidth in Hz back into its `bw=` token.
pub fn bandwidth_token(bandwidth_hz: u32) -> String {
    if bandwidth_hz == 1_712_000 {
        "1.712".to_string()
    } else {
        (bandwidth_hz / 1_000_000).to_string()
    }
}

/// The full tuning intent for one frontend, across all families.
///
/// Only the fields of the active delivery family are meaningful; the request
/// parser fills them and the matching delivery module reads them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuningDescriptor {
    pub delsys: DeliverySystem,
    /// Transponder/channel frequency in kHz.
    pub freq_khz: u32,

    // Satellite
    /// Signal source (satellite position), 1-based as in the request grammar.
    pub src: u8,
    pub polarization: Polarization,
    pub rolloff: RollOff,
    pub pilot: Pilot,

    // Satellite and cable
    /// Symbol rate in symbols/s.
    pub symbol_rate: u32,
    pub modulation: Modulation,
    pub fec: FecInner,

    // Terrestrial
    pub bandwidth_hz: u32,
    pub transmission_mode: TransmissionMode,
    pub guard_interval: GuardInterval,
    pub hierarchy: Hierarchy,
    /// DVB-T2 physical layer pipe.
    pub plp_id: Option<u8>,

    pub inversion: Inversion,
}

impl Default for TuningDescriptor {
    fn default() -> Self {
        TuningDescriptor {
            delsys: DeliverySystem::Undefined,
            freq_khz: 0,
            src: 1,
            polarization: Polarization::default(),
            rolloff: RollOff::default(),
            pilot: Pilot::default(),
            symbol_rate: 0,
            modulation: Modulation::default(),
            fec: FecInner::default(),
            bandwidth_hz: 8_000_000,
            transmission_mode: TransmissionMode::default(),
            guard_interval: GuardInterval::default(),
            hierarchy: Hierarchy::default(),
            plp_id: None,
            inversion: Inversion::default(),
        }
    }
}
