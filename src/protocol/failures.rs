use super::bytes::bit;
use super::Payload;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Declares [`FailureFlag`] from `(payload byte, bit) Name => "description"` rows.
macro_rules! failure_flags {
    ($(($byte:literal, $bit:literal) $name:ident => $text:literal,)+) => {
        /// A single fault reported in bytes 0-6 of the failure response.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum FailureFlag {
            $($name,)+
        }

        impl FailureFlag {
            pub const ALL: &'static [FailureFlag] = &[$(FailureFlag::$name,)+];

            /// Payload byte and bit position of the flag.
            pub fn position(self) -> (usize, u8) {
                match self {
                    $(FailureFlag::$name => ($byte, $bit),)+
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(FailureFlag::$name => $text,)+
                }
            }
        }
    };
}

failure_flags! {
    (0, 0) CellVoltHighLevel1 => "Cell voltage is too high level one alarm",
    (0, 1) CellVoltHighLevel2 => "Cell voltage is too high level two alarm",
    (0, 2) CellVoltLowLevel1 => "Cell voltage is too low level one alarm",
    (0, 3) CellVoltLowLevel2 => "Cell voltage is too low level two alarm",
    (0, 4) SumVoltHighLevel1 => "Total voltage is too high level one alarm",
    (0, 5) SumVoltHighLevel2 => "Total voltage is too high level two alarm",
    (0, 6) SumVoltLowLevel1 => "Total voltage is too low level one alarm",
    (0, 7) SumVoltLowLevel2 => "Total voltage is too low level two alarm",

    (1, 0) ChargeTempHighLevel1 => "Charging temperature too high level one alarm",
    (1, 1) ChargeTempHighLevel2 => "Charging temperature too high level two alarm",
    (1, 2) ChargeTempLowLevel1 => "Charging temperature too low level one alarm",
    (1, 3) ChargeTempLowLevel2 => "Charging temperature too low level two alarm",
    (1, 4) DischargeTempHighLevel1 => "Discharging temperature too high level one alarm",
    (1, 5) DischargeTempHighLevel2 => "Discharging temperature too high level two alarm",
    (1, 6) DischargeTempLowLevel1 => "Discharging temperature too low level one alarm",
    (1, 7) DischargeTempLowLevel2 => "Discharging temperature too low level two alarm",

    (2, 0) ChargeOvercurrentLevel1 => "Charge over current level one alarm",
    (2, 1) ChargeOvercurrentLevel2 => "Charge over current level two alarm",
    (2, 2) DischargeOvercurrentLevel1 => "Discharge over current level one alarm",
    (2, 3) DischargeOvercurrentLevel2 => "Discharge over current level two alarm",
    (2, 4) SocHighLevel1 => "SOC is too high level one alarm",
    (2, 5) SocHighLevel2 => "SOC is too high level two alarm",
    (2, 6) SocLowLevel1 => "SOC is too low level one alarm",
    (2, 7) SocLowLevel2 => "SOC is too low level two alarm",

    (3, 0) DiffVoltLevel1 => "Excessive cell voltage difference level one alarm",
    (3, 1) DiffVoltLevel2 => "Excessive cell voltage difference level two alarm",
    (3, 2) DiffTempLevel1 => "Excessive temperature difference level one alarm",
    (3, 3) DiffTempLevel2 => "Excessive temperature difference level two alarm",

    (4, 0) ChargeMosTempHighAlarm => "Charging MOS overtemperature alarm",
    (4, 1) DischargeMosTempHighAlarm => "Discharging MOS overtemperature alarm",
    (4, 2) ChargeMosTempSensorErr => "Charging MOS temperature detection sensor failure",
    (4, 3) DischargeMosTempSensorErr => "Discharging MOS temperature detection sensor failure",
    (4, 4) ChargeMosAdhesionErr => "Charging MOS adhesion failure",
    (4, 5) DischargeMosAdhesionErr => "Discharging MOS adhesion failure",
    (4, 6) ChargeMosOpenCircuitErr => "Charging MOS breaker failure",
    (4, 7) DischargeMosOpenCircuitErr => "Discharging MOS breaker failure",

    (5, 0) AfeCollectChipErr => "AFE acquisition chip malfunction",
    (5, 1) VoltageCollectDropped => "Cell voltage collection dropped",
    (5, 2) CellTempSensorErr => "Cell temperature sensor failure",
    (5, 3) EepromErr => "EEPROM storage failure",
    (5, 4) RtcErr => "RTC clock malfunction",
    (5, 5) PrechargeFailure => "Precharge failure",
    (5, 6) CommunicationFailure => "Vehicle communication malfunction",
    (5, 7) InternalCommunicationFailure => "Internal communication module malfunction",

    (6, 0) CurrentModuleFault => "Current module failure",
    (6, 1) SumVoltageDetectFault => "Total voltage detection module failure",
    (6, 2) ShortCircuitProtectFault => "Short circuit protection failure",
    (6, 3) LowVoltForbiddenChargeFault => "Low voltage, charging forbidden",
}

impl FailureFlag {
    /// Index of the flag inside [`FailureFlags::bits`].
    pub fn index(self) -> u32 {
        let (byte, bit) = self.position();
        byte as u32 * 8 + u32::from(bit)
    }

    fn mask(self) -> u64 {
        1 << self.index()
    }
}

impl fmt::Display for FailureFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Set of [`FailureFlag`]s, bit `byte * 8 + bit` of the backing integer per flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FailureFlags(u64);

impl FailureFlags {
    /// Bytes 0-6 of the payload carry flags, byte 7 the fault code.
    const FLAG_BYTES: usize = 7;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Collects the known flags set in the payload. Reserved bits are dropped.
    pub fn from_payload(payload: &Payload) -> Self {
        let mut flags = Self::empty();
        for flag in FailureFlag::ALL {
            let (byte, position) = flag.position();
            debug_assert!(byte < Self::FLAG_BYTES);
            if bit(payload[byte], position) {
                flags.insert(*flag);
            }
        }
        flags
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, flag: FailureFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    pub fn insert(&mut self, flag: FailureFlag) {
        self.0 |= flag.mask();
    }

    pub fn union(&self, other: &FailureFlags) -> FailureFlags {
        FailureFlags(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Set flags in table order.
    pub fn iter(&self) -> impl Iterator<Item = FailureFlag> + '_ {
        FailureFlag::ALL
            .iter()
            .copied()
            .filter(|flag| self.contains(*flag))
    }
}

impl FromIterator<FailureFlag> for FailureFlags {
    fn from_iter<I: IntoIterator<Item = FailureFlag>>(iter: I) -> Self {
        let mut flags = Self::empty();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

#[cfg(feature = "serde")]
impl Serialize for FailureFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for FailureFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vec::<FailureFlag>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FailureStatus {
    pub failures: FailureFlags,
    /// Raw fault code reported by the BMS
    pub fault_code: u8,
}

impl FailureStatus {
    pub fn decode(payload: &Payload) -> Self {
        Self {
            failures: FailureFlags::from_payload(payload),
            fault_code: payload[7],
        }
    }
}
