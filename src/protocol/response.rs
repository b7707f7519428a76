use super::bytes::{bit, offset_byte, offset_scaled, scaled, u16_from_be, u32_from_be};
use super::{Payload, DATA_LENGTH, PAYLOAD_LENGTH};
use crate::error::{Error, IncompleteFrames};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// An offset of 40 is added by the BMS to avoid negative temperatures
const TEMPERATURE_OFFSET: u8 = 40;
// The current is reported with a 30000 unit offset
const CURRENT_OFFSET: u16 = 30000;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateOfCharge {
    /// Pack voltage in V
    pub total_voltage: f32,
    /// Voltage measured by the acquisition front end in V
    pub gather_voltage: f32,
    pub current: f32, // negative=charging, positive=discharging
    pub soc_percent: f32,
}

impl StateOfCharge {
    pub fn decode(payload: &Payload) -> Self {
        Self {
            total_voltage: scaled(payload[0], payload[1], 0.1),
            gather_voltage: scaled(payload[2], payload[3], 0.1),
            current: offset_scaled(payload[4], payload[5], CURRENT_OFFSET, 0.1),
            soc_percent: scaled(payload[6], payload[7], 0.1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellVoltageLimits {
    pub highest_voltage: f32,
    pub highest_cell: u8,
    pub lowest_voltage: f32,
    pub lowest_cell: u8,
}

impl CellVoltageLimits {
    pub fn decode(payload: &Payload) -> Self {
        Self {
            highest_voltage: scaled(payload[0], payload[1], 0.001),
            highest_cell: payload[2],
            lowest_voltage: scaled(payload[3], payload[4], 0.001),
            lowest_cell: payload[5],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellTemperatureLimits {
    pub highest_temperature: i16,
    pub highest_sensor: u8,
    pub lowest_temperature: i16,
    pub lowest_sensor: u8,
}

impl CellTemperatureLimits {
    pub fn decode(payload: &Payload) -> Self {
        Self {
            highest_temperature: offset_byte(payload[0], TEMPERATURE_OFFSET),
            highest_sensor: payload[1],
            lowest_temperature: offset_byte(payload[2], TEMPERATURE_OFFSET),
            lowest_sensor: payload[3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MosfetMode {
    Stationary,
    Charging,
    Discharging,
}

impl TryFrom<u8> for MosfetMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MosfetMode::Stationary),
            1 => Ok(MosfetMode::Charging),
            2 => Ok(MosfetMode::Discharging),
            _ => {
                log::warn!("Invalid mosfet mode {value}");
                Err(Error::InvalidEnumValue {
                    field: "mosfet mode",
                    value,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MosfetStatus {
    pub mode: MosfetMode,
    /// Raw state of the charge MOSFET as reported by the BMS
    pub charging_mosfet: u8,
    /// Raw state of the discharge MOSFET as reported by the BMS
    pub discharging_mosfet: u8,
    /// BMS life counter, wraps at 255
    pub heartbeat: u8,
    /// Remaining capacity in mAh
    pub remaining_capacity: u32,
}

impl MosfetStatus {
    pub fn decode(payload: &Payload) -> Result<Self, Error> {
        Ok(Self {
            mode: MosfetMode::try_from(payload[0])?,
            charging_mosfet: payload[1],
            discharging_mosfet: payload[2],
            heartbeat: payload[3],
            remaining_capacity: u32_from_be([payload[4], payload[5], payload[6], payload[7]]),
        })
    }

    pub fn charging_mosfet_on(&self) -> bool {
        self.charging_mosfet != 0
    }

    pub fn discharging_mosfet_on(&self) -> bool {
        self.discharging_mosfet != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IoState {
    pub di1: bool,
    pub di2: bool,
    pub di3: bool,
    pub di4: bool,
    pub do1: bool,
    pub do2: bool,
    pub do3: bool,
    pub do4: bool,
}

impl From<u8> for IoState {
    fn from(byte: u8) -> Self {
        Self {
            di1: bit(byte, 0),
            di2: bit(byte, 1),
            di3: bit(byte, 2),
            di4: bit(byte, 3),
            do1: bit(byte, 4),
            do2: bit(byte, 5),
            do3: bit(byte, 6),
            do4: bit(byte, 7),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusInformation {
    pub cells: u8,
    pub temperature_sensors: u8,
    pub charger_connected: bool,
    pub load_connected: bool,
    pub states: IoState,
    pub cycles: u16,
}

impl StatusInformation {
    pub fn decode(payload: &Payload) -> Self {
        Self {
            cells: payload[0],
            temperature_sensors: payload[1],
            charger_connected: payload[2] > 0,
            load_connected: payload[3] > 0,
            states: IoState::from(payload[4]),
            cycles: u16_from_be(payload[5], payload[6]),
        }
    }
}

/// Voltage of every cell, decoded from a reassembled multi-frame response.
pub struct CellVoltages;

impl CellVoltages {
    /// Each 7 byte data region holds three voltages and one unused byte.
    pub fn decode(data: &[u8], n_cells: u8) -> Result<Vec<f32>, Error> {
        let n_cells = usize::from(n_cells);
        let raw: Vec<u8> = data
            .chunks(DATA_LENGTH)
            .flat_map(|region| region.iter().take(6))
            .take(n_cells * 2)
            .copied()
            .collect();
        if raw.len() < n_cells * 2 {
            log::warn!(
                "Missing cell voltage data - expected={} received={}",
                n_cells * 2,
                raw.len()
            );
            return Err(IncompleteFrames::MissingData {
                expected: n_cells * 2,
                received: raw.len(),
            }
            .into());
        }
        Ok(raw
            .chunks_exact(2)
            .enumerate()
            .map(|(n_cell, pair)| {
                let volt = scaled(pair[0], pair[1], 0.001);
                log::trace!("Cell #{} volt={}", n_cell + 1, volt);
                volt
            })
            .collect())
    }
}

/// Temperature of every sensor, decoded from a reassembled multi-frame response.
pub struct CellTemperatures;

impl CellTemperatures {
    pub fn decode(data: &[u8], n_sensors: u8) -> Result<Vec<i16>, Error> {
        let n_sensors = usize::from(n_sensors);
        if data.len() < n_sensors {
            log::warn!(
                "Missing temperatures - expected={} received={}",
                n_sensors,
                data.len()
            );
            return Err(IncompleteFrames::MissingData {
                expected: n_sensors,
                received: data.len(),
            }
            .into());
        }
        Ok(data[..n_sensors]
            .iter()
            .enumerate()
            .map(|(n_sensor, raw)| {
                let temperature = offset_byte(*raw, TEMPERATURE_OFFSET);
                log::trace!("Sensor #{} °C={}", n_sensor + 1, temperature);
                temperature
            })
            .collect())
    }
}

/// Balancing state of every cell, `true` while the balancer of that cell is open.
pub struct CellBalanceStates;

impl CellBalanceStates {
    pub fn decode(payload: &Payload, n_cells: u8) -> Result<Vec<bool>, Error> {
        let n_cells = usize::from(n_cells);
        if n_cells > PAYLOAD_LENGTH * 8 {
            log::warn!("Balance states of {n_cells} cells do not fit into a single frame");
            return Err(Error::InvalidResponseLength {
                expected: n_cells.div_ceil(8),
                received: PAYLOAD_LENGTH,
            });
        }
        Ok((0..n_cells)
            .map(|i| bit(payload[i / 8], (i % 8) as u8))
            .collect())
    }
}
