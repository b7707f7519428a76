use crate::error::HeaderField;
use std::time::Duration;

/// Wire codes of the supported read commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    StateOfCharge = 0x90,
    CellVoltageLimits = 0x91,
    CellTemperatureLimits = 0x92,
    MosfetStatus = 0x93,
    Status = 0x94,
    CellVoltages = 0x95,
    Temperatures = 0x96,
    BalanceStates = 0x97,
    Failures = 0x98,
}

impl CommandCode {
    pub const ALL: [CommandCode; 9] = [
        CommandCode::StateOfCharge,
        CommandCode::CellVoltageLimits,
        CommandCode::CellTemperatureLimits,
        CommandCode::MosfetStatus,
        CommandCode::Status,
        CommandCode::CellVoltages,
        CommandCode::Temperatures,
        CommandCode::BalanceStates,
        CommandCode::Failures,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = HeaderField;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|code| code.byte() == byte)
            .ok_or(HeaderField::CommandCode(byte))
    }
}

/// A logical read request.
///
/// The cell voltage and temperature requests carry the number of items the BMS
/// is going to report, since that determines how many frames it answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StateOfCharge,
    CellVoltageLimits,
    CellTemperatureLimits,
    MosfetStatus,
    Status,
    CellVoltages { cells: u8 },
    Temperatures { sensors: u8 },
    BalanceStates,
    Failures,
}

impl Command {
    pub fn code(&self) -> CommandCode {
        match self {
            Command::StateOfCharge => CommandCode::StateOfCharge,
            Command::CellVoltageLimits => CommandCode::CellVoltageLimits,
            Command::CellTemperatureLimits => CommandCode::CellTemperatureLimits,
            Command::MosfetStatus => CommandCode::MosfetStatus,
            Command::Status => CommandCode::Status,
            Command::CellVoltages { .. } => CommandCode::CellVoltages,
            Command::Temperatures { .. } => CommandCode::Temperatures,
            Command::BalanceStates => CommandCode::BalanceStates,
            Command::Failures => CommandCode::Failures,
        }
    }

    /// Number of response frames the BMS sends for this command.
    ///
    /// A frame has 7 data bytes after the sequence id: room for three 16 bit
    /// cell voltages or seven 8 bit temperatures.
    pub fn frame_count(&self) -> usize {
        match *self {
            Command::CellVoltages { cells } => usize::from(cells).div_ceil(3),
            Command::Temperatures { sensors } => usize::from(sensors).div_ceil(7),
            _ => 1,
        }
    }
}

/// The command a transaction is waiting on an answer for.
#[derive(Debug, Clone, Copy)]
pub struct PendingCommand {
    pub code: CommandCode,
    pub frames: usize,
    pub timeout: Duration,
}

impl PendingCommand {
    pub fn new(command: &Command, timeout: Duration) -> Self {
        Self {
            code: command.code(),
            frames: command.frame_count(),
            timeout,
        }
    }

    /// Number of bytes the complete response occupies on the wire.
    pub fn reply_size(&self) -> usize {
        self.frames * super::FRAME_LENGTH
    }
}
