use std::fmt;

/// The header field that failed validation when a frame was decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    /// Byte 0 was not the start marker.
    StartByte(u8),
    /// Byte 2 is not one of the known command codes.
    CommandCode(u8),
    /// Byte 3 did not declare an 8 byte payload.
    PayloadLength(u8),
    /// The frame was sent by another device than the one we talk to.
    DeviceAddress { expected: u8, received: u8 },
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            HeaderField::StartByte(byte) => write!(f, "invalid start byte {byte:#04X}"),
            HeaderField::CommandCode(byte) => write!(f, "unknown command code {byte:#04X}"),
            HeaderField::PayloadLength(len) => write!(f, "invalid payload length {len}"),
            HeaderField::DeviceAddress { expected, received } => write!(
                f,
                "frame from device {received:#04X}, expected {expected:#04X}"
            ),
        }
    }
}

/// Why a (multi-frame) response was rejected as incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteFrames {
    /// A frame answered a different command than the one sent.
    CommandMismatch { expected: u8, received: u8 },
    /// The sorted sequence ids do not form the run `1..=frames`.
    SequenceGap { position: usize, id: u8 },
    /// Fewer or more payloads than the command requires.
    FrameCount { expected: usize, received: usize },
    /// The reassembled data holds fewer bytes than the items requested.
    MissingData { expected: usize, received: usize },
}

impl fmt::Display for IncompleteFrames {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IncompleteFrames::CommandMismatch { expected, received } => write!(
                f,
                "frame answers command {received:#04X}, expected {expected:#04X}"
            ),
            IncompleteFrames::SequenceGap { position, id } => {
                write!(f, "expected frame #{} but got #{id}", position + 1)
            }
            IncompleteFrames::FrameCount { expected, received } => {
                write!(f, "expected {expected} frames, got {received}")
            }
            IncompleteFrames::MissingData { expected, received } => {
                write!(f, "expected {expected} data bytes, got {received}")
            }
        }
    }
}

/// Errors of the Daly protocol engine.
///
/// Every variant is terminal for the call that produced it, nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure, including read timeouts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The serial port could not be opened or configured.
    #[cfg(feature = "tokio-serial-async")]
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("Request not fully transmitted - expected={expected} written={written}")]
    TransmitFailed { expected: usize, written: usize },
    #[error("Response shorter than expected - expected={expected} received={received}")]
    InvalidResponseLength { expected: usize, received: usize },
    #[error("Invalid frame size - expected={expected} received={received}")]
    LengthMismatch { expected: usize, received: usize },
    #[error("Invalid checksum - calculated={calculated:#04X} received={received:#04X}")]
    ChecksumMismatch { calculated: u8, received: u8 },
    #[error("Header mismatch: {0}")]
    HeaderMismatch(HeaderField),
    #[error("Incomplete frames: {0}")]
    IncompleteFrames(IncompleteFrames),
    #[error("Invalid value {value} for {field}")]
    InvalidEnumValue { field: &'static str, value: u8 },
}

impl Error {
    /// Returns `true` if the transport gave up waiting for the response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == std::io::ErrorKind::TimedOut)
    }
}

impl From<HeaderField> for Error {
    fn from(field: HeaderField) -> Error {
        Error::HeaderMismatch(field)
    }
}

impl From<IncompleteFrames> for Error {
    fn from(reason: IncompleteFrames) -> Error {
        Error::IncompleteFrames(reason)
    }
}
