//! Wire format of the Daly BMS read protocol.
//!
//! Every exchange consists of one 13 byte request frame and one or more 13 byte
//! response frames:
//!
//! ```text
//! start(0xA5) | address | command | length(8) | payload(8) | checksum
//! ```
//!
//! The checksum is the wrapping 8 bit sum of the 12 preceding bytes. Responses
//! spanning several frames carry a 1-based sequence id in the first payload byte.

pub mod bytes;
mod command;
mod failures;
mod frame;
mod reassembly;
mod response;

pub use command::{Command, CommandCode, PendingCommand};
pub use failures::{FailureFlag, FailureFlags, FailureStatus};
pub use frame::{checksum, encode_request, ConnectionClass, Frame, Payload};
pub use reassembly::reassemble;
pub use response::*;

/// Size of every frame on the wire.
pub const FRAME_LENGTH: usize = 13;
/// Size of the payload carried by every frame.
pub const PAYLOAD_LENGTH: usize = 8;
/// Usable bytes per payload of a multi-frame response once the sequence id is removed.
pub const DATA_LENGTH: usize = PAYLOAD_LENGTH - 1;
pub const START_BYTE: u8 = 0xa5;
