use super::{CommandCode, FRAME_LENGTH, PAYLOAD_LENGTH, START_BYTE};
use crate::error::{Error, HeaderField};
use std::fmt;

pub type Payload = [u8; PAYLOAD_LENGTH];

/// Channel the request is sent from, placed in byte 1 of every request.
///
/// The BMS answers with its own address in that position instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionClass {
    /// `0x20`, sometimes documented as GPRS or Bluetooth app.
    Gprs,
    /// `0x40`, the "upper computer" (UART/RS485) channel.
    #[default]
    Host,
    /// `0x80`, sometimes documented as Bluetooth app or upper.
    Bluetooth,
    Custom(u8),
}

impl ConnectionClass {
    pub fn byte(self) -> u8 {
        match self {
            ConnectionClass::Gprs => 0x20,
            ConnectionClass::Host => 0x40,
            ConnectionClass::Bluetooth => 0x80,
            ConnectionClass::Custom(byte) => byte,
        }
    }
}

impl From<u8> for ConnectionClass {
    fn from(byte: u8) -> Self {
        match byte {
            0x20 => ConnectionClass::Gprs,
            0x40 => ConnectionClass::Host,
            0x80 => ConnectionClass::Bluetooth,
            other => ConnectionClass::Custom(other),
        }
    }
}

/// Wrapping 8 bit sum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Builds a request frame. Read commands carry no parameters, the payload is all zero.
pub fn encode_request(connection: ConnectionClass, code: CommandCode) -> [u8; FRAME_LENGTH] {
    Frame::new(connection.byte(), code, [0; PAYLOAD_LENGTH]).encode()
}

/// A validated frame.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    address: u8,
    code: CommandCode,
    payload: Payload,
}

impl Frame {
    pub fn new(address: u8, code: CommandCode, payload: Payload) -> Self {
        Self {
            address,
            code,
            payload,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn code(&self) -> CommandCode {
        self.code
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn encode(&self) -> [u8; FRAME_LENGTH] {
        let mut buffer = [0; FRAME_LENGTH];
        buffer[0] = START_BYTE;
        buffer[1] = self.address;
        buffer[2] = self.code.byte();
        buffer[3] = PAYLOAD_LENGTH as u8;
        buffer[4..FRAME_LENGTH - 1].copy_from_slice(&self.payload);
        buffer[FRAME_LENGTH - 1] = checksum(&buffer[..FRAME_LENGTH - 1]);
        buffer
    }

    /// Parses and validates a received frame.
    ///
    /// The length is checked first, then the checksum, then the header fields.
    pub fn decode(buffer: &[u8]) -> Result<Self, Error> {
        if buffer.len() != FRAME_LENGTH {
            log::warn!(
                "Invalid frame size - expected={} received={}",
                FRAME_LENGTH,
                buffer.len()
            );
            return Err(Error::LengthMismatch {
                expected: FRAME_LENGTH,
                received: buffer.len(),
            });
        }

        let calculated = checksum(&buffer[..FRAME_LENGTH - 1]);
        let received = buffer[FRAME_LENGTH - 1];
        if calculated != received {
            log::warn!(
                "Invalid checksum - calculated={:02X?} received={:02X?} buffer={:02X?}",
                calculated,
                received,
                buffer
            );
            return Err(Error::ChecksumMismatch {
                calculated,
                received,
            });
        }

        if buffer[0] != START_BYTE {
            log::warn!("Invalid start byte {:02X?}", buffer[0]);
            return Err(HeaderField::StartByte(buffer[0]).into());
        }
        if usize::from(buffer[3]) != PAYLOAD_LENGTH {
            log::warn!("Invalid payload length {}", buffer[3]);
            return Err(HeaderField::PayloadLength(buffer[3]).into());
        }
        let code = CommandCode::try_from(buffer[2]).inspect_err(|_| {
            log::warn!("Unknown command code {:02X?}", buffer[2]);
        })?;

        let mut payload = [0; PAYLOAD_LENGTH];
        payload.copy_from_slice(&buffer[4..FRAME_LENGTH - 1]);
        Ok(Self::new(buffer[1], code, payload))
    }

    /// Like [`Frame::decode`], additionally rejecting frames sent by another device.
    pub fn decode_authenticated(buffer: &[u8], expected_address: u8) -> Result<Self, Error> {
        let frame = Self::decode(buffer)?;
        if frame.address != expected_address {
            log::warn!(
                "Frame from unexpected device - expected={:02X?} received={:02X?}",
                expected_address,
                frame.address
            );
            return Err(HeaderField::DeviceAddress {
                expected: expected_address,
                received: frame.address,
            }
            .into());
        }
        Ok(frame)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X?}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOC_REPLY: [u8; FRAME_LENGTH] = [
        0xa5, 0x01, 0x90, 0x08, 0x01, 0x90, 0x01, 0x90, 0x75, 0x30, 0x03, 0xe8, 0x00,
    ];

    fn soc_reply() -> [u8; FRAME_LENGTH] {
        let mut buffer = SOC_REPLY;
        buffer[12] = checksum(&buffer[..12]);
        buffer
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
        let prefix = [0xa5, 0x40, 0x90, 0x08, 0, 0, 0, 0, 0, 0, 0, 0];
        let sum: u32 = prefix.iter().map(|b| u32::from(*b)).sum();
        assert_eq!(u32::from(checksum(&prefix)), sum % 256);
    }

    #[test]
    fn soc_request() {
        assert_eq!(
            encode_request(ConnectionClass::Host, CommandCode::StateOfCharge),
            [0xa5, 0x40, 0x90, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0x7d]
        );
        assert_eq!(
            encode_request(ConnectionClass::Custom(0x80), CommandCode::Failures),
            [0xa5, 0x80, 0x98, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0xc5]
        );
    }

    #[test]
    fn encode_decode() {
        let payload = [1, 2, 3, 4, 5, 6, 7, 0xff];
        for code in CommandCode::ALL {
            let frame = Frame::new(0x01, code, payload);
            let decoded = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded.code(), code);
            assert_eq!(decoded.address(), 0x01);
            assert_eq!(decoded.payload(), &payload);
        }
    }

    #[test]
    fn decode_reply() {
        let frame = Frame::decode(&soc_reply()).unwrap();
        assert_eq!(frame.code(), CommandCode::StateOfCharge);
        assert_eq!(frame.address(), 0x01);
        assert_eq!(
            frame.into_payload(),
            [0x01, 0x90, 0x01, 0x90, 0x75, 0x30, 0x03, 0xe8]
        );
    }

    #[test]
    fn wrong_length() {
        let buffer = soc_reply();
        assert!(matches!(
            Frame::decode(&buffer[..12]),
            Err(Error::LengthMismatch {
                expected: 13,
                received: 12
            })
        ));
        let mut longer = buffer.to_vec();
        longer.push(0);
        assert!(matches!(
            Frame::decode(&longer),
            Err(Error::LengthMismatch { received: 14, .. })
        ));
        // length wins over the broken content
        assert!(matches!(
            Frame::decode(&[0; 5]),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_checksum() {
        for delta in 1..=255u8 {
            let mut buffer = soc_reply();
            buffer[12] = buffer[12].wrapping_add(delta);
            assert!(matches!(
                Frame::decode(&buffer),
                Err(Error::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn header_faults() {
        let reseal = |mut buffer: [u8; FRAME_LENGTH]| {
            buffer[12] = checksum(&buffer[..12]);
            buffer
        };

        let mut buffer = soc_reply();
        buffer[0] = 0xa6;
        assert!(matches!(
            Frame::decode(&reseal(buffer)),
            Err(Error::HeaderMismatch(HeaderField::StartByte(0xa6)))
        ));

        let mut buffer = soc_reply();
        buffer[3] = 0x07;
        assert!(matches!(
            Frame::decode(&reseal(buffer)),
            Err(Error::HeaderMismatch(HeaderField::PayloadLength(7)))
        ));

        let mut buffer = soc_reply();
        buffer[2] = 0xd9;
        assert!(matches!(
            Frame::decode(&reseal(buffer)),
            Err(Error::HeaderMismatch(HeaderField::CommandCode(0xd9)))
        ));
    }

    #[test]
    fn authenticated() {
        assert!(Frame::decode_authenticated(&soc_reply(), 0x01).is_ok());
        assert!(matches!(
            Frame::decode_authenticated(&soc_reply(), 0x02),
            Err(Error::HeaderMismatch(HeaderField::DeviceAddress {
                expected: 0x02,
                received: 0x01
            }))
        ));
    }

    #[test]
    fn connection_class_bytes() {
        assert_eq!(ConnectionClass::default().byte(), 0x40);
        assert_eq!(ConnectionClass::from(0x20), ConnectionClass::Gprs);
        assert_eq!(ConnectionClass::from(0x80), ConnectionClass::Bluetooth);
        assert_eq!(ConnectionClass::from(0x11), ConnectionClass::Custom(0x11));
        assert_eq!(ConnectionClass::Custom(0x11).byte(), 0x11);
    }
}
