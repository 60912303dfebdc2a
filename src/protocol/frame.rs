use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{Error, Result};

/// Bytes in a command frame: device, command, aux1, aux2, checksum
pub const COMMAND_FRAME_LEN: usize = 5;

/// One-byte wrapping sum of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Appends the checksum to a payload, producing a data frame
pub fn data_frame(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(payload.len() + 1);
    frame.put_slice(payload);
    frame.put_u8(checksum(payload));
    frame.freeze()
}

/// A command frame sent by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandFrame {
    /// Target device id
    pub device: u8,
    /// Command code
    pub command: u8,
    /// Low auxiliary byte
    pub aux1: u8,
    /// High auxiliary byte
    pub aux2: u8,
}

impl CommandFrame {
    pub fn new(device: u8, command: u8, aux: u16) -> Self {
        let [aux1, aux2] = aux.to_le_bytes();
        CommandFrame {
            device,
            command,
            aux1,
            aux2,
        }
    }

    /// Auxiliary field; the payload length for payload-bearing commands
    pub fn aux(&self) -> u16 {
        u16::from_le_bytes([self.aux1, self.aux2])
    }

    /// Header checksum as transmitted in the fifth byte
    pub fn checksum(&self) -> u8 {
        checksum(&[self.device, self.command, self.aux1, self.aux2])
    }

    pub fn to_bytes(&self) -> [u8; COMMAND_FRAME_LEN] {
        [self.device, self.command, self.aux1, self.aux2, self.checksum()]
    }

    /// Parses a frame, rejecting it if the header checksum does not match
    pub fn from_bytes(bytes: &[u8; COMMAND_FRAME_LEN]) -> Result<Self> {
        let frame = CommandFrame {
            device: bytes[0],
            command: bytes[1],
            aux1: bytes[2],
            aux2: bytes[3],
        };
        if frame.checksum() != bytes[4] {
            return Err(Error::protocol(format!(
                "Command frame checksum mismatch: expected {:#04x}, got {:#04x}",
                frame.checksum(),
                bytes[4]
            )));
        }
        Ok(frame)
    }
}
