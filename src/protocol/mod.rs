//! Command-frame protocol
//!
//! This module defines the SIO command and data frames, their codec, the
//! handshake bytes sent back to the host and the per-exchange state machine
//! that dispatches commands to a [`Device`].

pub mod codec;
pub mod frame;
pub mod handler;

pub use self::codec::CommandFrameCodec;
pub use self::frame::{checksum, data_frame, CommandFrame, COMMAND_FRAME_LEN};
pub use self::handler::{
    CommandTable, Device, ExchangeOutcome, ExchangeState, FrameHandler, Operation,
};

use tracing::trace;

use crate::core::Result;
use crate::transport::Port;

/// Command accepted
pub const ACK: u8 = b'A';

/// Command rejected
pub const NAK: u8 = b'N';

/// Operation finished successfully, precedes any reply data
pub const COMPLETE: u8 = b'C';

/// Operation failed after it was accepted
pub const ERROR: u8 = b'E';

/// Handshake signals sent to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Command accepted, processing starts immediately
    Ack,
    /// Command accepted once its payload has been validated
    LateAck,
    /// Bad checksum or unknown command
    Nak,
    /// Operation succeeded
    Complete,
    /// Operation failed
    Error,
}

impl Handshake {
    /// Byte transmitted on the bus for this signal
    ///
    /// The deferred acknowledge uses the same byte as a plain one; the host
    /// tells them apart by when it arrives.
    pub fn byte(self) -> u8 {
        match self {
            Handshake::Ack | Handshake::LateAck => ACK,
            Handshake::Nak => NAK,
            Handshake::Complete => COMPLETE,
            Handshake::Error => ERROR,
        }
    }
}

/// Sends a single handshake byte
pub fn send_handshake(port: &mut dyn Port, handshake: Handshake) -> Result<()> {
    trace!("handshake {:?}", handshake);
    port.write_byte(handshake.byte())?;
    Ok(())
}

/// Sends `Complete` followed by `data` as a checksummed data frame
pub fn send_reply(port: &mut dyn Port, data: &[u8]) -> Result<()> {
    send_handshake(port, Handshake::Complete)?;
    port.write(&data_frame(data))?;
    port.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryPort;

    #[test]
    fn test_handshake_bytes() {
        assert_eq!(Handshake::Ack.byte(), 0x41);
        assert_eq!(Handshake::Nak.byte(), 0x4E);
        assert_eq!(Handshake::Complete.byte(), 0x43);
        assert_eq!(Handshake::Error.byte(), 0x45);
        assert_eq!(Handshake::LateAck.byte(), ACK);
    }

    #[test]
    fn test_send_reply() {
        let mut port = MemoryPort::new(19200);
        send_reply(&mut port, &[1, 2, 3]).unwrap();
        assert_eq!(port.tx(), &[COMPLETE, 1, 2, 3, 6]);
    }
}
