use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{CommandFrame, COMMAND_FRAME_LEN};
use crate::core::Error;

/// Codec for 5-byte SIO command frames
///
/// A frame whose checksum does not match is reported as a protocol error
/// after dropping its first byte, so decoding resynchronises on the next
/// byte boundary.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandFrameCodec;

impl CommandFrameCodec {
    pub fn new() -> Self {
        CommandFrameCodec
    }
}

impl Decoder for CommandFrameCodec {
    type Item = CommandFrame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < COMMAND_FRAME_LEN {
            return Ok(None);
        }

        let mut header = [0u8; COMMAND_FRAME_LEN];
        header.copy_from_slice(&src[..COMMAND_FRAME_LEN]);

        match CommandFrame::from_bytes(&header) {
            Ok(frame) => {
                src.advance(COMMAND_FRAME_LEN);
                Ok(Some(frame))
            }
            Err(e) => {
                src.advance(1);
                Err(e)
            }
        }
    }
}

impl Encoder<CommandFrame> for CommandFrameCodec {
    type Error = Error;

    fn encode(&mut self, item: CommandFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(COMMAND_FRAME_LEN);
        dst.put_slice(&item.to_bytes());
        Ok(())
    }
}
