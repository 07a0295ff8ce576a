use crate::aa55::packet::{frame_len, HEADER_LEN};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Splits complete AA55 frames off an accumulation buffer. The declared
/// payload length sits right after the header; nothing else is validated
/// here, that's the codec's job once a whole frame is in hand.
#[derive(Debug, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Bytes a complete frame will have, once the length byte is buffered.
    pub fn expected_len(buf: &[u8]) -> Option<usize> {
        buf.get(HEADER_LEN).map(|len| frame_len(*len))
    }
}

impl Decoder for FrameDecoder {
    type Item = BytesMut;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame_len = match Self::expected_len(src) {
            Some(len) => len,
            None => return Ok(None),
        };

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(frame_len)))
    }
}
