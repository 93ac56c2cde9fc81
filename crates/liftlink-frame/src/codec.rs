use bytes::{BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_XMODEM};

use crate::error::{FrameError, Result};

/// Start-of-frame marker byte.
pub const SOF_BYTE: u8 = 0x01;

/// Frame header: SOF (1) + ID (1) + LEN (2) + TYPE (1) + HEAD_CRC (2) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Default maximum payload size accepted on receive.
///
/// Sized for the command/response/event payloads the device firmware
/// exchanges; both link endpoints must agree on it.
pub const MAX_PAYLOAD: usize = 128;

/// CRC-16/XMODEM (poly 0x1021, init 0x0000), shared by both link endpoints.
pub(crate) static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// One decoded unit of the wire protocol.
///
/// Immutable once handed to a listener; the payload is cheaply cloneable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation id, peer-scoped and wrapping.
    pub id: u8,
    /// Message type tag.
    pub frame_type: u8,
    /// Checksum-verified payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: u8, id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            frame_type,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame.
    ///
    /// Frames with an empty payload omit the payload checksum entirely.
    pub fn wire_size(&self) -> usize {
        if self.payload.is_empty() {
            HEADER_SIZE
        } else {
            HEADER_SIZE + self.payload.len() + 2
        }
    }
}

/// Encode a frame into the wire format.
///
/// Pure and stateless given its inputs. Multi-byte fields are big-endian —
/// the byte order is a compile-time contract with the device end of the
/// link. The head CRC covers `SOF..TYPE` inclusive; the payload CRC covers
/// the payload bytes only and is omitted when the payload is empty.
pub fn encode_frame(frame_type: u8, id: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + payload.len() + 2);

    let head_start = dst.len();
    dst.put_u8(SOF_BYTE);
    dst.put_u8(id);
    dst.put_u16(payload.len() as u16);
    dst.put_u8(frame_type);
    let head_crc = CRC16.checksum(&dst[head_start..]);
    dst.put_u16(head_crc);

    if !payload.is_empty() {
        dst.put_slice(payload);
        dst.put_u16(CRC16.checksum(payload));
    }

    Ok(())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size accepted on receive. Default: [`MAX_PAYLOAD`].
    pub max_payload: usize,
    /// Ticks a mid-frame parse may sit idle before being discarded.
    pub parser_timeout_ticks: u16,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
            parser_timeout_ticks: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout_matches_wire_contract() {
        let mut buf = BytesMut::new();
        encode_frame(0x03, 0x85, b"ab", &mut buf).unwrap();

        assert_eq!(buf[0], SOF_BYTE);
        assert_eq!(buf[1], 0x85);
        assert_eq!(&buf[2..4], &[0x00, 0x02]); // LEN, big-endian
        assert_eq!(buf[4], 0x03);
        let head_crc = u16::from_be_bytes([buf[5], buf[6]]);
        assert_eq!(head_crc, CRC16.checksum(&buf[0..5]));
        assert_eq!(&buf[7..9], b"ab");
        let payload_crc = u16::from_be_bytes([buf[9], buf[10]]);
        assert_eq!(payload_crc, CRC16.checksum(b"ab"));
        assert_eq!(buf.len(), HEADER_SIZE + 2 + 2);
    }

    #[test]
    fn empty_payload_omits_payload_checksum() {
        let mut buf = BytesMut::new();
        encode_frame(0x01, 0x00, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; u16::MAX as usize + 1];
        let result = encode_frame(0x02, 0x01, &payload, &mut buf);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn frame_wire_size() {
        assert_eq!(Frame::new(1, 1, Bytes::from_static(b"test")).wire_size(), 13);
        assert_eq!(Frame::new(1, 1, Bytes::new()).wire_size(), HEADER_SIZE);
    }
}
