//! BKRP framing.
//!
//! Every message travels in one frame: a fixed 18-byte big-endian header,
//! a reserved extension area, then the JSON payload.
//!
//! ```text
//! offset  size  field
//!      0     4  magic "BKRP"
//!      4     2  protocol version
//!      6     2  flags (CRC, STREAM, END_STREAM)
//!      8     2  extension length; skipped by this version
//!     10     4  payload length
//!     14     4  CRC32C of the payload, 0 when the CRC flag is clear
//!     18     .  extension bytes, then payload bytes
//! ```
//!
//! A LIST_BOOKS reply is a run of `STREAM` frames, one book each, closed
//! by a response frame carrying `STREAM | END_STREAM`.

use crate::error::ProtocolError;
use crate::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame magic: "BKRP"
pub const MAGIC: [u8; 4] = *b"BKRP";

/// Size of the fixed frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 18;

/// Frame flags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u16);

impl FrameFlags {
    /// Payload checksum is set.
    pub const CRC_PRESENT: u16 = 1 << 0;
    /// Frame belongs to a LIST_BOOKS reply.
    pub const STREAM: u16 = 1 << 2;
    /// Closing frame of a LIST_BOOKS reply.
    pub const END_STREAM: u16 = 1 << 3;

    const KNOWN: u16 = Self::CRC_PRESENT | Self::STREAM | Self::END_STREAM;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_crc(self) -> Self {
        Self(self.0 | Self::CRC_PRESENT)
    }

    pub fn with_stream(self) -> Self {
        Self(self.0 | Self::STREAM)
    }

    pub fn with_end_stream(self) -> Self {
        Self(self.0 | Self::STREAM | Self::END_STREAM)
    }

    pub fn has_crc(&self) -> bool {
        self.0 & Self::CRC_PRESENT != 0
    }

    pub fn is_stream(&self) -> bool {
        self.0 & Self::STREAM != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & Self::END_STREAM != 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Parses flags read off the wire. Unknown bits and END_STREAM without
    /// STREAM are rejected.
    pub fn from_bits(bits: u16) -> Result<Self, ProtocolError> {
        let end_without_stream = bits & Self::END_STREAM != 0 && bits & Self::STREAM == 0;
        if bits & !Self::KNOWN != 0 || end_without_stream {
            return Err(ProtocolError::InvalidFlags(bits));
        }
        Ok(Self(bits))
    }
}

/// The fixed part of a frame, as read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    version: u16,
    flags: FrameFlags,
    extension_len: usize,
    payload_len: usize,
    crc: u32,
}

impl FrameHeader {
    /// Validates the first [`FRAME_HEADER_SIZE`] bytes of `raw`.
    fn parse(mut raw: &[u8]) -> Result<Self, ProtocolError> {
        let mut magic = [0u8; 4];
        raw.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let version = raw.get_u16();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let flags = FrameFlags::from_bits(raw.get_u16())?;
        let extension_len = raw.get_u16() as usize;
        let payload_len = raw.get_u32();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            version,
            flags,
            extension_len,
            payload_len: payload_len as usize,
            crc: raw.get_u32(),
        })
    }

    fn frame_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.extension_len + self.payload_len
    }
}

/// One decoded BKRP frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub version: u16,
    pub flags: FrameFlags,
    /// JSON document.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a checksummed frame around `payload`.
    pub fn new(payload: Bytes) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            flags: FrameFlags::new().with_crc(),
            payload,
        }
    }

    /// Serializes `value` as the frame payload.
    pub fn from_json<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Self::new(Bytes::from(serde_json::to_vec(value)?)))
    }

    /// Replaces the frame flags, keeping the CRC bit.
    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags.with_crc();
        self
    }

    /// Number of bytes [`Frame::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Writes the frame. No extension bytes are emitted.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: u32::try_from(self.payload.len()).unwrap_or(u32::MAX),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let crc = if self.flags.has_crc() {
            crc32c::crc32c(&self.payload)
        } else {
            0
        };

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&MAGIC);
        buf.put_u16(self.version);
        buf.put_u16(self.flags.bits());
        buf.put_u16(0);
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(crc);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Takes one complete frame off the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched while the frame is
    /// still incomplete.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let header = FrameHeader::parse(&buf[..FRAME_HEADER_SIZE])?;
        if buf.len() < header.frame_len() {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE + header.extension_len);
        let payload = buf.split_to(header.payload_len).freeze();

        if header.flags.has_crc() {
            let actual = crc32c::crc32c(&payload);
            if actual != header.crc {
                return Err(ProtocolError::CrcMismatch {
                    expected: header.crc,
                    actual,
                });
            }
        }

        Ok(Some(Self {
            version: header.version,
            flags: header.flags,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn raw_header(magic: &[u8; 4], version: u16, flags: u16, ext: u16, len: u32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(magic);
        buf.put_u16(version);
        buf.put_u16(flags);
        buf.put_u16(ext);
        buf.put_u32(len);
        buf.put_u32(0);
        buf
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = Bytes::from(r#"{"type":"request","id":"1","op":"GET_BOOK","params":{}}"#);
        let frame = Frame::new(payload.clone());

        let mut buf = frame.encode().unwrap();
        assert_eq!(buf.len(), frame.encoded_len());
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert!(decoded.flags.has_crc());
        assert_eq!(decoded.payload, payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_crc_validation() {
        let frame = Frame::new(Bytes::from(r#"{"isbn":"0441013597"}"#));
        let mut encoded = frame.encode().unwrap();

        let len = encoded.len();
        encoded[len - 1] ^= 0xFF;

        let result = Frame::decode(&mut encoded);
        assert!(matches!(result, Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn test_invalid_magic() {
        let mut buf = raw_header(b"RCPX", 1, 0, 0, 0);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::InvalidMagic(m)) if &m == b"RCPX"));
    }

    #[test]
    fn test_incomplete_header() {
        let mut buf = BytesMut::from(&b"BKRP\x00\x01\x00\x01"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_incomplete_payload_leaves_buffer() {
        let encoded = Frame::new(Bytes::from(r#"{"value":"0441013597"}"#))
            .encode()
            .unwrap();
        let mut buf = BytesMut::from(&encoded[..encoded.len() - 3]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), encoded.len() - 3);
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf = raw_header(&MAGIC, 99, 0, 0, 0);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_oversized_length_rejected_before_payload_arrives() {
        let mut buf = raw_header(&MAGIC, 1, 0, 0, MAX_PAYLOAD_SIZE + 1);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_stream_flags_survive_encoding() {
        let frame = Frame::new(Bytes::from(r#"{"type":"item"}"#))
            .with_flags(FrameFlags::new().with_stream());
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.flags.is_stream());
        assert!(!decoded.flags.is_end_stream());
        assert!(decoded.flags.has_crc());

        let last = Frame::new(Bytes::from(r#"{"type":"response"}"#))
            .with_flags(FrameFlags::new().with_end_stream());
        let mut buf = last.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.flags.is_stream());
        assert!(decoded.flags.is_end_stream());
    }

    #[test]
    fn test_invalid_flags() {
        assert!(matches!(
            FrameFlags::from_bits(0x0100),
            Err(ProtocolError::InvalidFlags(0x0100))
        ));
        // END_STREAM alone
        assert!(matches!(
            FrameFlags::from_bits(FrameFlags::END_STREAM),
            Err(ProtocolError::InvalidFlags(_))
        ));
        assert!(FrameFlags::from_bits(FrameFlags::STREAM | FrameFlags::END_STREAM).is_ok());
    }

    #[test]
    fn test_frame_too_large() {
        let huge_payload = vec![0u8; (MAX_PAYLOAD_SIZE + 1) as usize];
        let frame = Frame::new(Bytes::from(huge_payload));
        assert!(matches!(
            frame.encode(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_frame_without_crc() {
        let mut frame = Frame::new(Bytes::from(r#"{"test":true}"#));
        frame.flags = FrameFlags::new();

        let mut buf = frame.encode().unwrap();
        assert_eq!(&buf[14..18], &[0, 0, 0, 0]);
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(!decoded.flags.has_crc());
    }

    #[test]
    fn test_extension_bytes_are_skipped() {
        let payload = br#"{"ok":true}"#;
        let mut buf = raw_header(&MAGIC, 1, 0, 4, payload.len() as u32);
        buf.put_slice(b"xxxx");
        buf.put_slice(payload);

        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let frame1 = Frame::new(Bytes::from(r#"{"id":"1"}"#));
        let frame2 = Frame::new(Bytes::from(r#"{"id":"2"}"#));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame1.encode().unwrap());
        buf.extend_from_slice(&frame2.encode().unwrap());

        let decoded1 = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded1.payload.as_ref(), br#"{"id":"1"}"#);

        let decoded2 = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded2.payload.as_ref(), br#"{"id":"2"}"#);
    }

    proptest! {
        // A frame delivered in two arbitrary chunks decodes to the same payload.
        #[test]
        fn prop_split_delivery(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            split in 0usize..600,
        ) {
            let encoded = Frame::new(Bytes::from(payload.clone())).encode().unwrap();
            let split = split.min(encoded.len());

            let mut buf = BytesMut::from(&encoded[..split]);
            let first = Frame::decode(&mut buf).unwrap();
            if split < encoded.len() {
                prop_assert!(first.is_none());
                buf.extend_from_slice(&encoded[split..]);
                let frame = Frame::decode(&mut buf).unwrap().unwrap();
                prop_assert_eq!(frame.payload.as_ref(), &payload[..]);
            } else {
                let frame = first.unwrap();
                prop_assert_eq!(frame.payload.as_ref(), &payload[..]);
            }
        }
    }
}
