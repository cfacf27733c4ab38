//! Frame codec.
//!
//! Every message on the wire is a fixed 12-byte header followed by a JSON
//! payload:
//!
//! ```text
//! 0      4        5       6          8              12
//! +------+--------+-------+----------+--------------+---------------+
//! | BB84 | version| flags | reserved | payload_size | JSON payload  |
//! +------+--------+-------+----------+--------------+---------------+
//! ```
//!
//! `payload_size` is big-endian. The header is parsed in place with
//! `zerocopy`, so a reader can pull exactly `SIZE` bytes, inspect the payload
//! length, then read the rest.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U32},
};

use crate::error::ProtoError;

/// Frame magic, ASCII "BB84".
pub const MAGIC: [u8; 4] = *b"BB84";

/// Current wire version.
pub const VERSION: u8 = 1;

/// Largest payload accepted by the decoder.
pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

/// Fixed-size frame header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
#[repr(C)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    reserved: [u8; 2],
    payload_size: U32<BigEndian>,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 12;

    /// Header for a payload of the given length.
    pub fn new(payload_size: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            reserved: [0; 2],
            payload_size: U32::new(payload_size),
        }
    }

    /// Parse and validate a header from exactly [`Self::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self, ProtoError> {
        let header = Self::ref_from_bytes(bytes)
            .map_err(|_| ProtoError::Truncated { expected: Self::SIZE, actual: bytes.len() })?;
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), ProtoError> {
        if self.magic != MAGIC {
            return Err(ProtoError::InvalidMagic(self.magic));
        }
        if self.version != VERSION {
            return Err(ProtoError::UnsupportedVersion(self.version));
        }
        if self.payload_size() > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge {
                size: self.payload_size(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }

    /// Payload length announced by this header.
    pub fn payload_size(&self) -> u32 {
        self.payload_size.get()
    }

    /// Header flags (reserved, always zero in version 1).
    pub fn flags(&self) -> u8 {
        self.flags
    }
}

/// A header plus its JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Raw JSON payload
    pub payload: Bytes,
}

impl Frame {
    /// Serialize a message into a frame.
    pub fn from_message<T: Serialize>(message: &T) -> Result<Self, ProtoError> {
        let payload = serde_json::to_vec(message)?;
        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        if size > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge { size, max: MAX_PAYLOAD_SIZE });
        }

        Ok(Self { header: FrameHeader::new(size), payload: Bytes::from(payload) })
    }

    /// Deserialize the payload as a message.
    pub fn to_message<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Append the encoded frame to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.reserve(FrameHeader::SIZE + self.payload.len());
        buf.extend_from_slice(self.header.as_bytes());
        buf.extend_from_slice(&self.payload);
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        Bytes::from(buf)
    }

    /// Decode a complete frame (header and payload, nothing more).
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < FrameHeader::SIZE {
            return Err(ProtoError::Truncated { expected: FrameHeader::SIZE, actual: bytes.len() });
        }

        let (head, body) = bytes.split_at(FrameHeader::SIZE);
        let header = *FrameHeader::from_bytes(head)?;
        let expected = header.payload_size() as usize;

        if body.len() != expected {
            return Err(ProtoError::Truncated {
                expected: FrameHeader::SIZE + expected,
                actual: bytes.len(),
            });
        }

        Ok(Self { header, payload: Bytes::copy_from_slice(body) })
    }
}
