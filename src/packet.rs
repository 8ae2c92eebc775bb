//! Wire codec for collective offload frames.
//!
//! Every frame is a fixed-length buffer: an 8-byte metadata header followed
//! by `N` little-endian `u32` payload elements.
//!
//! ```text
//! offset  size  field
//! 0       2     collective identifier (little-endian)
//! 2       1     collective type
//! 3       1     operation code
//! 4       2     reserved, zero
//! 6       1     maximum recursion level
//! 7       1     current level
//! 8       4*N   payload elements (u32, little-endian)
//! ```
//!
//! The codec is pure: it never performs I/O and never panics on untrusted
//! input. Decoding is only defined for buffers of exactly
//! [`PacketLayout::frame_len`] bytes.

use std::fmt::{self, Write as _};

use thiserror::Error;

/// Size of the metadata header in bytes.
pub const METADATA_LEN: usize = 8;

/// Size of one payload element in bytes.
pub const BYTES_PER_ELEMENT: usize = 4;

/// Element count used by the reference hardware configuration.
pub const REFERENCE_ELEMENT_COUNT: usize = 256;

/// Per-level payload: one `u32` per element.
pub type Payload = Vec<u32>;

/// Errors produced by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer length does not match the fixed frame length.
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Required frame length.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Payload element count does not match the layout.
    #[error("payload has {actual} elements, layout requires {expected}")]
    PayloadLength {
        /// Element count required by the layout.
        expected: usize,
        /// Element count that was supplied.
        actual: usize,
    },
}

/// Metadata header carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketMeta {
    /// Collective identifier.
    pub collective_id: u16,
    /// Collective type.
    pub collective_type: u8,
    /// Operation code (e.g. `0x05` for ADD).
    pub op_code: u8,
    /// Highest recursion level of the run.
    pub max_level: u8,
    /// Level this frame belongs to.
    pub level: u8,
}

impl PacketMeta {
    /// Returns a copy with the current level replaced.
    #[must_use]
    pub const fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    fn write(&self, out: &mut [u8]) {
        out[0..2].copy_from_slice(&self.collective_id.to_le_bytes());
        out[2] = self.collective_type;
        out[3] = self.op_code;
        out[4] = 0;
        out[5] = 0;
        out[6] = self.max_level;
        out[7] = self.level;
    }

    fn read(header: &[u8]) -> Self {
        Self {
            collective_id: u16::from_le_bytes([header[0], header[1]]),
            collective_type: header[2],
            op_code: header[3],
            max_level: header[6],
            level: header[7],
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Metadata header.
    pub meta: PacketMeta,
    /// Payload elements.
    pub payload: Payload,
}

/// Fixed frame geometry for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketLayout {
    element_count: usize,
}

impl Default for PacketLayout {
    fn default() -> Self {
        Self::new(REFERENCE_ELEMENT_COUNT)
    }
}

impl PacketLayout {
    /// Creates a layout carrying `element_count` payload elements.
    #[must_use]
    pub const fn new(element_count: usize) -> Self {
        Self { element_count }
    }

    /// Number of `u32` elements per payload.
    #[must_use]
    pub const fn element_count(&self) -> usize {
        self.element_count
    }

    /// Payload size in bytes.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.element_count * BYTES_PER_ELEMENT
    }

    /// Total frame size in bytes.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        METADATA_LEN + self.payload_len()
    }

    /// Encodes a frame into a freshly allocated buffer.
    pub fn encode(&self, meta: &PacketMeta, payload: &[u32]) -> Result<Vec<u8>, PacketError> {
        let mut buf = vec![0_u8; self.frame_len()];
        self.encode_into(meta, payload, &mut buf)?;
        Ok(buf)
    }

    /// Encodes a frame into `out`, which must be exactly one frame long.
    pub fn encode_into(
        &self,
        meta: &PacketMeta,
        payload: &[u32],
        out: &mut [u8],
    ) -> Result<(), PacketError> {
        if payload.len() != self.element_count {
            return Err(PacketError::PayloadLength {
                expected: self.element_count,
                actual: payload.len(),
            });
        }
        if out.len() != self.frame_len() {
            return Err(PacketError::Malformed {
                expected: self.frame_len(),
                actual: out.len(),
            });
        }

        let (header, body) = out.split_at_mut(METADATA_LEN);
        meta.write(header);
        for (chunk, value) in body.chunks_exact_mut(BYTES_PER_ELEMENT).zip(payload) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Decodes a frame.
    pub fn decode(&self, bytes: &[u8]) -> Result<Packet, PacketError> {
        if bytes.len() != self.frame_len() {
            return Err(PacketError::Malformed {
                expected: self.frame_len(),
                actual: bytes.len(),
            });
        }

        let (header, body) = bytes.split_at(METADATA_LEN);
        let payload = body
            .chunks_exact(BYTES_PER_ELEMENT)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Packet {
            meta: PacketMeta::read(header),
            payload,
        })
    }
}

/// Names of the metadata bytes, indexed by offset.
const METADATA_FIELDS: [MetaField; METADATA_LEN] = [
    MetaField::CollectiveId,
    MetaField::CollectiveId,
    MetaField::CollectiveType,
    MetaField::OpCode,
    MetaField::Reserved,
    MetaField::Reserved,
    MetaField::MaxLevel,
    MetaField::Level,
];

/// Metadata field a byte offset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    /// Bytes 0..2.
    CollectiveId,
    /// Byte 2.
    CollectiveType,
    /// Byte 3.
    OpCode,
    /// Bytes 4..6.
    Reserved,
    /// Byte 6.
    MaxLevel,
    /// Byte 7.
    Level,
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CollectiveId => "collective_id",
            Self::CollectiveType => "collective_type",
            Self::OpCode => "op_code",
            Self::Reserved => "reserved",
            Self::MaxLevel => "max_level",
            Self::Level => "level",
        };
        f.write_str(name)
    }
}

/// Where in the frame a mismatch was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchRegion {
    /// A metadata byte.
    Metadata {
        /// Field owning the byte.
        field: MetaField,
    },
    /// A payload byte.
    Payload {
        /// Element index, `(offset - 8) / 4`.
        element: usize,
        /// Byte position within the element.
        byte_in_element: usize,
        /// Full expected element value.
        expected_element: u32,
        /// Full observed element value.
        actual_element: u32,
    },
}

/// First differing byte between an expected and an observed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Byte offset of the first difference.
    pub offset: usize,
    /// Expected byte.
    pub expected: u8,
    /// Observed byte.
    pub actual: u8,
    /// Classification of the offset.
    pub region: MismatchRegion,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "byte {}: expected 0x{:02x}, got 0x{:02x}",
            self.offset, self.expected, self.actual
        )?;
        match self.region {
            MismatchRegion::Metadata { field } => write!(f, " (metadata {field})"),
            MismatchRegion::Payload {
                element,
                byte_in_element,
                expected_element,
                actual_element,
            } => write!(
                f,
                " (element {element}, byte {byte_in_element}: expected 0x{expected_element:08x}, got 0x{actual_element:08x})"
            ),
        }
    }
}

/// Finds and classifies the first differing byte of two equal-length frames.
///
/// Returns `None` when the frames are identical. Only the common prefix is
/// compared; length disagreements are the caller's concern.
#[must_use]
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<Mismatch> {
    let offset = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)?;

    let region = if offset < METADATA_LEN {
        MismatchRegion::Metadata {
            field: METADATA_FIELDS[offset],
        }
    } else {
        let rel = offset - METADATA_LEN;
        let element = rel / BYTES_PER_ELEMENT;
        let start = METADATA_LEN + element * BYTES_PER_ELEMENT;
        MismatchRegion::Payload {
            element,
            byte_in_element: rel % BYTES_PER_ELEMENT,
            expected_element: read_element(expected, start),
            actual_element: read_element(actual, start),
        }
    };

    Some(Mismatch {
        offset,
        expected: expected[offset],
        actual: actual[offset],
        region,
    })
}

fn read_element(bytes: &[u8], start: usize) -> u32 {
    let mut word = [0_u8; BYTES_PER_ELEMENT];
    for (i, slot) in word.iter_mut().enumerate() {
        *slot = bytes.get(start + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(word)
}

/// Formats a buffer as hex, sixteen bytes per row with a gap after eight.
#[must_use]
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3 + bytes.len() / 8);
    for (i, byte) in bytes.iter().enumerate() {
        let _ = write!(out, "{byte:02x} ");
        if (i + 1) % 16 == 0 {
            out.push('\n');
        } else if (i + 1) % 8 == 0 {
            out.push(' ');
        }
    }
    if bytes.len() % 16 != 0 {
        out.push('\n');
    }
    out
}
