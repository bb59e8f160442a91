//! Fixed-width field codec for the packet payloads
//!
//! Every field on the wire is one of three little-endian primitives:
//! - 4-byte unsigned integers for entity ids and counts
//! - 4-byte IEEE-754 floats for coordinates
//! - 8-byte signed integers for health and wave indices
//!
//! Records are flat concatenations of these fields with no padding and no
//! length prefixes. Decoding never reads past the end of the buffer: a field
//! that would overrun yields [`WireError::TruncatedField`] and the caller is
//! expected to drop the whole packet.

use thiserror::Error;

/// Errors produced while decoding a packet
///
/// None of these are fatal to the process. A handler that receives one drops
/// the offending packet without applying any of its side effects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A field read would extend past the end of the buffer
    #[error("truncated field: need {width} bytes at offset {offset}, buffer holds {len}")]
    TruncatedField {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Datagram carried no tag byte at all
    #[error("empty packet")]
    EmptyPacket,

    /// First byte does not name a known packet
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),

    /// Payload is shorter than the fixed width its tag requires
    #[error("malformed payload for tag {tag}: {len} bytes")]
    MalformedPayload { tag: u8, len: usize },

    /// Client-event payload could not be deserialized
    #[error("invalid client event payload: {0}")]
    InvalidEvent(String),
}

/// A primitive that occupies a fixed number of bytes on the wire
pub trait WireField: Sized + Copy {
    /// Number of bytes this field occupies
    const WIDTH: usize;

    /// Appends the little-endian representation to `out`
    fn encode(&self, out: &mut Vec<u8>);

    /// Reads the field starting at `offset`
    fn decode(buf: &[u8], offset: usize) -> Result<Self, WireError>;
}

fn take<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], WireError> {
    let end = offset.checked_add(N).ok_or(WireError::TruncatedField {
        offset,
        width: N,
        len: buf.len(),
    })?;

    let bytes = buf.get(offset..end).ok_or(WireError::TruncatedField {
        offset,
        width: N,
        len: buf.len(),
    })?;

    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

impl WireField for u32 {
    const WIDTH: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8], offset: usize) -> Result<Self, WireError> {
        Ok(u32::from_le_bytes(take::<4>(buf, offset)?))
    }
}

impl WireField for f32 {
    const WIDTH: usize = 4;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8], offset: usize) -> Result<Self, WireError> {
        Ok(f32::from_le_bytes(take::<4>(buf, offset)?))
    }
}

impl WireField for i64 {
    const WIDTH: usize = 8;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8], offset: usize) -> Result<Self, WireError> {
        Ok(i64::from_le_bytes(take::<8>(buf, offset)?))
    }
}

/// Sequential reader over a payload slice
///
/// Tracks the current offset so record decoders can read fields one after the
/// other without doing offset arithmetic by hand.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn read<T: WireField>(&mut self) -> Result<T, WireError> {
        let value = T::decode(self.buf, self.offset)?;
        self.offset += T::WIDTH;
        Ok(value)
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A record made of fixed-width fields with a known total width
pub trait WireRecord: Sized {
    /// Stride of one record in bytes
    const WIDTH: usize;

    fn encode(&self, out: &mut Vec<u8>);

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self, WireError>;
}

/// Decodes as many complete records as the payload holds
///
/// An empty payload is an empty snapshot. A payload holding at least one
/// record yields every complete record and ignores a trailing partial one.
/// Anything shorter than a single record is malformed, so the packet is
/// dropped instead of reading as "no entities".
pub fn decode_records<R: WireRecord>(tag: u8, payload: &[u8]) -> Result<Vec<R>, WireError> {
    if !payload.is_empty() && payload.len() < R::WIDTH {
        return Err(WireError::MalformedPayload {
            tag,
            len: payload.len(),
        });
    }

    let mut reader = FieldReader::new(payload);
    let mut records = Vec::with_capacity(payload.len() / R::WIDTH.max(1));

    while reader.remaining() >= R::WIDTH {
        records.push(R::decode(&mut reader)?);
    }

    Ok(records)
}

/// Appends every record back to back
pub fn encode_records<R: WireRecord>(records: &[R], out: &mut Vec<u8>) {
    out.reserve(records.len() * R::WIDTH);
    for record in records {
        record.encode(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_roundtrip_boundaries() {
        for value in [0u32, 1, 42, u32::MAX] {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            assert_eq!(buf.len(), 4);
            assert_eq!(u32::decode(&buf, 0).unwrap(), value);
        }
    }

    #[test]
    fn test_f32_roundtrip_boundaries() {
        for value in [0.0f32, -0.0, f32::MIN, f32::MAX, f32::EPSILON, f32::MIN_POSITIVE] {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            let decoded = f32::decode(&buf, 0).unwrap();
            assert_eq!(decoded.to_bits(), value.to_bits());
        }

        let mut buf = Vec::new();
        f32::NAN.encode(&mut buf);
        assert!(f32::decode(&buf, 0).unwrap().is_nan());
    }

    #[test]
    fn test_i64_roundtrip_boundaries() {
        for value in [i64::MIN, -1, 0, 100, i64::MAX] {
            let mut buf = Vec::new();
            value.encode(&mut buf);
            assert_eq!(buf.len(), 8);
            assert_eq!(i64::decode(&buf, 0).unwrap(), value);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = Vec::new();
        0x0403_0201u32.encode(&mut buf);
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_truncated_field_reports_error() {
        let buf = [1u8, 2, 3];
        assert_eq!(
            u32::decode(&buf, 0),
            Err(WireError::TruncatedField {
                offset: 0,
                width: 4,
                len: 3
            })
        );
        assert!(i64::decode(&[0u8; 7], 0).is_err());
        assert!(f32::decode(&[0u8; 8], 5).is_err());
    }

    #[test]
    fn test_offset_overflow_is_truncation() {
        let buf = [0u8; 8];
        assert!(u32::decode(&buf, usize::MAX - 1).is_err());
    }

    #[test]
    fn test_field_reader_sequence() {
        let mut buf = Vec::new();
        7u32.encode(&mut buf);
        1.5f32.encode(&mut buf);
        (-9i64).encode(&mut buf);

        let mut reader = FieldReader::new(&buf);
        assert_eq!(reader.read::<u32>().unwrap(), 7);
        assert_eq!(reader.read::<f32>().unwrap(), 1.5);
        assert_eq!(reader.read::<i64>().unwrap(), -9);
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.offset(), 16);
        assert!(reader.read::<u32>().is_err());
    }
}
