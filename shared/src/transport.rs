//! Transport selection and stream framing
//!
//! Datagram transports carry one packet per datagram. Stream transports need
//! a frame boundary, so each packet is prefixed with its length as a 4-byte
//! little-endian integer. The packet bytes inside a frame are identical to the
//! datagram form.

use crate::wire::{WireError, WireField};
use clap::ValueEnum;

/// Largest packet either side will accept
pub const MAX_PACKET_SIZE: usize = 2048;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Unreliable datagrams
    Udp,
    /// Reliable, length-framed stream
    Tcp,
}

impl TransportKind {
    pub fn is_reliable(&self) -> bool {
        matches!(self, TransportKind::Tcp)
    }
}

/// Wraps a packet in a length-prefixed frame
pub fn frame(packet: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LENGTH_PREFIX + packet.len());
    (packet.len() as u32).encode(&mut out);
    out.extend_from_slice(packet);
    out
}

/// Reassembles length-prefixed frames from a byte stream
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, if one has fully arrived
    ///
    /// A length above [`MAX_PACKET_SIZE`] means the stream is out of sync and
    /// is reported as an error; the caller should close the connection.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        if self.pending.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::decode(&self.pending, 0)? as usize;
        if len > MAX_PACKET_SIZE {
            return Err(WireError::MalformedPayload { tag: 0, len });
        }

        if self.pending.len() < LENGTH_PREFIX + len {
            return Ok(None);
        }

        let packet = self.pending[LENGTH_PREFIX..LENGTH_PREFIX + len].to_vec();
        self.pending.drain(..LENGTH_PREFIX + len);
        Ok(Some(packet))
    }
}
