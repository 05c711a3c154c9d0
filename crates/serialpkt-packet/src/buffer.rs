use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::descriptor::PacketDescriptor;
use crate::error::PacketError;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Outcome of feeding one byte to a [`ReceiveBuffer`].
#[derive(Debug)]
pub enum BufferStep {
    /// No packet yet; the byte is retained.
    Pending,
    /// The buffer formed a packet and was reset.
    Packet(Bytes),
    /// The buffer exceeded its bound without matching and was reset.
    Overflow { len: usize, max: usize },
    /// The descriptor's evaluator failed; the buffer is left as it was.
    Failed(PacketError),
}

/// Accumulates bytes for a single packet descriptor.
///
/// A buffer never holds bytes that were already emitted as part of a packet
/// from the same descriptor.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Append one byte and evaluate the descriptor against the result.
    ///
    /// For prefixed descriptors leading bytes that can no longer start a
    /// packet are discarded before evaluation.
    pub fn push<U>(
        &mut self,
        descriptor: &PacketDescriptor<U>,
        byte: u8,
        max_len: Option<usize>,
    ) -> BufferStep {
        self.buf.put_u8(byte);

        if descriptor.prefix().is_some() {
            while !self.buf.is_empty() && !descriptor.could_start_packet(&self.buf) {
                self.buf.advance(1);
            }
        }

        match descriptor.is_valid_packet(&self.buf) {
            Ok(true) => BufferStep::Packet(self.buf.split().freeze()),
            Ok(false) => match max_len {
                Some(max) if self.buf.len() > max => {
                    let len = self.buf.len();
                    self.buf.clear();
                    BufferStep::Overflow { len, max }
                }
                _ => BufferStep::Pending,
            },
            Err(err) => BufferStep::Failed(err),
        }
    }

    /// Append bytes without evaluating them. They are looked at again when
    /// the next byte arrives.
    ///
    /// The bound still applies: returns [`BufferStep::Overflow`] and resets
    /// if the buffer ends up past `max_len`, otherwise [`BufferStep::Pending`].
    pub fn extend_unevaluated(&mut self, bytes: &[u8], max_len: Option<usize>) -> BufferStep {
        self.buf.extend_from_slice(bytes);
        match max_len {
            Some(max) if self.buf.len() > max => {
                let len = self.buf.len();
                self.buf.clear();
                BufferStep::Overflow { len, max }
            }
            _ => BufferStep::Pending,
        }
    }

    /// Bytes currently held.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
