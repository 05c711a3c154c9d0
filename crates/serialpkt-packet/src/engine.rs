use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferStep, ReceiveBuffer};
use crate::descriptor::{DescriptorId, PacketDescriptor};
use crate::error::PacketError;

/// Default bound on a single receive buffer: 64 KiB.
pub const DEFAULT_MAX_BUFFER_LEN: usize = 64 * 1024;

/// Configuration for the packetizing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reset a receive buffer that grows past this many bytes without
    /// matching. `None` lets buffers grow without bound. Default: 64 KiB.
    pub max_buffer_len: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_buffer_len: Some(DEFAULT_MAX_BUFFER_LEN),
        }
    }
}

/// A complete packet and the descriptor that recognised it.
pub struct ReceivedPacket<U> {
    /// The matching descriptor.
    pub descriptor: Arc<PacketDescriptor<U>>,
    /// Packet bytes, exactly as accumulated at the moment of the match.
    pub data: Bytes,
}

impl<U> ReceivedPacket<U> {
    pub fn descriptor_id(&self) -> DescriptorId {
        self.descriptor.id()
    }

    pub fn user_info(&self) -> &U {
        self.descriptor.user_info()
    }
}

impl<U> Clone for ReceivedPacket<U> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            data: self.data.clone(),
        }
    }
}

impl<U: fmt::Debug> fmt::Debug for ReceivedPacket<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedPacket")
            .field("descriptor", &self.descriptor.id())
            .field("user_info", self.descriptor.user_info())
            .field("data", &self.data)
            .finish()
    }
}

/// Something the engine has to report after processing a chunk.
#[derive(Debug)]
pub enum EngineEvent<U> {
    /// A descriptor recognised a packet.
    Packet(ReceivedPacket<U>),
    /// A descriptor's buffer exceeded the configured bound and was reset.
    Overflow {
        descriptor_id: DescriptorId,
        len: usize,
        max: usize,
    },
    /// A descriptor's evaluator failed. Its buffer is preserved for the next chunk.
    EvaluationFailed {
        descriptor_id: DescriptorId,
        error: PacketError,
    },
}

struct Slot<U> {
    descriptor: Arc<PacketDescriptor<U>>,
    buffer: ReceiveBuffer,
}

/// Fans incoming bytes out to one receive buffer per registered descriptor.
///
/// Descriptors are evaluated independently and in registration order. The
/// same raw bytes may complete packets for several descriptors.
pub struct PacketizingEngine<U = ()> {
    slots: Vec<Slot<U>>,
    config: EngineConfig,
}

impl<U> Default for PacketizingEngine<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> PacketizingEngine<U> {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            slots: Vec::new(),
            config,
        }
    }

    /// Register a descriptor and give it an empty receive buffer.
    pub fn register(&mut self, descriptor: PacketDescriptor<U>) -> DescriptorId {
        self.register_shared(Arc::new(descriptor))
    }

    /// Register a descriptor that is also held elsewhere.
    ///
    /// Registering a descriptor that is already present does nothing.
    pub fn register_shared(&mut self, descriptor: Arc<PacketDescriptor<U>>) -> DescriptorId {
        let id = descriptor.id();
        if self.is_registered(id) {
            trace!(descriptor = %id, "descriptor already registered");
            return id;
        }

        debug!(descriptor = %id, rule = ?descriptor.rule(), "registered packet descriptor");
        self.slots.push(Slot {
            descriptor,
            buffer: ReceiveBuffer::new(),
        });
        id
    }

    /// Remove a descriptor together with its buffered bytes.
    pub fn deregister(&mut self, id: DescriptorId) -> Option<Arc<PacketDescriptor<U>>> {
        let index = self.slots.iter().position(|s| s.descriptor.id() == id)?;
        let slot = self.slots.remove(index);
        debug!(
            descriptor = %id,
            dropped = slot.buffer.len(),
            "deregistered packet descriptor"
        );
        Some(slot.descriptor)
    }

    /// Feed a chunk of incoming bytes.
    ///
    /// Each descriptor sees the chunk one byte at a time, so emitted packets do
    /// not depend on how the transport split the stream.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<EngineEvent<U>> {
        let mut events = Vec::new();
        if chunk.is_empty() || self.slots.is_empty() {
            return events;
        }

        trace!(len = chunk.len(), descriptors = self.slots.len(), "processing chunk");
        let max_len = self.config.max_buffer_len;

        for slot in &mut self.slots {
            for (index, &byte) in chunk.iter().enumerate() {
                match slot.buffer.push(&slot.descriptor, byte, max_len) {
                    BufferStep::Pending => {}
                    BufferStep::Packet(data) => {
                        debug!(
                            descriptor = %slot.descriptor.id(),
                            len = data.len(),
                            "packet received"
                        );
                        events.push(EngineEvent::Packet(ReceivedPacket {
                            descriptor: Arc::clone(&slot.descriptor),
                            data,
                        }));
                    }
                    BufferStep::Overflow { len, max } => {
                        warn!(
                            descriptor = %slot.descriptor.id(),
                            len,
                            max,
                            "receive buffer overflow, discarding"
                        );
                        events.push(EngineEvent::Overflow {
                            descriptor_id: slot.descriptor.id(),
                            len,
                            max,
                        });
                    }
                    BufferStep::Failed(error) => {
                        warn!(
                            descriptor = %slot.descriptor.id(),
                            %error,
                            "packet evaluation failed"
                        );
                        let rest = slot.buffer.extend_unevaluated(&chunk[index + 1..], max_len);
                        events.push(EngineEvent::EvaluationFailed {
                            descriptor_id: slot.descriptor.id(),
                            error,
                        });
                        if let BufferStep::Overflow { len, max } = rest {
                            warn!(
                                descriptor = %slot.descriptor.id(),
                                len,
                                max,
                                "receive buffer overflow, discarding"
                            );
                            events.push(EngineEvent::Overflow {
                                descriptor_id: slot.descriptor.id(),
                                len,
                                max,
                            });
                        }
                        break;
                    }
                }
            }
        }

        events
    }

    /// Whether `id` is registered.
    pub fn is_registered(&self, id: DescriptorId) -> bool {
        self.slots.iter().any(|s| s.descriptor.id() == id)
    }

    /// Look up a registered descriptor.
    pub fn descriptor(&self, id: DescriptorId) -> Option<&Arc<PacketDescriptor<U>>> {
        self.slots
            .iter()
            .find(|s| s.descriptor.id() == id)
            .map(|s| &s.descriptor)
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<PacketDescriptor<U>>> {
        self.slots.iter().map(|s| &s.descriptor)
    }

    /// Bytes currently buffered for `id`.
    pub fn buffered(&self, id: DescriptorId) -> Option<&[u8]> {
        self.slots
            .iter()
            .find(|s| s.descriptor.id() == id)
            .map(|s| s.buffer.as_bytes())
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Empty every receive buffer but keep the descriptors.
    pub fn reset_buffers(&mut self) {
        for slot in &mut self.slots {
            slot.buffer.clear();
        }
    }

    /// Remove every descriptor.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Current engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Change the receive buffer bound for subsequent bytes.
    pub fn set_max_buffer_len(&mut self, max_buffer_len: Option<usize>) {
        self.config.max_buffer_len = max_buffer_len;
    }
}
