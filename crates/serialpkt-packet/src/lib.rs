//! Packet-boundary recognition for unframed serial byte streams.
//!
//! Serial devices deliver bytes in arbitrary chunks. A [`PacketDescriptor`]
//! describes what a complete packet looks like:
//! - a fixed prefix and/or suffix
//! - a regular expression
//! - an arbitrary evaluator function
//!
//! The [`PacketizingEngine`] keeps one receive buffer per registered
//! descriptor, feeds every incoming byte to each of them, and reports a packet
//! as soon as a descriptor accepts its buffer.

pub mod buffer;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod evaluator;

#[cfg(feature = "async")]
pub mod codec;

pub use buffer::{BufferStep, ReceiveBuffer};
pub use descriptor::{DescriptorId, MatchRule, PacketDescriptor};
pub use engine::{
    EngineConfig, EngineEvent, PacketizingEngine, ReceivedPacket, DEFAULT_MAX_BUFFER_LEN,
};
pub use error::{EvaluationError, PacketError, Result};
pub use evaluator::Evaluator;

#[cfg(feature = "async")]
pub use codec::PacketCodec;
