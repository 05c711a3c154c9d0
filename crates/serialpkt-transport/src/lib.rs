//! Byte-level transport abstraction for serial links.
//!
//! This is the lowest layer of serialpkt. A transport only moves raw bytes:
//! - [`Transport`] writes outgoing bytes
//! - [`TransportEvent`] reports incoming chunks and lifecycle changes
//!
//! Chunk boundaries carry no meaning. Turning them into packets is the job of
//! `serialpkt-packet`; correlating responses is the job of `serialpkt-request`.

pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod device;

#[cfg(feature = "async")]
pub mod channel;

pub use error::{Result, TransportError};
pub use memory::RecordingTransport;
pub use stream::SerialStream;
pub use traits::{Transport, TransportEvent};

#[cfg(unix)]
pub use device::DeviceNode;

#[cfg(feature = "async")]
pub use channel::ChannelTransport;
