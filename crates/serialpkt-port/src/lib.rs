//! A serial link with packet recognition and request/response correlation.
//!
//! This is the "just works" layer. [`SerialPort`] combines a transport, the
//! packetizing engine and the request queue into one event loop:
//! - feed it [`TransportEvent`](serialpkt_transport::TransportEvent)s
//! - submit requests and register packet descriptors
//! - consume the resulting [`PortEvent`]s
//!
//! [`spawn_reader`] and [`SerialPort::pump`] run the loop on plain threads.
//! With the `async` feature, [`PortHandle`] runs it as a tokio task.

pub mod error;
pub mod port;
pub mod reader;

#[cfg(feature = "async")]
pub mod actor;

pub use error::{PortError, Result};
pub use port::{EvaluationTarget, PortConfig, PortEvent, SerialPort, DEFAULT_READ_CHUNK_SIZE};
pub use reader::spawn_reader;

#[cfg(unix)]
pub use reader::spawn_device_reader;

#[cfg(feature = "async")]
pub use actor::PortHandle;
