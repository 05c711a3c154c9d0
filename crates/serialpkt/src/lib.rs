//! Packet recognition and request/response correlation for serial links.
//!
//! serialpkt turns the unframed byte stream of a serial device into packets
//! and matches command responses to the commands that caused them.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-level transport abstraction (device nodes, streams)
//! - [`packet`]: packet descriptors and the packetizing engine
//! - [`request`]: request/response queue with timeouts
//! - [`port`]: the combined event loop (behind the `port` feature)

/// Re-export transport types.
pub mod transport {
    pub use serialpkt_transport::*;
}

/// Re-export packet types.
pub mod packet {
    pub use serialpkt_packet::*;
}

/// Re-export request types.
pub mod request {
    pub use serialpkt_request::*;
}

/// Re-export port types (requires `port` feature).
#[cfg(feature = "port")]
pub mod port {
    pub use serialpkt_port::*;
}
