/// Errors that can occur in port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] serialpkt_transport::TransportError),

    /// Packet descriptor error.
    #[error("packet error: {0}")]
    Packet(#[from] serialpkt_packet::PacketError),

    /// Request queue error.
    #[error("request error: {0}")]
    Request(#[from] serialpkt_request::RequestError),

    /// The reader feeding transport events has gone away.
    #[error("transport event source disconnected")]
    Disconnected,

    /// The port task is no longer running.
    #[error("port task stopped")]
    Stopped,

    /// I/O error outside the transport, e.g. spawning the reader thread.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PortError>;
