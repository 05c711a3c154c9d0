use bytes::Bytes;

use crate::error::Result;

/// The write side of a serial link.
///
/// Implementations must either accept the whole buffer or fail; a partial
/// write is reported as an error. Once the link is closed every call fails
/// with [`TransportError::Closed`](crate::TransportError::Closed).
pub trait Transport {
    /// Write `bytes` to the link.
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Whether the link currently accepts writes.
    fn is_open(&self) -> bool {
        true
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send_bytes(bytes)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send_bytes(bytes)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Notifications delivered by the read side of a serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link was opened and is ready for traffic.
    Opened,
    /// A chunk of bytes arrived. Chunk boundaries are not message boundaries.
    BytesReceived(Bytes),
    /// The link was closed (EOF or explicit close).
    Closed,
    /// The underlying device disappeared.
    Removed,
    /// A read-side error that did not close the link.
    Error(String),
}

impl TransportEvent {
    /// Short name used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Opened => "opened",
            TransportEvent::BytesReceived(_) => "bytes",
            TransportEvent::Closed => "closed",
            TransportEvent::Removed => "removed",
            TransportEvent::Error(_) => "error",
        }
    }

    /// True for events after which the link carries no more traffic.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed | TransportEvent::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingTransport;

    fn write_through<T: Transport>(mut transport: T, bytes: &[u8]) -> Result<()> {
        transport.send_bytes(bytes)
    }

    #[test]
    fn mut_ref_forwards_writes() {
        let mut sink = RecordingTransport::new();
        write_through(&mut sink, b"AT\r").unwrap();
        assert_eq!(sink.sent(), &[Bytes::from_static(b"AT\r")]);
    }

    #[test]
    fn boxed_transport_forwards_state() {
        let mut sink: Box<dyn Transport> = Box::new(RecordingTransport::new());
        assert!(sink.is_open());
        sink.send_bytes(b"x").unwrap();
    }

    #[test]
    fn terminal_events() {
        assert!(TransportEvent::Closed.is_terminal());
        assert!(TransportEvent::Removed.is_terminal());
        assert!(!TransportEvent::Opened.is_terminal());
        assert!(!TransportEvent::Error("parity".into()).is_terminal());
        assert_eq!(
            TransportEvent::BytesReceived(Bytes::from_static(b"a")).kind(),
            "bytes"
        );
    }
}
