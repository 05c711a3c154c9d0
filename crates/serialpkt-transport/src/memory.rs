use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// In-memory transport that records every write.
///
/// Useful for driving the packet engine and request queue without hardware,
/// and for embedding the core behind a transport the caller flushes itself.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Vec<Bytes>,
    closed: bool,
    fail_next: Option<std::io::ErrorKind>,
}

impl RecordingTransport {
    /// Create an open recording transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every buffer written so far, in write order.
    pub fn sent(&self) -> &[Bytes] {
        &self.sent
    }

    /// Remove and return the recorded writes.
    pub fn take_sent(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.sent)
    }

    /// Mark the link closed; subsequent writes fail with [`TransportError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Reopen a closed link.
    pub fn reopen(&mut self) {
        self.closed = false;
    }

    /// Make the next write fail with an I/O error of the given kind.
    pub fn fail_next_write(&mut self, kind: std::io::ErrorKind) {
        self.fail_next = Some(kind);
    }
}

impl Transport for RecordingTransport {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if let Some(kind) = self.fail_next.take() {
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }
        trace!(len = bytes.len(), "recorded write");
        self.sent.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_writes_in_order() {
        let mut t = RecordingTransport::new();
        t.send_bytes(b"one").unwrap();
        t.send_bytes(b"two").unwrap();
        assert_eq!(t.take_sent(), vec![Bytes::from("one"), Bytes::from("two")]);
        assert!(t.sent().is_empty());
    }

    #[test]
    fn closed_link_rejects_writes() {
        let mut t = RecordingTransport::new();
        t.close();
        assert!(!t.is_open());
        assert!(matches!(t.send_bytes(b"x"), Err(TransportError::Closed)));
        t.reopen();
        t.send_bytes(b"x").unwrap();
    }

    #[test]
    fn injected_failure_applies_once() {
        let mut t = RecordingTransport::new();
        t.fail_next_write(std::io::ErrorKind::BrokenPipe);
        let err = t.send_bytes(b"x").unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe));
        t.send_bytes(b"y").unwrap();
        assert_eq!(t.sent().len(), 1);
    }
}
