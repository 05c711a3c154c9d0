use bytes::Bytes;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// A [`Transport`] that hands writes to an async writer task.
///
/// `send_bytes` never blocks: buffers are queued on an unbounded channel and a
/// task owning the real `AsyncWrite` drains them in order. Once the receiving
/// side is dropped every write fails with [`TransportError::Closed`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: UnboundedSender<Bytes>,
}

impl ChannelTransport {
    /// Create a transport and the receiver its writes arrive on.
    pub fn new() -> (Self, UnboundedReceiver<Bytes>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_arrive_in_order() {
        let (mut transport, mut rx) = ChannelTransport::new();
        transport.send_bytes(b"a").unwrap();
        transport.send_bytes(b"b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from("a"));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from("b"));
    }

    #[test]
    fn dropped_receiver_closes_transport() {
        let (mut transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send_bytes(b"x"),
            Err(TransportError::Closed)
        ));
    }
}
