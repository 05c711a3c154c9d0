use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serialpkt_transport::{Transport, TransportEvent};
use tracing::{debug, warn};

use crate::error::{PortError, Result};
use crate::port::{PortEvent, SerialPort};

/// Read `reader` on a dedicated thread and forward what happens as
/// [`TransportEvent`]s.
///
/// The thread reports `Opened` first, then one `BytesReceived` per read. End
/// of stream becomes `Closed`; a read error is reported as `Error` followed by
/// `Closed`. The thread exits once the link ends or the receiver is dropped.
pub fn spawn_reader<R>(
    reader: R,
    chunk_size: usize,
) -> Result<(Receiver<TransportEvent>, JoinHandle<()>)>
where
    R: Read + Send + 'static,
{
    spawn_with(reader, chunk_size, || false)
}

/// Like [`spawn_reader`], but reports `Removed` instead of `Closed` when the
/// device node has disappeared by the time the link ends.
#[cfg(unix)]
pub fn spawn_device_reader<R>(
    reader: R,
    device: serialpkt_transport::DeviceNode,
    chunk_size: usize,
) -> Result<(Receiver<TransportEvent>, JoinHandle<()>)>
where
    R: Read + Send + 'static,
{
    spawn_with(reader, chunk_size, move || !device.is_present())
}

fn spawn_with<R, G>(
    mut reader: R,
    chunk_size: usize,
    gone: G,
) -> Result<(Receiver<TransportEvent>, JoinHandle<()>)>
where
    R: Read + Send + 'static,
    G: Fn() -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let chunk_size = chunk_size.max(1);

    let handle = thread::Builder::new()
        .name("serialpkt-reader".into())
        .spawn(move || {
            if tx.send(TransportEvent::Opened).is_err() {
                return;
            }
            let mut buf = vec![0u8; chunk_size];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let event = TransportEvent::BytesReceived(Bytes::copy_from_slice(&buf[..n]));
                        if tx.send(event).is_err() {
                            debug!("event receiver dropped, stopping reader");
                            return;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "serial read failed");
                        let _ = tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let end = if gone() {
                TransportEvent::Removed
            } else {
                TransportEvent::Closed
            };
            debug!(event = end.kind(), "reader finished");
            let _ = tx.send(end);
        })?;

    Ok((rx, handle))
}

impl<T: Transport, U> SerialPort<T, U> {
    /// Wait up to `max_wait` for the next transport event or request
    /// deadline, whichever comes first, and apply it.
    ///
    /// Returns an empty batch if nothing happened in time.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Disconnected`] once the reader is gone and the
    /// port has already been closed. If the reader vanishes while the port is
    /// open, the port is closed and the resulting events are returned.
    pub fn pump(
        &mut self,
        events: &Receiver<TransportEvent>,
        max_wait: Duration,
    ) -> Result<Vec<PortEvent<U>>> {
        let now = Instant::now();
        let wait = match self.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(now).min(max_wait),
            None => max_wait,
        };

        match events.recv_timeout(wait) {
            Ok(event) => Ok(self.handle_transport_event(event, Instant::now())),
            Err(RecvTimeoutError::Timeout) => Ok(self.poll_timeouts(Instant::now())),
            Err(RecvTimeoutError::Disconnected) if self.is_open() => {
                debug!("reader disconnected without closing the port");
                Ok(self.handle_transport_event(TransportEvent::Closed, Instant::now()))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PortError::Disconnected),
        }
    }
}
