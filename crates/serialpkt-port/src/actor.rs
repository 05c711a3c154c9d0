use std::future::pending;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use serialpkt_packet::{DescriptorId, PacketDescriptor};
use serialpkt_request::{RequestId, SerialRequest};
use serialpkt_transport::{ChannelTransport, TransportEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::error::{PortError, Result};
use crate::port::{PortConfig, PortEvent, SerialPort};

const COMMAND_CAPACITY: usize = 32;

enum Command<U> {
    Register(PacketDescriptor<U>, oneshot::Sender<DescriptorId>),
    Deregister(DescriptorId, oneshot::Sender<bool>),
    Submit(SerialRequest<U>, oneshot::Sender<Result<RequestId>>),
    Cancel(RequestId, oneshot::Sender<Result<()>>),
    Send(Bytes, oneshot::Sender<Result<()>>),
}

/// Handle to a [`SerialPort`] running on its own tokio task.
///
/// The task reads from the device, writes through a separate writer task,
/// and fires request timeouts on the tokio clock. Port events arrive through
/// [`next_event`](Self::next_event), or by using the handle as a [`Stream`].
pub struct PortHandle<U> {
    commands: mpsc::Sender<Command<U>>,
    events: mpsc::UnboundedReceiver<PortEvent<U>>,
    task: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl<U: Send + Sync + 'static> PortHandle<U> {
    /// Start the port task over an already-open device.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R, W>(reader: R, writer: W, config: PortConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (transport, outgoing) = ChannelTransport::new();
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, events) = mpsc::unbounded_channel();

        let chunk_size = config.read_chunk_size.max(1);
        let (write_failed_tx, write_failed) = oneshot::channel();
        let port = SerialPort::with_config(transport, config);
        let writer = tokio::spawn(write_loop(writer, outgoing, write_failed_tx));
        let task = tokio::spawn(run(
            port,
            Link {
                reader,
                chunk_size,
                write_failed,
            },
            command_rx,
            event_tx,
        ));

        Self {
            commands,
            events,
            task,
            writer,
        }
    }

    pub async fn register_packet_descriptor(
        &self,
        descriptor: PacketDescriptor<U>,
    ) -> Result<DescriptorId> {
        self.call(|tx| Command::Register(descriptor, tx)).await
    }

    /// Returns whether the descriptor was registered.
    pub async fn deregister_packet_descriptor(&self, id: DescriptorId) -> Result<bool> {
        self.call(|tx| Command::Deregister(id, tx)).await
    }

    pub async fn submit_request(&self, request: SerialRequest<U>) -> Result<RequestId> {
        self.call(|tx| Command::Submit(request, tx)).await?
    }

    pub async fn cancel_request(&self, id: RequestId) -> Result<()> {
        self.call(|tx| Command::Cancel(id, tx)).await?
    }

    /// Write bytes without tracking a response.
    pub async fn send(&self, bytes: impl Into<Bytes>) -> Result<()> {
        let bytes = bytes.into();
        self.call(|tx| Command::Send(bytes, tx)).await?
    }

    /// Stop the task, cancelling outstanding requests.
    ///
    /// Returns the events produced while shutting down, including the
    /// cancellations.
    pub async fn close(self) -> Result<Vec<PortEvent<U>>> {
        let Self {
            commands,
            mut events,
            task,
            writer,
        } = self;
        drop(commands);
        task.await.map_err(|_| PortError::Stopped)?;
        writer.await.map_err(|_| PortError::Stopped)?;

        let mut remaining = Vec::new();
        while let Some(event) = events.recv().await {
            remaining.push(event);
        }
        Ok(remaining)
    }

    async fn call<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command<U>) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| PortError::Stopped)?;
        rx.await.map_err(|_| PortError::Stopped)
    }
}

impl<U> PortHandle<U> {
    /// Next port event, or `None` once the task has stopped and every event
    /// has been delivered.
    pub async fn next_event(&mut self) -> Option<PortEvent<U>> {
        self.events.recv().await
    }
}

impl<U> Stream for PortHandle<U> {
    type Item = PortEvent<U>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// The device side of the port task.
struct Link<R> {
    reader: R,
    chunk_size: usize,
    /// Fires once if the writer task gives up on a failed write.
    write_failed: oneshot::Receiver<io::Error>,
}

async fn run<R, U>(
    mut port: SerialPort<ChannelTransport, U>,
    link: Link<R>,
    mut commands: mpsc::Receiver<Command<U>>,
    events: mpsc::UnboundedSender<PortEvent<U>>,
) where
    R: AsyncRead + Unpin,
{
    let Link {
        mut reader,
        chunk_size,
        mut write_failed,
    } = link;
    let emit = |batch: Vec<PortEvent<U>>| {
        for event in batch {
            let _ = events.send(event);
        }
    };

    let mut buf = vec![0u8; chunk_size];
    let mut reading = true;
    let mut writing = true;
    emit(port.handle_transport_event(TransportEvent::Opened, now()));

    loop {
        let deadline = port.next_deadline().map(Instant::from_std);
        let timer = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                handle_command(&mut port, command);
                emit(port.take_events());
            }
            read = reader.read(&mut buf), if reading => {
                let batch = match read {
                    Ok(0) => {
                        reading = false;
                        port.handle_transport_event(TransportEvent::Closed, now())
                    }
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        port.handle_transport_event(TransportEvent::BytesReceived(chunk), now())
                    }
                    Err(e) => {
                        warn!(error = %e, "serial read failed");
                        reading = false;
                        link_failed(&mut port, &e)
                    }
                };
                emit(batch);
            }
            failed = &mut write_failed, if writing => {
                writing = false;
                // The sender is dropped unused when the writer finishes normally.
                if let Ok(e) = failed {
                    reading = false;
                    emit(link_failed(&mut port, &e));
                }
            }
            () = timer => {
                emit(port.poll_timeouts(now()));
            }
        }
    }

    debug!("port task stopping");
    emit(port.close());
}

// Report an I/O failure and close the link if it is still up.
fn link_failed<U>(
    port: &mut SerialPort<ChannelTransport, U>,
    error: &io::Error,
) -> Vec<PortEvent<U>> {
    let mut batch = port.handle_transport_event(TransportEvent::Error(error.to_string()), now());
    if port.is_open() {
        batch.extend(port.handle_transport_event(TransportEvent::Closed, now()));
    }
    batch
}

fn handle_command<U>(port: &mut SerialPort<ChannelTransport, U>, command: Command<U>) {
    // A dropped reply receiver only means the caller stopped waiting.
    match command {
        Command::Register(descriptor, reply) => {
            let _ = reply.send(port.register_packet_descriptor(descriptor));
        }
        Command::Deregister(id, reply) => {
            let _ = reply.send(port.deregister_packet_descriptor(id).is_some());
        }
        Command::Submit(request, reply) => {
            let _ = reply.send(port.submit_request(request, now()));
        }
        Command::Cancel(id, reply) => {
            let _ = reply.send(port.cancel_request(id, now()));
        }
        Command::Send(bytes, reply) => {
            let _ = reply.send(port.send(&bytes));
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
    failed: oneshot::Sender<io::Error>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = outgoing.recv().await {
        let written = match writer.write_all(&bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(error = %e, "serial write failed");
            let _ = failed.send(e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

// The tokio clock, so paused-time tests drive request deadlines.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serialpkt_request::CancelReason;
    use serialpkt_transport::TransportError;
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// A writer whose device has gone away.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn next_of<U>(handle: &mut PortHandle<U>, kind: &str) -> PortEvent<U> {
        loop {
            let event = handle.next_event().await.expect("port task ended early");
            if event.kind() == kind {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn packets_flow_from_device_to_consumer() {
        let (host, mut device) = duplex(256);
        let (reader, writer) = split(host);
        let mut handle = PortHandle::spawn(reader, writer, PortConfig::default());
        handle
            .register_packet_descriptor(
                PacketDescriptor::with_prefix_suffix_str(Some("$"), Some("\n"), "gps").unwrap(),
            )
            .await
            .unwrap();

        device.write_all(b"noise$GPGGA,1\n").await.unwrap();
        match next_of(&mut handle, "packet").await {
            PortEvent::PacketReceived(p) => {
                assert_eq!(p.data.as_ref(), b"$GPGGA,1\n");
                assert_eq!(*p.user_info(), "gps");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        drop(device);
        assert!(matches!(next_of(&mut handle, "closed").await, PortEvent::Closed));
    }

    #[tokio::test]
    async fn request_round_trip() {
        let (host, mut device) = duplex(256);
        let (reader, writer) = split(host);
        let mut handle = PortHandle::spawn(reader, writer, PortConfig::default());

        let id = handle
            .submit_request(
                SerialRequest::new("AT\r", 1u8).with_evaluator(|d| d.ends_with(b"OK\r\n")),
            )
            .await
            .unwrap();

        let mut cmd = [0u8; 3];
        device.read_exact(&mut cmd).await.unwrap();
        assert_eq!(&cmd, b"AT\r");
        device.write_all(b"OK").await.unwrap();
        device.write_all(b"\r\n").await.unwrap();

        match next_of(&mut handle, "request_completed").await {
            PortEvent::RequestCompleted {
                id: done,
                response,
                user_info,
            } => {
                assert_eq!(done, id);
                assert_eq!(response.as_ref(), b"OK\r\n");
                assert_eq!(user_info, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        handle.send("ATZ\r").await.unwrap();
        let mut reset = [0u8; 4];
        device.read_exact(&mut reset).await.unwrap();
        assert_eq!(&reset, b"ATZ\r");
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_on_tokio_clock() {
        let (host, _device) = duplex(256);
        let (reader, writer) = split(host);
        let mut handle: PortHandle<()> = PortHandle::spawn(reader, writer, PortConfig::default());

        let started = Instant::now();
        handle
            .submit_request(SerialRequest::new("PING", ()).with_timeout(Duration::from_secs(2)))
            .await
            .unwrap();

        assert!(matches!(
            next_of(&mut handle, "request_timed_out").await,
            PortEvent::RequestTimedOut { .. }
        ));
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_outstanding_requests() {
        let (host, _device) = duplex(256);
        let (reader, writer) = split(host);
        let handle: PortHandle<&'static str> =
            PortHandle::spawn(reader, writer, PortConfig::default());

        handle
            .submit_request(SerialRequest::new("A", "a").with_evaluator(|_| false))
            .await
            .unwrap();
        handle
            .submit_request(SerialRequest::new("B", "b"))
            .await
            .unwrap();

        let remaining = handle.close().await.unwrap();
        let cancelled: Vec<&str> = remaining
            .into_iter()
            .filter_map(|e| match e {
                PortEvent::RequestCancelled {
                    user_info,
                    reason: CancelReason::Shutdown,
                    ..
                } => Some(user_info),
                _ => None,
            })
            .collect();
        assert_eq!(cancelled, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn handle_is_an_event_stream() {
        use futures_util::StreamExt;

        let (host, mut device) = duplex(64);
        let (reader, writer) = split(host);
        let handle: PortHandle<()> = PortHandle::spawn(reader, writer, PortConfig::default());
        let pair = PacketDescriptor::with_evaluator(|d| d.len() == 2, ()).unwrap();
        handle.register_packet_descriptor(pair).await.unwrap();

        device.write_all(b"ab").await.unwrap();
        drop(device);

        let kinds: Vec<&str> = handle
            .take_while(|e| std::future::ready(!matches!(e, PortEvent::Closed)))
            .map(|e| e.kind())
            .collect()
            .await;
        assert_eq!(kinds, ["opened", "packet"]);
    }

    #[tokio::test]
    async fn cancelling_unknown_request_reports_error() {
        let (host, _device) = duplex(64);
        let (reader, writer) = split(host);
        let handle: PortHandle<()> = PortHandle::spawn(reader, writer, PortConfig::default());
        let stray = SerialRequest::new("x", ()).id();
        assert!(matches!(
            handle.cancel_request(stray).await,
            Err(PortError::Request(_))
        ));
    }

    #[tokio::test]
    async fn write_failure_closes_link_and_cancels_requests() {
        let (host, _device) = duplex(64);
        let (reader, _) = split(host);
        let mut handle: PortHandle<&'static str> =
            PortHandle::spawn(reader, BrokenWriter, PortConfig::default());

        handle
            .submit_request(SerialRequest::new("AT\r", "at").with_evaluator(|_| false))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        let cancelled = loop {
            let event = handle.next_event().await.expect("port task ended early");
            kinds.push(event.kind());
            if let PortEvent::RequestCancelled {
                user_info, reason, ..
            } = event
            {
                break (user_info, reason);
            }
        };
        assert_eq!(
            kinds,
            ["opened", "request_sent", "transport_error", "closed", "request_cancelled"]
        );
        assert_eq!(cancelled, ("at", CancelReason::TransportClosed));

        assert!(matches!(
            handle.submit_request(SerialRequest::new("AT\r", "again")).await,
            Err(PortError::Transport(TransportError::Closed))
        ));
    }
}
