use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serialpkt_packet::{
    DescriptorId, EngineConfig, EngineEvent, PacketDescriptor, PacketError, PacketizingEngine,
    ReceivedPacket,
};
use serialpkt_request::{
    CancelReason, QueueConfig, RequestEvent, RequestId, RequestQueue, SerialRequest,
};
use serialpkt_transport::{Transport, TransportError, TransportEvent};
use tracing::{debug, info, trace, warn};

use crate::error::Result;

/// Default read size for reader threads and tasks.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Configuration for a [`SerialPort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub engine: EngineConfig,
    pub queue: QueueConfig,
    /// Bytes requested per read by [`spawn_reader`](crate::spawn_reader) and
    /// the async port task.
    pub read_chunk_size: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            queue: QueueConfig::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// What a failing evaluation was evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationTarget {
    Descriptor(DescriptorId),
    Request(RequestId),
}

/// Everything a [`SerialPort`] reports to its consumer.
#[derive(Debug)]
pub enum PortEvent<U> {
    /// A registered descriptor recognised a packet.
    PacketReceived(ReceivedPacket<U>),
    /// A request's bytes were written and its timer started.
    RequestSent { id: RequestId },
    /// A request received a valid response.
    RequestCompleted {
        id: RequestId,
        response: Bytes,
        user_info: U,
    },
    /// A request got no valid response in time.
    RequestTimedOut { id: RequestId, user_info: U },
    /// A request was cancelled by the caller or by the link going away.
    RequestCancelled {
        id: RequestId,
        user_info: U,
        reason: CancelReason,
    },
    /// A request could not be written.
    RequestFailed {
        id: RequestId,
        user_info: U,
        error: TransportError,
    },
    /// A descriptor's receive buffer overflowed and was reset.
    BufferOverflow {
        descriptor_id: DescriptorId,
        len: usize,
        max: usize,
    },
    /// A descriptor or response evaluator failed.
    EvaluationFailed {
        target: EvaluationTarget,
        error: PacketError,
    },
    Opened,
    Closed,
    Removed,
    /// The transport reported an error without closing.
    TransportError(String),
}

impl<U> PortEvent<U> {
    /// Short name for logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PacketReceived(_) => "packet",
            Self::RequestSent { .. } => "request_sent",
            Self::RequestCompleted { .. } => "request_completed",
            Self::RequestTimedOut { .. } => "request_timed_out",
            Self::RequestCancelled { .. } => "request_cancelled",
            Self::RequestFailed { .. } => "request_failed",
            Self::BufferOverflow { .. } => "buffer_overflow",
            Self::EvaluationFailed { .. } => "evaluation_failed",
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Removed => "removed",
            Self::TransportError(_) => "transport_error",
        }
    }
}

impl<U> From<EngineEvent<U>> for PortEvent<U> {
    fn from(event: EngineEvent<U>) -> Self {
        match event {
            EngineEvent::Packet(packet) => Self::PacketReceived(packet),
            EngineEvent::Overflow {
                descriptor_id,
                len,
                max,
            } => Self::BufferOverflow {
                descriptor_id,
                len,
                max,
            },
            EngineEvent::EvaluationFailed {
                descriptor_id,
                error,
            } => Self::EvaluationFailed {
                target: EvaluationTarget::Descriptor(descriptor_id),
                error,
            },
        }
    }
}

impl<U> From<RequestEvent<U>> for PortEvent<U> {
    fn from(event: RequestEvent<U>) -> Self {
        match event {
            RequestEvent::Sent { id } => Self::RequestSent { id },
            RequestEvent::Completed {
                id,
                response,
                user_info,
            } => Self::RequestCompleted {
                id,
                response,
                user_info,
            },
            RequestEvent::TimedOut { id, user_info } => Self::RequestTimedOut { id, user_info },
            RequestEvent::Cancelled {
                id,
                user_info,
                reason,
            } => Self::RequestCancelled {
                id,
                user_info,
                reason,
            },
            RequestEvent::SendFailed {
                id,
                user_info,
                error,
            } => Self::RequestFailed {
                id,
                user_info,
                error,
            },
            RequestEvent::EvaluationFailed { id, error } => Self::EvaluationFailed {
                target: EvaluationTarget::Request(id),
                error: error.into(),
            },
        }
    }
}

/// A serial link with packet recognition and request/response correlation.
///
/// The port owns the transport's write half, the packetizing engine and the
/// request queue. Incoming bytes and lifecycle changes are fed in through
/// [`handle_transport_event`](Self::handle_transport_event). Every received
/// chunk goes to the packet descriptors first, then to the in-flight request.
///
/// Operations that do not return events themselves (submit and cancel)
/// stash what they produce; the stash is delivered ahead of the next batch or
/// through [`take_events`](Self::take_events).
pub struct SerialPort<T, U = ()> {
    transport: T,
    engine: PacketizingEngine<U>,
    queue: RequestQueue<U>,
    config: PortConfig,
    outbox: Vec<PortEvent<U>>,
    open: bool,
}

impl<T: Transport, U> SerialPort<T, U> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, PortConfig::default())
    }

    pub fn with_config(transport: T, config: PortConfig) -> Self {
        let open = transport.is_open();
        Self {
            transport,
            engine: PacketizingEngine::with_config(config.engine.clone()),
            queue: RequestQueue::with_config(config.queue.clone()),
            config,
            outbox: Vec::new(),
            open,
        }
    }

    /// Start recognising packets described by `descriptor`.
    pub fn register_packet_descriptor(&mut self, descriptor: PacketDescriptor<U>) -> DescriptorId {
        self.engine.register(descriptor)
    }

    /// Register a descriptor shared with other ports. Registering the same
    /// descriptor twice has no effect.
    pub fn register_shared_packet_descriptor(
        &mut self,
        descriptor: Arc<PacketDescriptor<U>>,
    ) -> DescriptorId {
        self.engine.register_shared(descriptor)
    }

    /// Stop recognising a descriptor and discard its buffered bytes.
    pub fn deregister_packet_descriptor(
        &mut self,
        id: DescriptorId,
    ) -> Option<Arc<PacketDescriptor<U>>> {
        self.engine.deregister(id)
    }

    pub fn packet_descriptors(&self) -> impl Iterator<Item = &Arc<PacketDescriptor<U>>> {
        self.engine.descriptors()
    }

    /// Queue a request, sending it now if the link is idle.
    ///
    /// Fails with [`TransportError::Closed`] while the link is down.
    pub fn submit_request(&mut self, request: SerialRequest<U>, now: Instant) -> Result<RequestId> {
        self.ensure_open()?;
        let id = request.id();
        let events = self.queue.submit(request, &mut self.transport, now)?;
        self.outbox.extend(events.into_iter().map(PortEvent::from));
        Ok(id)
    }

    /// Cancel a queued or in-flight request.
    pub fn cancel_request(&mut self, id: RequestId, now: Instant) -> Result<()> {
        let events = self.queue.cancel(id, &mut self.transport, now)?;
        self.outbox.extend(events.into_iter().map(PortEvent::from));
        Ok(())
    }

    /// Write bytes without tracking a response.
    ///
    /// Anything the device sends back is still seen by the packet
    /// descriptors and by an in-flight request.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        trace!(len = bytes.len(), "untracked write");
        self.transport.send_bytes(bytes)?;
        Ok(())
    }

    /// Apply one transport event and return everything it caused.
    pub fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        now: Instant,
    ) -> Vec<PortEvent<U>> {
        let mut events = std::mem::take(&mut self.outbox);
        match event {
            TransportEvent::Opened => {
                info!("serial link opened");
                self.open = true;
                events.push(PortEvent::Opened);
            }
            TransportEvent::BytesReceived(chunk) => {
                trace!(len = chunk.len(), "bytes received");
                events.extend(self.engine.process(&chunk).into_iter().map(PortEvent::from));
                events.extend(
                    self.queue
                        .receive(&chunk, &mut self.transport, now)
                        .into_iter()
                        .map(PortEvent::from),
                );
            }
            TransportEvent::Closed => {
                info!("serial link closed");
                events.push(PortEvent::Closed);
                self.shut_down(CancelReason::TransportClosed, &mut events);
            }
            TransportEvent::Removed => {
                info!("serial device removed");
                events.push(PortEvent::Removed);
                self.shut_down(CancelReason::TransportRemoved, &mut events);
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "transport error");
                events.push(PortEvent::TransportError(message));
            }
        }
        events
    }

    /// Time out the in-flight request if its deadline has passed.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<PortEvent<U>> {
        let mut events = std::mem::take(&mut self.outbox);
        events.extend(
            self.queue
                .poll_timeout(&mut self.transport, now)
                .into_iter()
                .map(PortEvent::from),
        );
        events
    }

    /// When [`poll_timeouts`](Self::poll_timeouts) next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Events produced since the last batch was returned.
    pub fn take_events(&mut self) -> Vec<PortEvent<U>> {
        std::mem::take(&mut self.outbox)
    }

    /// Cancel every request and reset the receive buffers.
    pub fn close(&mut self) -> Vec<PortEvent<U>> {
        let mut events = std::mem::take(&mut self.outbox);
        self.shut_down(CancelReason::Shutdown, &mut events);
        events
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn engine(&self) -> &PacketizingEngine<U> {
        &self.engine
    }

    pub fn queue(&self) -> &RequestQueue<U> {
        &self.queue
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::Closed.into())
        }
    }

    fn shut_down(&mut self, reason: CancelReason, events: &mut Vec<PortEvent<U>>) {
        self.open = false;
        self.engine.reset_buffers();
        let cancelled = self.queue.drain(reason);
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), reason = reason.as_str(), "cancelled requests");
        }
        events.extend(cancelled.into_iter().map(PortEvent::from));
    }
}
