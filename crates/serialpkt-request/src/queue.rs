use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use serialpkt_packet::EvaluationError;
use serialpkt_transport::{Transport, TransportError};
use tracing::{debug, trace, warn};

use crate::error::{RequestError, Result};
use crate::request::{RequestId, SerialRequest};

/// Default time to wait for a response when a request sets no timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`RequestQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Timeout for requests that do not set one. `None` waits forever.
    pub default_timeout: Option<Duration>,
    /// Maximum number of requests waiting behind the in-flight one.
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            max_pending: None,
        }
    }
}

/// Why a request was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancelled by the caller.
    Requested,
    /// The transport closed.
    TransportClosed,
    /// The device went away.
    TransportRemoved,
    /// The owning port shut down.
    Shutdown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::TransportClosed => "transport closed",
            Self::TransportRemoved => "transport removed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Something that happened to a queued request.
#[derive(Debug)]
pub enum RequestEvent<U> {
    /// The request's bytes were written and its timer started.
    Sent { id: RequestId },
    /// A valid response arrived.
    Completed {
        id: RequestId,
        response: Bytes,
        user_info: U,
    },
    /// No valid response arrived before the deadline.
    TimedOut { id: RequestId, user_info: U },
    /// The request was withdrawn before completing.
    Cancelled {
        id: RequestId,
        user_info: U,
        reason: CancelReason,
    },
    /// Writing the request failed; it was never in flight.
    SendFailed {
        id: RequestId,
        user_info: U,
        error: TransportError,
    },
    /// The response evaluator failed. The request stays in flight.
    EvaluationFailed {
        id: RequestId,
        error: EvaluationError,
    },
}

impl<U> RequestEvent<U> {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Sent { id }
            | Self::Completed { id, .. }
            | Self::TimedOut { id, .. }
            | Self::Cancelled { id, .. }
            | Self::SendFailed { id, .. }
            | Self::EvaluationFailed { id, .. } => *id,
        }
    }

    /// Whether the request is finished after this event.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Sent { .. } | Self::EvaluationFailed { .. })
    }
}

struct InFlight<U> {
    request: SerialRequest<U>,
    deadline: Option<Instant>,
    response: BytesMut,
}

/// FIFO of requests with at most one in flight.
///
/// The queue does no I/O scheduling of its own. Callers pass in the transport
/// to write to and the current time; each call returns what happened. A
/// request's timer starts when its bytes are written, and bytes received while
/// nothing is in flight are discarded.
pub struct RequestQueue<U = ()> {
    config: QueueConfig,
    pending: VecDeque<SerialRequest<U>>,
    in_flight: Option<InFlight<U>>,
}

impl<U> Default for RequestQueue<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> RequestQueue<U> {
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Queue `request`, sending it right away if nothing is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::QueueFull`] if `max_pending` requests are
    /// already waiting.
    pub fn submit<T: Transport + ?Sized>(
        &mut self,
        request: SerialRequest<U>,
        transport: &mut T,
        now: Instant,
    ) -> Result<Vec<RequestEvent<U>>> {
        let mut events = Vec::new();
        self.expire(now, &mut events);

        if let Some(max) = self.config.max_pending {
            if self.in_flight.is_some() && self.pending.len() >= max {
                return Err(RequestError::QueueFull { max });
            }
        }

        debug!(
            request = %request.id(),
            len = request.data_to_send().len(),
            waiting = self.pending.len(),
            "request queued"
        );
        self.pending.push_back(request);
        self.dispatch(transport, now, &mut events);
        Ok(events)
    }

    /// Feed bytes received from the device to the in-flight request.
    pub fn receive<T: Transport + ?Sized>(
        &mut self,
        chunk: &[u8],
        transport: &mut T,
        now: Instant,
    ) -> Vec<RequestEvent<U>> {
        let mut events = Vec::new();
        if self.expire(now, &mut events) {
            // Late bytes belong to the expired request, not the next one.
            self.dispatch(transport, now, &mut events);
            return events;
        }
        if chunk.is_empty() {
            return events;
        }

        let Some(in_flight) = self.in_flight.as_mut() else {
            trace!(len = chunk.len(), "no request in flight, discarding bytes");
            return events;
        };

        in_flight.response.extend_from_slice(chunk);
        let matched = match in_flight.request.is_valid_response(&in_flight.response) {
            Ok(matched) => matched,
            Err(error) => {
                warn!(request = %in_flight.request.id(), %error, "response evaluation failed");
                events.push(RequestEvent::EvaluationFailed {
                    id: in_flight.request.id(),
                    error,
                });
                false
            }
        };

        if matched {
            if let Some(done) = self.in_flight.take() {
                let response = done.response.freeze();
                let (id, user_info) = done.request.into_parts();
                debug!(request = %id, len = response.len(), "request completed");
                events.push(RequestEvent::Completed {
                    id,
                    response,
                    user_info,
                });
            }
            self.dispatch(transport, now, &mut events);
        }
        events
    }

    /// Time out the in-flight request if its deadline has passed, then send
    /// the next one.
    pub fn poll_timeout<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: Instant,
    ) -> Vec<RequestEvent<U>> {
        let mut events = Vec::new();
        if self.expire(now, &mut events) {
            self.dispatch(transport, now, &mut events);
        }
        events
    }

    /// Deadline of the in-flight request, if it has one.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight.as_ref().and_then(|f| f.deadline)
    }

    /// Withdraw a queued or in-flight request.
    ///
    /// Cancelling the in-flight request sends the next one immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::UnknownRequest`] if no such request is queued.
    pub fn cancel<T: Transport + ?Sized>(
        &mut self,
        id: RequestId,
        transport: &mut T,
        now: Instant,
    ) -> Result<Vec<RequestEvent<U>>> {
        let mut events = Vec::new();

        if let Some(done) = self.in_flight.take_if(|f| f.request.id() == id) {
            debug!(request = %id, "in-flight request cancelled");
            let (id, user_info) = done.request.into_parts();
            events.push(RequestEvent::Cancelled {
                id,
                user_info,
                reason: CancelReason::Requested,
            });
            self.dispatch(transport, now, &mut events);
            return Ok(events);
        }

        let position = self
            .pending
            .iter()
            .position(|r| r.id() == id)
            .ok_or(RequestError::UnknownRequest(id))?;
        if let Some(request) = self.pending.remove(position) {
            debug!(request = %id, "queued request cancelled");
            let (id, user_info) = request.into_parts();
            events.push(RequestEvent::Cancelled {
                id,
                user_info,
                reason: CancelReason::Requested,
            });
        }
        Ok(events)
    }

    /// Cancel everything, in-flight request first, without sending anything.
    pub fn drain(&mut self, reason: CancelReason) -> Vec<RequestEvent<U>> {
        let mut events = Vec::with_capacity(self.len());
        let in_flight = self.in_flight.take().map(|f| f.request);
        for request in in_flight.into_iter().chain(self.pending.drain(..)) {
            let (id, user_info) = request.into_parts();
            events.push(RequestEvent::Cancelled {
                id,
                user_info,
                reason,
            });
        }
        if !events.is_empty() {
            debug!(count = events.len(), reason = reason.as_str(), "request queue drained");
        }
        events
    }

    /// The request currently awaiting a response.
    pub fn in_flight(&self) -> Option<&SerialRequest<U>> {
        self.in_flight.as_ref().map(|f| &f.request)
    }

    /// Bytes accumulated so far for the in-flight request.
    pub fn in_flight_response(&self) -> Option<&[u8]> {
        self.in_flight.as_ref().map(|f| &f.response[..])
    }

    /// Number of requests waiting behind the in-flight one.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of unfinished requests, including the in-flight one.
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Ids of all unfinished requests in the order they will complete.
    pub fn queued_ids(&self) -> Vec<RequestId> {
        self.in_flight()
            .into_iter()
            .chain(self.pending.iter())
            .map(SerialRequest::id)
            .collect()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn expire(&mut self, now: Instant, events: &mut Vec<RequestEvent<U>>) -> bool {
        let Some(done) = self
            .in_flight
            .take_if(|f| f.deadline.is_some_and(|deadline| now >= deadline))
        else {
            return false;
        };
        let (id, user_info) = done.request.into_parts();
        warn!(request = %id, received = done.response.len(), "request timed out");
        events.push(RequestEvent::TimedOut { id, user_info });
        true
    }

    fn dispatch<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: Instant,
        events: &mut Vec<RequestEvent<U>>,
    ) {
        while self.in_flight.is_none() {
            let Some(request) = self.pending.pop_front() else {
                break;
            };

            match transport.send_bytes(request.data_to_send()) {
                Ok(()) => {
                    // A zero timeout means wait indefinitely.
                    let timeout = request
                        .timeout()
                        .or(self.config.default_timeout)
                        .filter(|t| !t.is_zero());
                    let deadline = timeout.and_then(|t| now.checked_add(t));
                    debug!(request = %request.id(), ?timeout, "request sent");
                    events.push(RequestEvent::Sent { id: request.id() });
                    self.in_flight = Some(InFlight {
                        request,
                        deadline,
                        response: BytesMut::new(),
                    });
                }
                Err(error) => {
                    warn!(request = %request.id(), %error, "request send failed");
                    let (id, user_info) = request.into_parts();
                    events.push(RequestEvent::SendFailed {
                        id,
                        user_info,
                        error,
                    });
                }
            }
        }
    }
}
