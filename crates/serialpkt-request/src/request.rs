use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serialpkt_packet::{EvaluationError, Evaluator};
use uuid::Uuid;

/// Unique identifier of a [`SerialRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Uuid);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A command to send, and how to recognise its response.
///
/// Without a response evaluator any non-empty data received while the request
/// is in flight counts as its response. Without a timeout the queue's default
/// applies.
#[derive(Debug)]
pub struct SerialRequest<U = ()> {
    id: RequestId,
    data_to_send: Bytes,
    response_evaluator: Option<Evaluator>,
    timeout: Option<Duration>,
    user_info: U,
    created_at: Instant,
}

impl<U> SerialRequest<U> {
    /// Create a request carrying `user_info` back with its completion.
    pub fn new(data_to_send: impl Into<Bytes>, user_info: U) -> Self {
        Self {
            id: RequestId::generate(),
            data_to_send: data_to_send.into(),
            response_evaluator: None,
            timeout: None,
            user_info,
            created_at: Instant::now(),
        }
    }

    /// Accept a response once `evaluator` returns true for the bytes received so far.
    pub fn with_evaluator<F>(self, evaluator: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.with_response_evaluator(Evaluator::new(evaluator))
    }

    /// Like [`with_evaluator`](Self::with_evaluator) for predicates that can fail.
    pub fn with_fallible_evaluator<F>(self, evaluator: F) -> Self
    where
        F: Fn(&[u8]) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        self.with_response_evaluator(Evaluator::fallible(evaluator))
    }

    /// Use a prebuilt evaluator.
    pub fn with_response_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.response_evaluator = Some(evaluator);
        self
    }

    /// Give up if no valid response arrives within `timeout` of sending.
    /// A zero timeout waits indefinitely.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether `data` is a complete response to this request.
    pub fn is_valid_response(&self, data: &[u8]) -> Result<bool, EvaluationError> {
        match &self.response_evaluator {
            Some(evaluator) => evaluator.evaluate(data),
            None => Ok(!data.is_empty()),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Bytes written to the transport when the request is dispatched.
    pub fn data_to_send(&self) -> &Bytes {
        &self.data_to_send
    }

    pub fn has_response_evaluator(&self) -> bool {
        self.response_evaluator.is_some()
    }

    /// Per-request timeout, if one was set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_info(&self) -> &U {
        &self.user_info
    }

    /// When the request was created (not when it was sent).
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn into_parts(self) -> (RequestId, U) {
        (self.id, self.user_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_evaluator_accepts_any_non_empty_data() {
        let req = SerialRequest::new(&b"AT\r"[..], ());
        assert!(!req.has_response_evaluator());
        assert!(!req.is_valid_response(b"").unwrap());
        assert!(req.is_valid_response(b"?").unwrap());
    }

    #[test]
    fn evaluator_decides_validity() {
        let req = SerialRequest::new("AT+GMR\r", ()).with_evaluator(|d| d.ends_with(b"OK\r\n"));
        assert!(!req.is_valid_response(b"1.2.3\r\n").unwrap());
        assert!(req.is_valid_response(b"1.2.3\r\nOK\r\n").unwrap());
    }

    #[test]
    fn builder_sets_timeout_and_user_info() {
        let req = SerialRequest::new("PING", 7u32).with_timeout(Duration::from_millis(250));
        assert_eq!(req.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(*req.user_info(), 7);
        assert_eq!(req.data_to_send().as_ref(), b"PING");
        assert!(req.created_at() <= Instant::now());
    }

    #[test]
    fn ids_are_unique() {
        let a = SerialRequest::new("a", ());
        let b = SerialRequest::new("a", ());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().to_string().len(), 36);
    }
}
