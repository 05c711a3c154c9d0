use crate::request::RequestId;

/// Errors that can occur while queueing or cancelling requests.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The queue already holds the configured maximum of waiting requests.
    #[error("request queue full ({max} waiting)")]
    QueueFull { max: usize },

    /// No queued or in-flight request has this id.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] serialpkt_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, RequestError>;
