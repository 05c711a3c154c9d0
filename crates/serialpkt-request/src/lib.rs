//! Request/response correlation over a serial link.
//!
//! Many serial devices answer commands in strict order without tagging their
//! responses. A [`RequestQueue`] therefore keeps at most one
//! [`SerialRequest`] in flight, attributes every received byte to it, and
//! sends the next request only once the current one completes, times out,
//! fails to send, or is cancelled.
//!
//! The queue is driven entirely by its caller: transports and the current
//! time are passed into each operation.

pub mod error;
pub mod queue;
pub mod request;

pub use error::{RequestError, Result};
pub use queue::{CancelReason, QueueConfig, RequestEvent, RequestQueue, DEFAULT_REQUEST_TIMEOUT};
pub use request::{RequestId, SerialRequest};
