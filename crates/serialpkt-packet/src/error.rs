/// Failure reported by a caller-supplied evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvaluationError {
    message: String,
}

impl EvaluationError {
    /// Create an evaluation error with a human-readable reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The reason given by the evaluator.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while defining or evaluating packet descriptors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PacketError {
    /// A prefix/suffix descriptor was built with neither boundary.
    #[error("packet descriptor needs a prefix, a suffix, or both")]
    MissingBoundary,

    /// The regular expression failed to compile.
    #[error("invalid packet regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A custom evaluator failed while inspecting the buffer.
    #[error("packet evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),
}

pub type Result<T> = std::result::Result<T, PacketError>;
