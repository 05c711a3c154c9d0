use std::fmt;
use std::sync::Arc;

use crate::error::EvaluationError;

type EvaluatorFn = dyn Fn(&[u8]) -> Result<bool, EvaluationError> + Send + Sync;

/// A shareable acceptance test over a byte buffer.
///
/// Used both for custom packet descriptors and for request response
/// matching. The function receives the full accumulated buffer every time new
/// bytes arrive, so it must be deterministic for a given input.
#[derive(Clone)]
pub struct Evaluator(Arc<EvaluatorFn>);

impl Evaluator {
    /// Wrap an infallible predicate.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |data: &[u8]| Ok(f(data))))
    }

    /// Wrap a predicate that can fail. A failure aborts the current
    /// evaluation cycle only.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Accepts any buffer ending with `suffix`.
    pub fn ends_with(suffix: impl Into<Vec<u8>>) -> Self {
        let suffix = suffix.into();
        Self::new(move |data| data.ends_with(&suffix))
    }

    /// Accepts any buffer with at least `len` bytes.
    pub fn min_len(len: usize) -> Self {
        Self::new(move |data| data.len() >= len)
    }

    /// Run the predicate.
    pub fn evaluate(&self, data: &[u8]) -> Result<bool, EvaluationError> {
        (self.0)(data)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Evaluator(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_behave() {
        assert!(Evaluator::ends_with(b"\r\n".to_vec()).evaluate(b"OK\r\n").unwrap());
        assert!(!Evaluator::ends_with(b"\r\n".to_vec()).evaluate(b"OK\r").unwrap());
        assert!(Evaluator::min_len(3).evaluate(b"abc").unwrap());
        assert!(!Evaluator::min_len(3).evaluate(b"").unwrap());
    }

    #[test]
    fn fallible_error_passes_through() {
        let ev = Evaluator::fallible(|data| {
            if data.first() == Some(&0xFF) {
                Err(EvaluationError::new("bad sync byte"))
            } else {
                Ok(false)
            }
        });
        assert_eq!(
            ev.evaluate(&[0xFF]).unwrap_err().message(),
            "bad sync byte"
        );
        assert!(!ev.evaluate(&[0x01]).unwrap());
    }
}
