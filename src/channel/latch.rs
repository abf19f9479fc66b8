//! # First-error-wins failure record.
//!
//! [`ErrorLatch`] keeps the first `(code, reason)` pair reported against a
//! channel. Later reports are observed (the caller learns they were ignored
//! and can log them) but never overwrite the latched value.
//!
//! The latch records, nothing more: it never drives a state transition by
//! itself. Owners decide whether a latched error should also trigger
//! shutdown.

use std::sync::Arc;

/// The latched failure record of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatchedError {
    /// Numeric error code (HTTP-style status codes by convention).
    pub code: u16,
    /// Human-readable reason; defaulted from the code when not supplied.
    pub reason: Arc<str>,
}

/// First-error-wins storage slot.
#[derive(Debug, Default)]
pub(crate) struct ErrorLatch {
    slot: Option<LatchedError>,
}

impl ErrorLatch {
    /// Records the error if nothing is latched yet.
    ///
    /// An empty `reason` is replaced with the standard text for `code`.
    /// Returns `true` when this call latched the value, `false` when an
    /// earlier error already holds the slot.
    pub fn latch(&mut self, code: u16, reason: &str) -> bool {
        if self.slot.is_some() {
            return false;
        }
        let reason: Arc<str> = if reason.is_empty() {
            Arc::from(status_text(code))
        } else {
            Arc::from(reason)
        };
        self.slot = Some(LatchedError { code, reason });
        true
    }

    /// Returns the latched record, if any.
    pub fn get(&self) -> Option<&LatchedError> {
        self.slot.as_ref()
    }
}

/// Standard textual description for an HTTP-style status code.
///
/// Used as the default reason when an error is reported with an empty one.
pub(crate) fn status_text(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let mut latch = ErrorLatch::default();
        assert!(latch.latch(404, "stream gone"));
        assert!(!latch.latch(500, "later failure"));
        assert!(!latch.latch(404, "same code again"));

        let held = latch.get().unwrap();
        assert_eq!(held.code, 404);
        assert_eq!(&*held.reason, "stream gone");
    }

    #[test]
    fn test_empty_reason_defaults_from_code() {
        let mut latch = ErrorLatch::default();
        assert!(latch.latch(404, ""));
        assert_eq!(&*latch.get().unwrap().reason, "Not Found");
    }

    #[test]
    fn test_common_4xx_5xx_have_standard_text() {
        for (code, text) in [
            (401, "Unauthorized"),
            (405, "Method Not Allowed"),
            (429, "Too Many Requests"),
            (501, "Not Implemented"),
            (502, "Bad Gateway"),
            (504, "Gateway Timeout"),
        ] {
            assert_eq!(status_text(code), text);
        }
    }

    #[test]
    fn test_unknown_code_has_fallback_text() {
        let mut latch = ErrorLatch::default();
        assert!(latch.latch(799, ""));
        assert_eq!(&*latch.get().unwrap().reason, "Unknown Error");
    }

    #[test]
    fn test_empty_latch_reports_nothing() {
        let latch = ErrorLatch::default();
        assert!(latch.get().is_none());
    }
}
