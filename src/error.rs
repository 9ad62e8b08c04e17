//! Crate-wide error type.
//!
//! Every fallible operation in the engine returns this one enum so callers
//! (including the HTTP front-end) have a single place to match on failure
//! kinds rather than threading bespoke error types through every layer.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// All errors the engine can produce, grouped the way §7 of the design
/// groups them by audience: caller mistakes, resource exhaustion, and
/// internal/fatal conditions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request parameter failed validation. Never logged as a server
    /// error; surfaced to callers with the offending field's message.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A named lock could not be acquired within its bounded wait.
    #[error("lock timeout acquiring '{0}'")]
    LockTimeout(String),

    /// A table has no room for a new page and no expired page to evict.
    #[error("store full: table '{0}' has no free pages")]
    StoreFull(String),

    /// A single `add_record` call asked for more elements than fit on a page.
    #[error("record too large: {count} elements exceeds page capacity {capacity}")]
    RecordTooLarge { count: usize, capacity: usize },

    /// A page name is already registered under a different owner.
    #[error("name collision: page '{0}' already exists")]
    NameCollision(String),

    /// The process-local page directory could not satisfy an allocation
    /// (the configured memory budget is exhausted).
    #[error("out of memory allocating page '{0}'")]
    OutOfMemory(String),

    /// Requested page, locator, or registry slot does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn bad_parameter(field: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Error::BadParameter(format!("{field}: {reason}"))
    }

    /// The classification used by §7 to decide logging level and HTTP
    /// status. Kept separate from `Display` so the wire message and the
    /// routing decision can evolve independently.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadParameter(_) => ErrorKind::BadParameter,
            Error::LockTimeout(_) => ErrorKind::LockTimeout,
            Error::StoreFull(_) | Error::RecordTooLarge { .. } => ErrorKind::StoreFull,
            Error::NameCollision(_) | Error::OutOfMemory(_) => ErrorKind::Fatal,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Audience-facing classification independent of the specific variant.
/// The HTTP adapter maps this (not the `Error` variant directly) to a
/// status code, so adding a new `Error` variant never silently changes
/// wire behavior without an explicit `ErrorKind` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadParameter,
    LockTimeout,
    StoreFull,
    NotFound,
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_parameter_message_includes_field() {
        let err = Error::bad_parameter("origin", "must be 3 letters");
        assert_eq!(err.to_string(), "bad parameter: origin: must be 3 letters");
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn record_too_large_kind_is_store_full() {
        let err = Error::RecordTooLarge { count: 5, capacity: 1 };
        assert_eq!(err.kind(), ErrorKind::StoreFull);
    }

    #[test]
    fn lock_timeout_kind() {
        let err = Error::LockTimeout("DealsInfo".into());
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        assert!(err.to_string().contains("DealsInfo"));
    }
}
