//! The seven error kinds shared between `devac-core` and `devac-hub`.
//!
//! See `spec.md` §7. `ParseDegraded` never escapes as a hard error — it is
//! carried in a `ParseResult`'s `warnings` — but it is still a variant here
//! so every subsystem reports failures through the same enum.

use thiserror::Error;

/// Uniform error type for DevAC's core and hub crates.
#[derive(Debug, Error)]
pub enum DevacError {
    /// A file parsed with warnings; a degraded but non-empty result was still produced.
    #[error("parse degraded for {path}: {reason}")]
    ParseDegraded { path: String, reason: String },

    /// A filesystem read or write failed outright.
    #[error("io failed on {path}: {source}")]
    IoFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An IPC client could not reach the hub owner.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// An internal sanity check failed (e.g. an edge with no in-file source).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A hub-only operation was called against a package-only provider, or vice versa.
    #[error("mode misuse: {0}")]
    ModeMisuse(String),

    /// An IPC call exceeded its deadline. Treated as `ConnectionLost` by callers.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// The storage layer rejected a write.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl DevacError {
    /// The `ErrorKind` this error carries, for callers that branch on kind
    /// rather than match the full enum (e.g. across the IPC boundary).
    pub fn kind(&self) -> ErrorKind {
        match self {
            DevacError::ParseDegraded { .. } => ErrorKind::ParseDegraded,
            DevacError::IoFailed { .. } => ErrorKind::IoFailed,
            DevacError::ConnectionLost(_) => ErrorKind::ConnectionLost,
            DevacError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            DevacError::ModeMisuse(_) => ErrorKind::ModeMisuse,
            DevacError::Timeout(_) => ErrorKind::Timeout,
            DevacError::PermissionDenied(_) => ErrorKind::PermissionDenied,
        }
    }

    /// `Timeout` is treated as `ConnectionLost` per `spec.md` §7's policy,
    /// which drives the IPC client's auto-promotion dance (4.H).
    pub fn triggers_promotion(&self) -> bool {
        matches!(self, DevacError::ConnectionLost(_) | DevacError::Timeout(_))
    }
}

/// A bare discriminant for `DevacError`, serializable across the IPC wire
/// (`devac-hub`'s error responses carry this, not the full error with its
/// `std::io::Error` source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseDegraded,
    IoFailed,
    ConnectionLost,
    InvariantViolation,
    ModeMisuse,
    Timeout,
    PermissionDenied,
}

pub type DevacResult<T> = Result<T, DevacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_connection_lost_trigger_promotion() {
        assert!(DevacError::Timeout(std::time::Duration::from_secs(2)).triggers_promotion());
        assert!(DevacError::ConnectionLost("refused".into()).triggers_promotion());
        assert!(!DevacError::ModeMisuse("hub only".into()).triggers_promotion());
    }

    #[test]
    fn kind_round_trips_through_json() {
        let kind = ErrorKind::InvariantViolation;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"invariant_violation\"");
        let back: ErrorKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }
}
