//! Error types for torrent core services.

use std::error::Error;

use swarmd_events::TorrentId;
use thiserror::Error;

/// Primary error type for torrent operations.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// A request argument failed validation.
    #[error("invalid torrent request")]
    Validation {
        /// Offending request field.
        field: &'static str,
        /// Reason the value was rejected.
        reason: &'static str,
        /// Rejected value, when it helps diagnostics.
        value: Option<String>,
    },
    /// The native session failed the operation.
    #[error("torrent engine operation failed")]
    Engine {
        /// Operation identifier.
        operation: &'static str,
        /// Torrent identifier when available.
        torrent_id: Option<TorrentId>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The native session is not running.
    #[error("torrent engine is not running")]
    EngineNotRunning {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Torrent was not found.
    #[error("torrent not found")]
    NotFound {
        /// Missing torrent identifier.
        torrent_id: TorrentId,
    },
}

impl TorrentError {
    /// Build a validation error without a captured value.
    #[must_use]
    pub const fn validation(field: &'static str, reason: &'static str) -> Self {
        Self::Validation {
            field,
            reason,
            value: None,
        }
    }

    /// Build a validation error that records the rejected value.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: &'static str, value: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason,
            value: Some(value.into()),
        }
    }

    /// Wrap an engine failure with operation context.
    #[must_use]
    pub fn engine(
        operation: &'static str,
        torrent_id: Option<TorrentId>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Engine {
            operation,
            torrent_id,
            source: source.into(),
        }
    }

    /// Whether this error is an engine failure.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine { .. } | Self::EngineNotRunning { .. })
    }
}

/// Convenience alias for torrent operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn engine_error_keeps_context_and_source() {
        let id = TorrentId::from_info_hash(&[1; 20]);
        let err = TorrentError::engine(
            "add_torrent",
            Some(id.clone()),
            io::Error::other("save path unavailable"),
        );
        assert!(err.is_engine());
        assert_eq!(err.to_string(), "torrent engine operation failed");
        match &err {
            TorrentError::Engine {
                operation,
                torrent_id,
                ..
            } => {
                assert_eq!(*operation, "add_torrent");
                assert_eq!(torrent_id.as_ref(), Some(&id));
            }
            other => panic!("unexpected variant {other:?}"),
        }
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("save path"));
    }

    #[test]
    fn validation_helpers_populate_fields() {
        let err = TorrentError::invalid_value("save_path", "must not be empty", "");
        assert!(!err.is_engine());
        assert!(matches!(
            err,
            TorrentError::Validation {
                field: "save_path",
                value: Some(_),
                ..
            }
        ));
        assert!(matches!(
            TorrentError::validation("ids", "empty"),
            TorrentError::Validation { value: None, .. }
        ));
    }
}
