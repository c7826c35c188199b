//! # Design
//!
//! - Centralize native adapter error context in one typed enum.
//! - Keep error messages constant; store operational context in fields.
//! - Provide helpers to build `TorrentError` with structured sources.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use swarmd_events::TorrentId;
use swarmd_torrent_core::TorrentError;

#[derive(Debug)]
/// Internal error details used by the native session adapter.
pub enum NativeError {
    /// The handle does not refer to a torrent in the native session.
    InvalidHandle {
        /// Operation that referenced the handle.
        operation: &'static str,
    },
    /// The save directory or payload files could not be prepared.
    SaveDirectory {
        /// Directory involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The metainfo payload could not be decoded.
    MalformedMetadata {
        /// Static reason describing the defect.
        reason: &'static str,
    },
    /// The magnet URI could not be interpreted.
    InvalidMagnet {
        /// Static reason describing the defect.
        reason: &'static str,
    },
    /// A `.torrent` file could not be read.
    SourceIo {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The native session rejected a request argument.
    InvalidInput {
        /// Field name with an invalid value.
        field: &'static str,
        /// Static reason describing the invalid value.
        reason: &'static str,
    },
    /// The native session is not running.
    SessionStopped {
        /// Operation that could not be serviced.
        operation: &'static str,
    },
    /// The native session reported an unclassified failure.
    NativeFailure {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Native error message payload.
        message: String,
    },
}

impl Display for NativeError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::InvalidHandle { .. } => "invalid native torrent handle",
            Self::SaveDirectory { .. } => "save directory unavailable",
            Self::MalformedMetadata { .. } => "malformed torrent metadata",
            Self::InvalidMagnet { .. } => "invalid magnet uri",
            Self::SourceIo { .. } => "torrent file unreadable",
            Self::InvalidInput { .. } => "invalid native session input",
            Self::SessionStopped { .. } => "native session stopped",
            Self::NativeFailure { .. } => "native session error",
        };
        formatter.write_str(message)
    }
}

impl Error for NativeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SaveDirectory { source, .. } | Self::SourceIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl NativeError {
    /// Whether this failure stems from the caller's input rather than the session.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMetadata { .. } | Self::InvalidMagnet { .. } | Self::SourceIo { .. }
        )
    }

    /// Recover a typed error from an `anyhow` failure raised by a session.
    #[must_use]
    pub fn from_session(operation: &'static str, err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(native) => native,
            Err(other) => Self::NativeFailure {
                operation,
                message: format!("{other:#}"),
            },
        }
    }
}

/// Build a torrent error with structured operation context.
pub fn op_failed(
    operation: &'static str,
    torrent_id: Option<TorrentId>,
    source: impl Error + Send + Sync + 'static,
) -> TorrentError {
    TorrentError::Engine {
        operation,
        torrent_id,
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn native_error_display_and_source() {
        let cases = vec![
            (
                NativeError::InvalidHandle { operation: "pause" },
                "invalid native torrent handle",
                false,
            ),
            (
                NativeError::SaveDirectory {
                    path: PathBuf::from("/nope"),
                    source: io::Error::other("denied"),
                },
                "save directory unavailable",
                true,
            ),
            (
                NativeError::MalformedMetadata { reason: "missing info" },
                "malformed torrent metadata",
                false,
            ),
            (
                NativeError::SessionStopped {
                    operation: "add_torrent",
                },
                "native session stopped",
                false,
            ),
            (
                NativeError::NativeFailure {
                    operation: "add_torrent",
                    message: "boom".into(),
                },
                "native session error",
                false,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }

    #[test]
    fn from_session_recovers_typed_errors() {
        let typed = anyhow::Error::new(NativeError::InvalidHandle { operation: "resume" });
        assert!(matches!(
            NativeError::from_session("resume", typed),
            NativeError::InvalidHandle { operation: "resume" }
        ));

        let untyped = anyhow::anyhow!("disk full");
        match NativeError::from_session("add_torrent", untyped) {
            NativeError::NativeFailure { operation, message } => {
                assert_eq!(operation, "add_torrent");
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn op_failed_wraps_torrent_error() {
        let torrent_id = TorrentId::from_info_hash(&[3; 20]);
        let err = op_failed("add", Some(torrent_id.clone()), io::Error::other("io"));
        match err {
            TorrentError::Engine {
                operation,
                torrent_id: Some(id),
                source,
            } => {
                assert_eq!(operation, "add");
                assert_eq!(id, torrent_id);
                assert_eq!(source.to_string(), "io");
            }
            other => panic!("expected engine error, got {other:?}"),
        }
    }
}
