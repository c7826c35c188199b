//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: swarmd_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: swarmd_telemetry::TelemetryError,
    },
    /// Torrent engine operations failed.
    #[error("torrent operation failed")]
    Torrent {
        /// Operation identifier.
        operation: &'static str,
        /// Source torrent error.
        source: swarmd_torrent_core::TorrentError,
    },
    /// Metadata repository setup failed.
    #[error("repository operation failed")]
    Repository {
        /// Operation identifier.
        operation: &'static str,
        /// Source repository error.
        source: Box<dyn StdError + Send + Sync>,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: swarmd_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: swarmd_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn torrent(
        operation: &'static str,
        source: swarmd_torrent_core::TorrentError,
    ) -> Self {
        Self::Torrent { operation, source }
    }

    pub(crate) fn repository(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Repository {
            operation,
            source: source.into(),
        }
    }
}
