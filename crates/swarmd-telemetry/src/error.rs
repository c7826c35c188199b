//! Failures raised while installing logging or exporting engine metrics.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::string::FromUtf8Error;

use prometheus::Error as PrometheusError;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Step at which an engine collector failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Telemetry failures.
#[derive(Debug)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    LoggingInstall {
        /// Subscriber installation error.
        source: TryInitError,
    },
    /// An engine collector could not be set up.
    Collector {
        /// Metric name.
        metric: &'static str,
        /// Step that failed.
        stage: CollectorStage,
        /// Prometheus error.
        source: PrometheusError,
    },
    /// Text exposition could not be encoded.
    Exposition {
        /// Prometheus error.
        source: PrometheusError,
    },
    /// Text exposition produced invalid UTF-8.
    ExpositionUtf8 {
        /// Conversion error.
        source: FromUtf8Error,
    },
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::LoggingInstall { .. } => "logging subscriber already installed",
            Self::Collector {
                stage: CollectorStage::Build,
                ..
            } => "engine collector could not be built",
            Self::Collector {
                stage: CollectorStage::Register,
                ..
            } => "engine collector could not be registered",
            Self::Exposition { .. } => "metrics exposition failed",
            Self::ExpositionUtf8 { .. } => "metrics exposition was not utf-8",
        };
        formatter.write_str(message)
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LoggingInstall { source } => Some(source),
            Self::Collector { source, .. } | Self::Exposition { source } => Some(source),
            Self::ExpositionUtf8 { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_errors_name_the_stage() {
        let err = TelemetryError::Collector {
            metric: "swarmd_active_torrents",
            stage: CollectorStage::Register,
            source: PrometheusError::AlreadyReg,
        };
        assert_eq!(err.to_string(), "engine collector could not be registered");
        assert!(err.source().is_some());

        let utf8 = String::from_utf8(vec![0xff]).expect_err("invalid utf-8");
        let err = TelemetryError::ExpositionUtf8 { source: utf8 };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
    }
}
