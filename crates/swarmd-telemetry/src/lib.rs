#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Logging and metrics primitives shared by the swarmd crates.
//!
//! Layout: `init.rs` (tracing subscriber installation), `metrics.rs`
//! (Prometheus registry), `error.rs` (`TelemetryError`).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{CollectorStage, Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
