#![forbid(unsafe_code)]
#![warn(
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! File and environment backed configuration for the swarmd engine.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (JSON file plus
//! environment overrides), `validate.rs` (field checks), `defaults.rs`.

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    ENV_ADD_TIMEOUT_MS, ENV_CONFIG_PATH, ENV_DOWNLOAD_ROOT, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
    ENV_METADATA_DIR, load, load_with,
};
pub use model::{EngineConfig, LoggingSettings, SimulationSettings};
pub use validate::validate;
