//! Configuration: automation chains, the binary's runtime configuration, and
//! loading/validation/watch helpers.
//!
//! Example:
//! use uiflow::config::load_from_path;
//!
//! let cfg = load_from_path("config/default.json")?;

pub mod loader;
pub mod models;
pub mod watch;

pub use models::{
    AutomationConfig, ComponentConfig, EventConfig, LogLevel, RemoteConfig, RuntimeConfig,
    SourceConfig, StepConfig,
};

pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    validate_config, validate_keys, write_schema_to_writer,
};

pub use watch::{ConfigWatcher, watch_config};
