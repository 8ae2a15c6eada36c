#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! uiflow: event-driven automation chains for UI builders.
//!
//! A UI event (button click, input change) fires a chain of *executors*
//! (data producers) followed by *actions* (UI side effects). Every step's
//! configuration may embed `{{ }}` templates and function-mode expressions
//! evaluated against the event payload, the form and earlier results.
//!
//! - `expression`: template/function-mode expression compiler and sandbox.
//! - `content`: text / markdown / function content rendering.
//! - `executor`: executor contract, registry and built-ins.
//! - `action`: action contract, registry and built-ins.
//! - `runtime`: execution context, chain orchestration, guards.
//! - `trigger`: automatable component types and their events.
//! - `host`: capabilities the embedding UI provides (notices, form, overlays).
//! - `remote`: client for the host application's data service.
//! - `config`: configuration models, loader, schema and hot reload.
//! - `sources`: headless event sources (file, stdin).
//!
//! Use `uiflow::prelude::*` to bring commonly used items into scope quickly.

pub mod action;
pub mod config;
pub mod content;
pub mod executor;
pub mod expression;
pub mod host;
pub mod manager;
pub mod registry;
pub mod remote;
pub mod runtime;
pub mod sources;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Initialize tracing at `level`, or from `RUST_LOG` (falling back to `info`)
/// when `level` is `None`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<tracing::Level>) {
    use tracing::Level;
    use tracing_subscriber::fmt;

    let level = level
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|s| match s.to_lowercase().as_str() {
                    "trace" => Some(Level::TRACE),
                    "debug" => Some(Level::DEBUG),
                    "info" => Some(Level::INFO),
                    "warn" | "warning" => Some(Level::WARN),
                    "error" => Some(Level::ERROR),
                    _ => None,
                })
        })
        .unwrap_or(Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use uiflow::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use std::time::Duration;
    pub use tokio::time::sleep;

    pub use crate as uiflow;

    pub use crate::action::{ActionDefinition, ActionError, ActionRegistry};
    pub use crate::config::{AutomationConfig, EventConfig, RuntimeConfig, StepConfig};
    pub use crate::executor::{ExecutorDefinition, ExecutorError, ExecutorRegistry, ExecutorResult};
    pub use crate::host::HostServices;
    pub use crate::manager::AutomationManager;
    pub use crate::registry::Keyed;
    pub use crate::runtime::{ExecutionContext, Runtime, TriggerGuard, TriggerOutcome};
}
