//! # pvebridge Common
//!
//! Shared utilities for the pvebridge tools.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use pvebridge_common::{init_logging_with_format, LogFormat};
//!
//! init_logging_with_format("info", LogFormat::Json).unwrap();
//! tracing::info!(vmid = 100, "VM created");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
