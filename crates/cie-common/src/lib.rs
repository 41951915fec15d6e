//! CIE Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the canonical ingestion engine.
//!
//! # Overview
//!
//! - **Error Handling**: [`CieError`] and the [`Result`] alias used by configuration
//!   loading and the binaries
//! - **Logging**: centralized `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use cie_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{CieError, Result};
