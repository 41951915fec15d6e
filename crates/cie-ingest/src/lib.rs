//! Canonical Ingestion Engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fans one self-describing business event out into a hierarchy of relational
//! rows, driven entirely by per-event-type configuration.
//!
//! # Pipeline
//!
//! 1. [`Envelope::parse`] reads the wire envelope and checks the payload is JSON
//! 2. a [`rules::RuleEvaluator`] decides admission and may normalize the payload
//! 3. the [`EventRegistry`] supplies the event's tables in processing order
//! 4. the [`mapping::FieldMapper`] and [`mapping::FanoutBuilder`] produce rows
//! 5. the [`sql::SqlSynthesizer`] keeps only columns the live schema has
//! 6. [`executor::insert`] writes them, absorbing duplicates
//!
//! All writes for one event share a transaction.
//!
//! # Example
//!
//! ```no_run
//! use cie_ingest::{load_config, IngestionService, MemoryStore};
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = load_config(Path::new("config"))?;
//! let store = MemoryStore::from_registry(&config.registry, &config.policy);
//! let service = IngestionService::from_config(store, config);
//!
//! let report = service
//!     .ingest(r#"{"eventName":"AVS","eventPayload":"{\"avsTranId\":\"T1\"}"}"#)
//!     .await?;
//! println!("{} rows", report.rows_inserted);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod ids;
pub mod json_path;
pub mod loader;
pub mod mapping;
pub mod orchestrator;
pub mod policy;
pub mod report;
pub mod rules;
pub mod sql;
pub mod store;
pub mod value;

pub use config::{AddressRule, EventConfig, EventRegistry, TableDefinition, TableKind};
pub use envelope::Envelope;
pub use error::{IngestError, IngestFailure};
pub use loader::{load_config, LoadedConfig};
pub use orchestrator::{IngestionService, IngestionServiceBuilder};
pub use policy::IngestionPolicy;
pub use report::{IngestionReport, Outcome, TableReport};
pub use store::{MemoryStore, PgStore, Store, StoreError};
pub use value::{MappedRow, ScalarValue};
