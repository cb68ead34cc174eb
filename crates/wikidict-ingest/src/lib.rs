//! wikidict Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Builds dictionaries from Wiktionary dumps without holding the dump in
//! memory or on disk in decompressed form.
//!
//! # Overview
//!
//! - **Streaming filters**: [`decompress`] (gzip, bzip2) and [`tar`] turn
//!   arbitrary byte chunks into arbitrary byte chunks
//! - **XML extraction**: [`xml::Iterate`] reports closed elements by path and
//!   [`xml::Select`] groups them into records
//! - **Pipeline**: [`pipeline::Pipeline`] runs each stage on its own thread,
//!   linked by [`queue::BoundedQueue`]s
//! - **Sources**: [`fetch`] streams over HTTP or from files, [`cache`] keeps
//!   the last downloaded dump keyed by its checksum
//! - **Output**: [`dictionary::DictionaryWriter`] with a SQLite implementation
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use wikidict_ingest::{DumpSource, GenerationOrchestrator, IngestConfig, SqliteDictionary};
//!
//! fn main() -> wikidict_ingest::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let source = DumpSource::parse("frwiktionary")?;
//!     let dictionary = SqliteDictionary::create(config.dictionary_path(&source.name()))?;
//!
//!     let orchestrator = GenerationOrchestrator::new(config, CancellationToken::new());
//!     let (_, report) = orchestrator.generate(&source, dictionary)?;
//!     println!("{}", report.stats);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decompress;
pub mod dictionary;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod manifest;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod tar;
pub mod wiktionary;
pub mod xml;

// Re-export commonly used types
pub use config::IngestConfig;
pub use dictionary::{DictionaryWriter, SqliteDictionary};
pub use error::{IngestError, Result, Severity};
pub use orchestrator::{DumpProcessor, GenerationOrchestrator, GenerationReport};
pub use wiktionary::{DumpFormat, DumpSource};
