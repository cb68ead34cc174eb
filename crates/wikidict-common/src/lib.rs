//! wikidict Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the wikidict workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Checksums**: streaming digests used to validate downloaded dumps
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: dictionary records and checksum algorithm identifiers
//!
//! # Example
//!
//! ```no_run
//! use wikidict_common::checksum::compute_file_checksum;
//! use wikidict_common::types::ChecksumAlgorithm;
//!
//! fn main() -> wikidict_common::Result<()> {
//!     let digest = compute_file_checksum("dump.xml.bz2", ChecksumAlgorithm::Md5)?;
//!     println!("{digest}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
pub use types::{ChecksumAlgorithm, DictionaryRecord};
