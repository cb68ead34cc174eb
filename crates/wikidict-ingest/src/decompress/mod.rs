//! Incremental decompressors
//!
//! Both decoders accept input cut at arbitrary offsets, keep whatever the
//! native decoder has not consumed yet, and reopen on their own when a new
//! concatenated stream starts right after the previous one ended.

pub mod bzip2;
pub mod gzip;

use serde::{Deserialize, Serialize};

use crate::filter::StreamFilter;

pub use self::bzip2::Bzip2Decoder;
pub use self::gzip::GzipDecoder;

/// Size of the scratch window handed to the native decoders per call
pub(crate) const OUTPUT_WINDOW: usize = 64 * 1024;

/// Compression applied to a dump file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Infer the compression from a file name suffix
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".gz") || lower.ends_with(".tgz") {
            Compression::Gzip
        } else if lower.ends_with(".bz2") || lower.ends_with(".tbz2") {
            Compression::Bzip2
        } else {
            Compression::None
        }
    }

    /// Fresh decoder for this compression, `None` when bytes pass through
    pub fn decoder(self) -> Option<Box<dyn StreamFilter>> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some(Box::new(GzipDecoder::new())),
            Compression::Bzip2 => Some(Box::new(Bzip2Decoder::new())),
        }
    }
}
