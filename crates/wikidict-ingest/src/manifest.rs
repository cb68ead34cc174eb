//! Checksum manifests published next to each dump
//!
//! Lines look like `md5sum` output: `<hex-digest>  <file-name>`, optionally
//! with a `*` marking binary mode in front of the name.

use wikidict_common::checksum::Digest;
use wikidict_common::ChecksumAlgorithm;

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub digest: Digest,
}

/// Parsed checksum manifest
#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    entries: Vec<ManifestEntry>,
}

impl ChecksumManifest {
    /// Parse manifest text; blank lines and `#` comments are skipped
    pub fn parse(text: &str, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let mut entries = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (hex, name) = line
                .split_once(char::is_whitespace)
                .ok_or_else(|| IngestError::corrupt("manifest", format!("line {}: missing file name", number + 1)))?;
            let name = name.trim_start().trim_start_matches('*');
            let digest = Digest::from_hex(algorithm, hex)
                .map_err(|e| IngestError::corrupt("manifest", format!("line {}: {}", number + 1, e)))?;
            entries.push(ManifestEntry {
                file_name: name.to_string(),
                digest,
            });
        }
        Ok(Self { entries })
    }

    /// Digest listed for `file_name`
    pub fn digest_for(&self, file_name: &str) -> Option<&Digest> {
        self.entries
            .iter()
            .find(|entry| entry.file_name == file_name)
            .map(|entry| &entry.digest)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }
}
