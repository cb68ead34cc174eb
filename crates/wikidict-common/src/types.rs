//! Common types used across wikidict

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

/// A single dictionary entry produced by the extractor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DictionaryRecord {
    pub word: String,
    pub description: String,
}

impl DictionaryRecord {
    pub fn new(word: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            description: description.into(),
        }
    }
}

/// Checksum algorithm type
///
/// Wikimedia publishes md5 and sha1 manifests next to every dump; md5 is the
/// one we consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Md5,
}

impl ChecksumAlgorithm {
    /// Length of a raw digest in bytes
    pub fn digest_len(self) -> usize {
        match self {
            ChecksumAlgorithm::Md5 => 16,
        }
    }

    /// Identifier used in file names and manifests
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            other => Err(CommonError::UnknownAlgorithm(other.to_string())),
        }
    }
}
