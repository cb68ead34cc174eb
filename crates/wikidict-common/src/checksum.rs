//! Checksum utilities for dump verification
//!
//! Digests are computed incrementally so that a multi-gigabyte dump can be
//! verified while it streams through the pipeline instead of after the fact.

use crate::error::{CommonError, Result};
use crate::types::ChecksumAlgorithm;
use std::io::Read;
use std::path::Path;

/// A finished digest together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: ChecksumAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    /// Decode a hex digest, checking its length against the algorithm
    pub fn from_hex(algorithm: ChecksumAlgorithm, hex_digest: &str) -> Result<Self> {
        let bytes = hex::decode(hex_digest.trim())
            .map_err(|e| CommonError::InvalidDigest(format!("'{}': {}", hex_digest, e)))?;
        Self::from_bytes(algorithm, bytes)
    }

    /// Wrap raw digest bytes, checking their length against the algorithm
    pub fn from_bytes(algorithm: ChecksumAlgorithm, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != algorithm.digest_len() {
            return Err(CommonError::InvalidDigest(format!(
                "{} digest must be {} bytes, got {}",
                algorithm,
                algorithm.digest_len(),
                bytes.len()
            )));
        }
        Ok(Self { algorithm, bytes })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    algorithm: ChecksumAlgorithm,
    md5: md5::Context,
}

impl Hasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self {
                algorithm,
                md5: md5::Context::new(),
            },
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn update(&mut self, data: &[u8]) {
        self.md5.consume(data);
    }

    pub fn finalize(self) -> Digest {
        Digest {
            algorithm: self.algorithm,
            bytes: self.md5.compute().0.to_vec(),
        }
    }
}

/// Compute checksum for any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<Digest> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute checksum for a file
pub fn compute_file_checksum(path: impl AsRef<Path>, algorithm: ChecksumAlgorithm) -> Result<Digest> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

/// Compare a computed digest against the expected one
pub fn verify_digest(expected: &Digest, actual: &Digest) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Verify checksum for a file
pub fn verify_file_checksum(path: impl AsRef<Path>, expected: &Digest) -> Result<()> {
    let actual = compute_file_checksum(path, expected.algorithm())?;
    verify_digest(expected, &actual)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_compute_checksum_md5() {
        let mut cursor = Cursor::new(b"hello world");
        let digest = compute_checksum(&mut cursor, ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(digest.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = Hasher::new(ChecksumAlgorithm::Md5);
        hasher.update(b"hello");
        hasher.update(b"");
        hasher.update(b" world");
        let expected = Digest::from_hex(ChecksumAlgorithm::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        assert_eq!(hasher.finalize(), expected);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(Digest::from_hex(ChecksumAlgorithm::Md5, "abcd").is_err());
        assert!(Digest::from_hex(ChecksumAlgorithm::Md5, "zz").is_err());
        assert!(Digest::from_hex(ChecksumAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e").is_ok());
    }

    #[test]
    fn test_verify_file_checksum() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"hello world").unwrap();
        temp_file.flush().unwrap();

        let good = Digest::from_hex(ChecksumAlgorithm::Md5, "5eb63bbbe01eeed093cb22bb8f5acdc3").unwrap();
        assert!(verify_file_checksum(temp_file.path(), &good).is_ok());

        let bad = Digest::from_hex(ChecksumAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e").unwrap();
        let result = verify_file_checksum(temp_file.path(), &bad);
        assert!(matches!(result.unwrap_err(), CommonError::ChecksumMismatch { .. }));
    }
}
