//! Content-hash-validated dump cache
//!
//! A cached dump lives at `<dir>/<name>`. Next to it, `<name>.<algorithm>`
//! holds the hex digest the data was committed under; a lookup only hits
//! when that marker equals the current key, so a republished dump is never
//! served from a stale copy.
//!
//! Writing goes to `<name>.new` and becomes visible in [`CacheWriter::commit`]
//! by rename, marker last. An advisory lock on `<name>.lock` keeps two runs
//! from writing the same entry; the OS drops it when the holder exits, so a
//! crashed run never blocks the next one. Every failure here is reported as
//! [`IngestError::Cache`], which callers treat as recoverable.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info, warn};
use wikidict_common::checksum::Digest;
use wikidict_common::ChecksumAlgorithm;

use crate::error::{IngestError, Result};

const TEMP_SUFFIX: &str = "new";
const LOCK_SUFFIX: &str = "lock";

fn cache_err(action: &str, path: &Path, err: io::Error) -> IngestError {
    IngestError::cache(format!("{} {}: {}", action, path.display(), err))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// On-disk cache directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn marker_path(&self, name: &str, algorithm: ChecksumAlgorithm) -> PathBuf {
        with_suffix(&self.data_path(name), algorithm.as_str())
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        with_suffix(&self.data_path(name), TEMP_SUFFIX)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        with_suffix(&self.data_path(name), LOCK_SUFFIX)
    }

    /// Open the cached data for `name` if it was committed under `key`
    pub fn try_load(&self, name: &str, key: &Digest) -> Result<Option<File>> {
        let marker = self.marker_path(name, key.algorithm());
        let stored = match fs::read_to_string(&marker) {
            Ok(stored) => stored,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(name, "No cache marker");
                return Ok(None);
            },
            Err(e) => return Err(cache_err("reading", &marker, e)),
        };
        if !stored.trim().eq_ignore_ascii_case(&key.to_hex()) {
            info!(name, cached = stored.trim(), current = %key.to_hex(), "Cached dump is stale");
            return Ok(None);
        }

        let data = self.data_path(name);
        match File::open(&data) {
            Ok(file) => {
                debug!(name, path = %data.display(), "Cache hit");
                Ok(Some(file))
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(name, "Cache marker present without data");
                Ok(None)
            },
            Err(e) => Err(cache_err("opening", &data, e)),
        }
    }

    /// Start writing a new copy of `name`, to be committed under `key`
    pub fn begin(&self, name: &str, key: &Digest) -> Result<CacheWriter> {
        fs::create_dir_all(&self.dir).map_err(|e| cache_err("creating", &self.dir, e))?;

        // The lock file itself stays; only the lock on it matters
        let lock_path = self.lock_path(name);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| cache_err("opening", &lock_path, e))?;
        if let Err(e) = lock.try_lock_exclusive() {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(IngestError::cache(format!("{} is being written by another run", name)));
            }
            return Err(cache_err("locking", &lock_path, e));
        }

        let temp = self.temp_path(name);
        let file = File::create(&temp).map_err(|e| cache_err("creating", &temp, e))?;
        debug!(name, path = %temp.display(), "Writing cache entry");

        Ok(CacheWriter {
            file: Some(BufWriter::new(file)),
            data: self.data_path(name),
            marker: self.marker_path(name, key.algorithm()),
            temp,
            _lock: lock,
            key: key.to_hex(),
            bytes_written: 0,
            committed: false,
        })
    }

    /// Remove the cached data, its markers and any leftover temp file
    ///
    /// Returns whether anything was removed.
    pub fn clear(&self, name: &str) -> Result<bool> {
        let paths = [
            self.data_path(name),
            self.temp_path(name),
            self.marker_path(name, ChecksumAlgorithm::Md5),
        ];

        let mut removed = false;
        for path in paths {
            removed |= remove_if_exists(&path).map_err(|e| cache_err("removing", &path, e))?;
        }
        if removed {
            info!(name, "Cleared cache entry");
        }
        Ok(removed)
    }
}

/// Exclusive writer for one cache entry
///
/// Dropping it without [`commit`](CacheWriter::commit) discards the partial
/// copy; an existing committed entry is left untouched.
#[derive(Debug)]
pub struct CacheWriter {
    file: Option<BufWriter<File>>,
    data: PathBuf,
    marker: PathBuf,
    temp: PathBuf,
    /// Held for the writer's lifetime; dropped after `Drop::drop` runs
    _lock: File,
    key: String,
    bytes_written: u64,
    committed: bool,
}

impl CacheWriter {
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(IngestError::cache("write after commit"));
        };
        file.write_all(chunk)
            .map_err(|e| cache_err("writing", &self.temp, e))?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Make the written data the cached copy
    ///
    /// The old marker goes first and the new one is written last, so a crash
    /// at any point leaves either no valid entry or a complete one.
    pub fn commit(mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Err(IngestError::cache("cache entry already committed"));
        };
        let file = file
            .into_inner()
            .map_err(|e| cache_err("flushing", &self.temp, e.into_error()))?;
        file.sync_all().map_err(|e| cache_err("syncing", &self.temp, e))?;
        drop(file);

        remove_if_exists(&self.marker).map_err(|e| cache_err("removing", &self.marker, e))?;
        fs::rename(&self.temp, &self.data).map_err(|e| cache_err("renaming", &self.temp, e))?;

        let marker_temp = with_suffix(&self.marker, TEMP_SUFFIX);
        fs::write(&marker_temp, format!("{}\n", self.key))
            .map_err(|e| cache_err("writing", &marker_temp, e))?;
        fs::rename(&marker_temp, &self.marker)
            .map_err(|e| cache_err("renaming", &marker_temp, e))?;

        self.committed = true;
        info!(
            path = %self.data.display(),
            bytes = self.bytes_written,
            "Committed cache entry"
        );
        Ok(())
    }
}

#[cfg(test)]
impl CacheWriter {
    /// Swap the temp file for a read-only handle so every write fails
    pub(crate) fn make_unwritable(&mut self) {
        if let Ok(file) = File::open(&self.temp) {
            self.file = Some(BufWriter::with_capacity(0, file));
        }
    }
}

impl Drop for CacheWriter {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            if let Err(e) = remove_if_exists(&self.temp) {
                warn!(path = %self.temp.display(), error = %e, "Failed to remove partial cache file");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn key(hex: &str) -> Digest {
        Digest::from_hex(ChecksumAlgorithm::Md5, hex).unwrap()
    }

    const KEY_A: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const KEY_B: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn read_all(mut file: File) -> Vec<u8> {
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_round_trip_and_key_mismatch() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path().join("cache"));
        assert!(store.try_load("dump.xml.bz2", &key(KEY_A)).unwrap().is_none());

        let mut writer = store.begin("dump.xml.bz2", &key(KEY_A)).unwrap();
        writer.write(b"hello ").unwrap();
        writer.write(b"world").unwrap();
        assert_eq!(writer.bytes_written(), 11);
        writer.commit().unwrap();

        let file = store.try_load("dump.xml.bz2", &key(KEY_A)).unwrap().unwrap();
        assert_eq!(read_all(file), b"hello world");
        assert!(store.try_load("dump.xml.bz2", &key(KEY_B)).unwrap().is_none());

        let marker = fs::read_to_string(store.marker_path("dump.xml.bz2", ChecksumAlgorithm::Md5)).unwrap();
        assert_eq!(marker.trim(), KEY_A);
        assert!(!store.temp_path("dump.xml.bz2").exists());
    }

    #[test]
    fn test_abandoned_write_leaves_previous_entry() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());

        let mut writer = store.begin("d", &key(KEY_A)).unwrap();
        writer.write(b"old").unwrap();
        writer.commit().unwrap();

        let mut writer = store.begin("d", &key(KEY_B)).unwrap();
        writer.write(b"partial").unwrap();
        drop(writer);

        assert!(!store.temp_path("d").exists());
        assert!(store.try_load("d", &key(KEY_B)).unwrap().is_none());
        let file = store.try_load("d", &key(KEY_A)).unwrap().unwrap();
        assert_eq!(read_all(file), b"old");
    }

    #[test]
    fn test_concurrent_writer_is_refused() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let first = store.begin("d", &key(KEY_A)).unwrap();
        let err = CacheStore::new(tmp.path()).begin("d", &key(KEY_A)).unwrap_err();
        assert!(matches!(err, IngestError::Cache(_)));
        assert!(!err.is_fatal());

        drop(first);
        assert!(store.begin("d", &key(KEY_A)).is_ok());
    }

    #[test]
    fn test_leftovers_of_crashed_run_do_not_block() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        // A killed process leaves its lock file and partial copy, but no lock
        fs::write(store.lock_path("d"), b"").unwrap();
        fs::write(store.temp_path("d"), b"half a dump").unwrap();

        let mut writer = store.begin("d", &key(KEY_A)).unwrap();
        writer.write(b"whole").unwrap();
        writer.commit().unwrap();

        let file = store.try_load("d", &key(KEY_A)).unwrap().unwrap();
        assert_eq!(read_all(file), b"whole");
    }

    #[test]
    fn test_marker_without_data_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        fs::write(store.marker_path("d", ChecksumAlgorithm::Md5), KEY_A).unwrap();
        assert!(store.try_load("d", &key(KEY_A)).unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        assert!(!store.clear("d").unwrap());

        let mut writer = store.begin("d", &key(KEY_A)).unwrap();
        writer.write(b"x").unwrap();
        writer.commit().unwrap();

        assert!(store.clear("d").unwrap());
        assert!(!store.data_path("d").exists());
        assert!(store.try_load("d", &key(KEY_A)).unwrap().is_none());
    }
}
