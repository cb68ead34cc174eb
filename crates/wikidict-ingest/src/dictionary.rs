//! Dictionary store
//!
//! The pipeline only needs [`DictionaryWriter`]; [`SqliteDictionary`] is the
//! store shipped with the binary. The whole run is one transaction, so a
//! failed run leaves the previous dictionary in place.

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// Sink for extracted entries
pub trait DictionaryWriter: Send {
    /// Add one entry; a rejected entry is reported as [`IngestError::Record`]
    fn add(&mut self, word: &str, description: &str) -> Result<()>;

    /// Make every added entry durable; called once, after a successful run
    fn commit(&mut self) -> Result<()>;
}

impl<W: DictionaryWriter + ?Sized> DictionaryWriter for Box<W> {
    fn add(&mut self, word: &str, description: &str) -> Result<()> {
        (**self).add(word, description)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}

/// Identifies dictionary files ("kmkd")
pub const APPLICATION_ID: u32 = 0x6b6d_6b64;
pub const SCHEMA_VERSION: u32 = 1;

fn db_err(err: rusqlite::Error) -> IngestError {
    IngestError::Dictionary(err.to_string())
}

/// SQLite-backed dictionary, rebuilt from scratch on every run
pub struct SqliteDictionary {
    conn: Connection,
    words: u64,
    committed: bool,
}

impl SqliteDictionary {
    /// Open (or create) the dictionary at `path` and start replacing its words
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "Opening dictionary");
        Self::init(Connection::open(path).map_err(db_err)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "PRAGMA application_id = {};
             PRAGMA user_version = {};
             BEGIN;
             DROP TABLE IF EXISTS word;
             CREATE TABLE word(word TEXT PRIMARY KEY, description TEXT NOT NULL) STRICT;",
            APPLICATION_ID, SCHEMA_VERSION
        ))
        .map_err(db_err)?;
        Ok(Self {
            conn,
            words: 0,
            committed: false,
        })
    }

    /// Entries added so far in this run
    pub fn words(&self) -> u64 {
        self.words
    }

    pub fn lookup(&self, word: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT description FROM word WHERE word = ?1",
                params![word],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM word", [], |row| row.get(0))
            .map_err(db_err)
    }
}

impl DictionaryWriter for SqliteDictionary {
    fn add(&mut self, word: &str, description: &str) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO word VALUES(?1, ?2)")
            .map_err(db_err)?;
        match stmt.execute(params![word, description]) {
            Ok(_) => {
                self.words += 1;
                Ok(())
            },
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(IngestError::record(word, "duplicate word"))
            },
            Err(e) => Err(db_err(e)),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(IngestError::Dictionary("dictionary already committed".to_string()));
        }
        self.conn.execute_batch("COMMIT").map_err(db_err)?;
        self.committed = true;
        debug!(words = self.words, "Dictionary committed");
        Ok(())
    }
}
