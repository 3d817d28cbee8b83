use crate::error::{StoreError, StoreResult};
use crate::time;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use rusqlite::{params, Connection, OptionalExtension};

const DB_FILE_NAME: &str = "diskcache.sqlite";
const STATEMENT_CACHE_CAPACITY: usize = 16;
const CLOSE_RETRY_LIMIT: u32 = 5;

/// Row metadata used by size- and count-based trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItemInfo {
  pub key: String,
  /// Set when the payload lives in a sidecar file rather than the row.
  pub filename: Option<String>,
  /// Byte length of the payload.
  pub size: i64,
}

/// Owns `<root>/diskcache.<name>/`: one SQLite database plus the sidecar
/// payload files that live next to it.
///
/// Each key maps to one row. Payloads at or below the tier's inline
/// threshold are stored in the row as a blob; larger payloads go to a
/// sidecar file named by the row's `filename` column. Exactly one of the
/// two is ever set.
///
/// The store is not internally synchronized; the owning tier serializes
/// access through its mutex.
pub(crate) struct DiskStore {
  dir: PathBuf,
  conn: Option<Connection>,
}

impl DiskStore {
  /// Opens (or creates) the cache directory and database for `name` under
  /// `root`.
  pub(crate) fn open(root: &Path, name: &str) -> StoreResult<Self> {
    let dir = root.join(format!("diskcache.{name}"));
    fs::create_dir_all(&dir)?;
    let conn = Self::open_database(&dir)?;
    Ok(Self {
      dir,
      conn: Some(conn),
    })
  }

  fn open_database(dir: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(dir.join(DB_FILE_NAME))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    conn.execute_batch(
      "CREATE TABLE IF NOT EXISTS detailed (
         key TEXT PRIMARY KEY,
         filename TEXT,
         inline_data BLOB,
         size INTEGER,
         last_access_time INTEGER
       );
       CREATE INDEX IF NOT EXISTS last_access_time_index
         ON detailed (last_access_time);",
    )?;
    Ok(conn)
  }

  fn conn(&self) -> StoreResult<&Connection> {
    self.conn.as_ref().ok_or(StoreError::Closed)
  }

  /// The directory holding the database and all sidecar files.
  pub(crate) fn directory(&self) -> &Path {
    &self.dir
  }

  /// Persists `bytes` under `key`.
  ///
  /// With a sidecar name, the payload file is written first and the row
  /// only updated on success; if the row update fails the fresh file is
  /// removed again. Without one, the payload is stored inline and any
  /// sidecar file left over from a previous larger write is deleted.
  pub(crate) fn write(&self, key: &str, bytes: &[u8], sidecar: Option<&str>) -> StoreResult<()> {
    let now = time::now_epoch_secs();
    let size = bytes.len() as i64;

    match sidecar {
      Some(filename) => {
        let path = self.dir.join(filename);
        fs::write(&path, bytes)?;
        if let Err(err) = self.upsert_row(key, Some(filename), None, size, now) {
          // The row never landed; do not leave the payload behind.
          self.delete_payload_file(filename);
          return Err(err);
        }
        Ok(())
      }
      None => {
        if let Some(previous) = self.filename_for(key)? {
          self.delete_payload_file(&previous);
        }
        self.upsert_row(key, None, Some(bytes), size, now)
      }
    }
  }

  fn upsert_row(
    &self,
    key: &str,
    filename: Option<&str>,
    inline: Option<&[u8]>,
    size: i64,
    now: i64,
  ) -> StoreResult<()> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(
      "INSERT OR REPLACE INTO detailed
         (key, filename, inline_data, size, last_access_time)
       VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    stmt.execute(params![key, filename, inline, size, now])?;
    Ok(())
  }

  /// Returns the payload for `key`, updating its access time.
  ///
  /// The row's `size` is authoritative for sidecar payloads; a longer file
  /// is truncated to it and a shorter one is returned as found, with a
  /// warning either way.
  pub(crate) fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
    let row = {
      let conn = self.conn()?;
      let mut stmt = conn.prepare_cached(
        "SELECT filename, inline_data, size FROM detailed WHERE key = ?1",
      )?;
      stmt
        .query_row(params![key], |row| {
          Ok((
            row.get::<_, Option<String>>(0)?,
            row.get::<_, Option<Vec<u8>>>(1)?,
            row.get::<_, i64>(2)?,
          ))
        })
        .optional()?
    };

    let Some((filename, inline, size)) = row else {
      return Ok(None);
    };

    self.touch(key)?;

    match filename {
      Some(name) => {
        let path = self.dir.join(&name);
        let mut bytes = fs::read(&path)?;
        if bytes.len() as i64 != size {
          warn!(
            "payload {} is {} bytes but the row says {size}",
            path.display(),
            bytes.len()
          );
          bytes.truncate(size.max(0) as usize);
        }
        Ok(Some(bytes))
      }
      None => Ok(inline),
    }
  }

  fn touch(&self, key: &str) -> StoreResult<()> {
    let conn = self.conn()?;
    let mut stmt =
      conn.prepare_cached("UPDATE detailed SET last_access_time = ?1 WHERE key = ?2")?;
    stmt.execute(params![time::now_epoch_secs(), key])?;
    Ok(())
  }

  pub(crate) fn contains(&self, key: &str) -> StoreResult<bool> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("SELECT count(key) FROM detailed WHERE key = ?1")?;
    let count: i64 = stmt.query_row(params![key], |row| row.get(0))?;
    Ok(count > 0)
  }

  pub(crate) fn filename_for(&self, key: &str) -> StoreResult<Option<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("SELECT filename FROM detailed WHERE key = ?1")?;
    let filename = stmt
      .query_row(params![key], |row| row.get::<_, Option<String>>(0))
      .optional()?;
    Ok(filename.flatten())
  }

  /// Deletes the row for `key` and its sidecar file, if any.
  pub(crate) fn remove(&self, key: &str) -> StoreResult<()> {
    if let Some(filename) = self.filename_for(key)? {
      self.delete_payload_file(&filename);
    }
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("DELETE FROM detailed WHERE key = ?1")?;
    stmt.execute(params![key])?;
    Ok(())
  }

  /// Removes a sidecar payload file. Missing files are fine; anything else
  /// is logged and otherwise ignored, since the row state is what matters.
  pub(crate) fn delete_payload_file(&self, filename: &str) {
    let path = self.dir.join(filename);
    match fs::remove_file(&path) {
      Ok(()) => {}
      Err(err) if err.kind() == io::ErrorKind::NotFound => {}
      Err(err) => warn!("failed to remove payload {}: {err}", path.display()),
    }
  }

  /// Drops everything: closes the database, deletes the whole cache
  /// directory, then recreates it and reopens a fresh database.
  pub(crate) fn remove_all(&mut self) -> StoreResult<()> {
    self.close()?;

    for suffix in ["", "-wal", "-shm"] {
      let path = self.dir.join(format!("{DB_FILE_NAME}{suffix}"));
      match fs::remove_file(&path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {err}", path.display()),
      }
    }
    fs::remove_dir_all(&self.dir)?;
    fs::create_dir_all(&self.dir)?;

    self.conn = Some(Self::open_database(&self.dir)?);
    Ok(())
  }

  /// Closes the connection, retrying while cached statements keep it busy.
  fn close(&mut self) -> StoreResult<()> {
    let Some(mut conn) = self.conn.take() else {
      return Ok(());
    };
    for attempt in 1..=CLOSE_RETRY_LIMIT {
      conn.flush_prepared_statement_cache();
      match conn.close() {
        Ok(()) => return Ok(()),
        Err((returned, err)) => {
          warn!("database close attempt {attempt} failed: {err}");
          conn = returned;
        }
      }
    }
    // Keep the handle so the store stays usable after the failure.
    self.conn = Some(conn);
    Err(StoreError::CloseFailed {
      attempts: CLOSE_RETRY_LIMIT,
    })
  }

  /// Sidecar filenames of every row last accessed before `cutoff`. The
  /// caller unlinks these before deleting the rows.
  pub(crate) fn expired_filenames(&self, cutoff: i64) -> StoreResult<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(
      "SELECT filename FROM detailed
       WHERE last_access_time < ?1 AND filename IS NOT NULL",
    )?;
    let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
    let mut filenames = Vec::new();
    for row in rows {
      filenames.push(row?);
    }
    Ok(filenames)
  }

  /// Deletes every row last accessed before `cutoff`, returning how many
  /// went.
  pub(crate) fn delete_expired(&self, cutoff: i64) -> StoreResult<usize> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("DELETE FROM detailed WHERE last_access_time < ?1")?;
    let deleted = stmt.execute(params![cutoff])?;
    Ok(deleted)
  }

  /// The `limit` least-recently-accessed items, oldest first.
  pub(crate) fn oldest_items(&self, limit: usize) -> StoreResult<Vec<StoredItemInfo>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(
      "SELECT key, filename, size FROM detailed
       ORDER BY last_access_time ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
      Ok(StoredItemInfo {
        key: row.get(0)?,
        filename: row.get(1)?,
        size: row.get(2)?,
      })
    })?;
    let mut items = Vec::new();
    for row in rows {
      items.push(row?);
    }
    Ok(items)
  }

  /// Total payload bytes across all rows.
  pub(crate) fn total_size(&self) -> StoreResult<i64> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("SELECT ifnull(sum(size), 0) FROM detailed")?;
    let total: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(total)
  }

  pub(crate) fn total_count(&self) -> StoreResult<i64> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached("SELECT count(key) FROM detailed")?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;
    Ok(count)
  }

  /// Flushes the WAL into the main database file. Called after bulk
  /// deletions so the journal does not grow unbounded.
  pub(crate) fn checkpoint(&self) -> StoreResult<()> {
    let conn = self.conn()?;
    conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
    Ok(())
  }

  /// Overwrites a row's access time. Maintenance tests use this instead of
  /// sleeping the clock forward.
  pub(crate) fn set_last_access_time(&self, key: &str, epoch_secs: i64) -> StoreResult<()> {
    let conn = self.conn()?;
    let mut stmt =
      conn.prepare_cached("UPDATE detailed SET last_access_time = ?1 WHERE key = ?2")?;
    stmt.execute(params![epoch_secs, key])?;
    Ok(())
  }

  // Full row contents, for tests that assert on the storage shape.
  #[cfg(test)]
  pub(crate) fn row(
    &self,
    key: &str,
  ) -> StoreResult<Option<(Option<String>, Option<Vec<u8>>, i64, i64)>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare_cached(
      "SELECT filename, inline_data, size, last_access_time FROM detailed WHERE key = ?1",
    )?;
    let row = stmt
      .query_row(params![key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()?;
    Ok(row)
  }
}
