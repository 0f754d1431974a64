//! Durable checkpoint store backing resumable pagination.
//!
//! The store is a single JSON object persisted to one file per export run.
//! Keys are namespaced resource identifiers such as `"my-repo/pr"` (page
//! cursor) or `"my-repo/pr/data"` (accumulated data); values are arbitrary
//! JSON, re-decoded into typed structures on read. The whole table is
//! rewritten on every save - losing the most recent checkpoint only risks
//! redundant work on resume, never corruption.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Page-cursor value marking a resource's pagination as fully drained.
///
/// Any other cursor value is the next page number to fetch. A missing key is
/// distinct from a cursor of `0` - "never checkpointed" vs "checkpointed at
/// page zero".
pub const DRAINED_CURSOR: i64 = -1;

/// Errors that can occur reading or writing the checkpoint file.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint file exists but could not be parsed.
    #[error("checkpoint file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized or re-decoded.
    #[error("checkpoint value for key {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem error reading or writing the checkpoint file.
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Key-value store holding heterogeneous checkpoint payloads for one export
/// run, persisted atomically to a single file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    table: Mutex<BTreeMap<String, Value>>,
}

impl CheckpointStore {
    /// Create a store backed by the given file. No I/O happens until
    /// [`load`](Self::load) or the first [`save`](Self::save).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(BTreeMap::new()),
        }
    }

    /// The file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the table from disk. A missing file is a first run and succeeds
    /// with an empty table; a file that fails to parse is a structural error.
    ///
    /// Must be called, if at all, before any read or save in the run.
    pub fn load(&self) -> Result<(), CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no checkpoint file, starting fresh");
                return Ok(());
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let loaded: BTreeMap<String, Value> =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(
            path = %self.path.display(),
            entries = loaded.len(),
            "loaded checkpoint table"
        );
        *self.table.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
        Ok(())
    }

    /// Discard any on-disk checkpoint and start with an empty table.
    ///
    /// Used when a run is started without `--resume` so stale state from an
    /// earlier aborted run cannot leak in.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "discarded stale checkpoint file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Record a value under `key` and rewrite the whole table to disk.
    ///
    /// Callers treat a failure here as non-fatal and log-and-continue: the
    /// worst case on resume is refetching the most recent page.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CheckpointError> {
        let value = serde_json::to_value(value).map_err(|source| CheckpointError::Codec {
            key: key.to_string(),
            source,
        })?;

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.insert(key.to_string(), value);
        self.persist(&table)
    }

    /// Typed read. `Ok(None)` means "never checkpointed"; checkpoint values
    /// are stored type-erased because the table holds heterogeneous resource
    /// kinds, so the expected shape is supplied at the read site.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CheckpointError> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        match table.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| CheckpointError::Codec {
                    key: key.to_string(),
                    source,
                }),
        }
    }

    /// Whether any value has been checkpointed under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Delete the checkpoint file. Called only after a fully successful
    /// export, never on partial failure - that is what makes resume correct.
    pub fn cleanup(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Serialize the full table and replace the file via temp-file + rename
    /// so a crash mid-write never leaves a truncated checkpoint.
    fn persist(&self, table: &BTreeMap<String, Value>) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec(table).map_err(|source| CheckpointError::Codec {
            key: String::new(),
            source,
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("ckpt.tmp");
        fs::write(&tmp, &bytes).map_err(|source| CheckpointError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Save a checkpoint, downgrading failure to a warning.
///
/// The per-resource resume algorithm calls this after every page; a lost
/// save only costs redundant work on the next resume.
pub(crate) fn save_or_warn<T: Serialize>(store: &CheckpointStore, key: &str, value: &T) {
    if let Err(e) = store.save(key, value) {
        tracing::warn!(key, error = %e, "failed to save checkpoint, continuing");
    }
}
