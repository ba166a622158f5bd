//! Physical store handle owned by the root context.
//!
//! The handle abstracts over the two backends selected by [`StoreKind`]:
//! - `Disk`: RocksDB `TransactionDB` with one column family per record
//!   kind, MessagePack record values keyed by the raw 16-byte id.
//! - `Memory`: an in-process map, the "in-memory marker" location.
//!
//! A commit applies a batch of changes atomically: a single RocksDB
//! transaction, or one locked application to the map. The handle is moved
//! into the root context's loop at registration and is never shared.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rocksdb::{IteratorMode, Options, TransactionDB, TransactionDBOptions};

use crate::error::StoreError;
use crate::record::{Change, Record, RecordKey, RecordKind};

/// Storage name used when the caller does not provide one.
pub const DEFAULT_NAME: &str = "default";

/// Storage location used when the caller does not provide one.
pub fn default_location() -> PathBuf {
    std::env::temp_dir().join("trellis")
}

/// Selects the physical store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// RocksDB-backed durable store at the given location.
    Disk,
    /// In-process map; the location parameter is ignored.
    Memory,
}

fn cf_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Entity => "entities",
        RecordKind::Relationship => "relationships",
        RecordKind::Action => "actions",
    }
}

const ALL_COLUMN_FAMILIES: [&str; 3] = ["entities", "relationships", "actions"];

enum Backend {
    Disk(TransactionDB),
    Memory(Mutex<HashMap<RecordKey, Record>>),
}

/// Handle to the durable store bound to one storage name.
pub struct StoreHandle {
    backend: Backend,
}

impl StoreHandle {
    /// Create the store for `(kind, path)`.
    ///
    /// Creation is not retried; failure surfaces as [`StoreError::Init`]
    /// and propagates to the caller of registry resolution.
    pub fn create(kind: StoreKind, path: &Path) -> Result<Self, StoreError> {
        match kind {
            StoreKind::Memory => Ok(Self {
                backend: Backend::Memory(Mutex::new(HashMap::new())),
            }),
            StoreKind::Disk => {
                if path.exists() && !path.is_dir() {
                    return Err(StoreError::Init {
                        path: path.to_path_buf(),
                        message: "path exists and is not a directory".to_string(),
                    });
                }
                std::fs::create_dir_all(path).map_err(|e| StoreError::Init {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

                let mut options = Options::default();
                options.set_error_if_exists(false);
                options.create_if_missing(true);
                options.create_missing_column_families(true);
                let txn_db_options = TransactionDBOptions::default();

                let db =
                    TransactionDB::open_cf(&options, &txn_db_options, path, ALL_COLUMN_FAMILIES)
                        .map_err(|e| StoreError::Init {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        })?;
                tracing::info!(path = %path.display(), "opened disk store");
                Ok(Self {
                    backend: Backend::Disk(db),
                })
            }
        }
    }

    /// Apply a batch of changes atomically.
    pub fn commit(&self, changes: &[Change]) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Disk(db) => {
                let txn = db.transaction();
                for change in changes {
                    match change {
                        Change::Put(record) => {
                            let cf = db
                                .cf_handle(cf_name(record.kind))
                                .ok_or(StoreError::MissingColumnFamily(cf_name(record.kind)))?;
                            txn.put_cf(&cf, record.id.as_bytes(), rmp_serde::to_vec(record)?)?;
                        }
                        Change::Delete { kind, id } => {
                            let cf = db
                                .cf_handle(cf_name(*kind))
                                .ok_or(StoreError::MissingColumnFamily(cf_name(*kind)))?;
                            txn.delete_cf(&cf, id.as_bytes())?;
                        }
                    }
                }
                txn.commit()?;
                Ok(())
            }
            Backend::Memory(map) => {
                let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
                for change in changes {
                    match change {
                        Change::Put(record) => {
                            map.insert(record.key(), record.clone());
                        }
                        Change::Delete { kind, id } => {
                            map.remove(&(*kind, *id));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Read every committed record, optionally restricted to one kind.
    pub fn scan(&self, kind: Option<RecordKind>) -> Result<Vec<Record>, StoreError> {
        let kinds: Vec<RecordKind> = match kind {
            Some(k) => vec![k],
            None => RecordKind::ALL.to_vec(),
        };
        match &self.backend {
            Backend::Disk(db) => {
                let mut records = Vec::new();
                for k in kinds {
                    let cf = db
                        .cf_handle(cf_name(k))
                        .ok_or(StoreError::MissingColumnFamily(cf_name(k)))?;
                    for item in db.iterator_cf(&cf, IteratorMode::Start) {
                        let (_key, value) = item?;
                        records.push(rmp_serde::from_slice(&value)?);
                    }
                }
                Ok(records)
            }
            Backend::Memory(map) => {
                let map = map.lock().unwrap_or_else(PoisonError::into_inner);
                Ok(map
                    .values()
                    .filter(|r| kinds.contains(&r.kind))
                    .cloned()
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_commit_and_scan() {
        let store = StoreHandle::create(StoreKind::Memory, Path::new("ignored")).unwrap();
        let entity = Record::entity("Person");
        let action = Record::action("Purchase");

        store
            .commit(&[
                Change::Put(entity.clone()),
                Change::Put(action.clone()),
            ])
            .unwrap();

        assert_eq!(store.scan(None).unwrap().len(), 2);
        assert_eq!(store.scan(Some(RecordKind::Entity)).unwrap().len(), 1);

        store
            .commit(&[Change::Delete {
                kind: entity.kind,
                id: entity.id,
            }])
            .unwrap();
        assert_eq!(store.scan(None).unwrap().len(), 1);
        assert_eq!(store.scan(Some(RecordKind::Entity)).unwrap().len(), 0);
    }

    #[test]
    fn test_disk_create_fails_on_file_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blocked");
        std::fs::write(&path, b"not a directory").unwrap();

        let result = StoreHandle::create(StoreKind::Disk, &path);
        assert!(matches!(result, Err(StoreError::Init { .. })));
    }

    #[test]
    fn test_disk_commit_and_scan() {
        let temp = TempDir::new().unwrap();
        let store = StoreHandle::create(StoreKind::Disk, temp.path()).unwrap();

        let record = Record::entity("Person").with_property("name", "Alice");
        store.commit(&[Change::Put(record.clone())]).unwrap();

        let scanned = store.scan(Some(RecordKind::Entity)).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, record.id);
        assert_eq!(scanned[0].property("name").unwrap(), "Alice");

        store
            .commit(&[Change::Delete {
                kind: record.kind,
                id: record.id,
            }])
            .unwrap();
        assert!(store.scan(None).unwrap().is_empty());
    }
}
