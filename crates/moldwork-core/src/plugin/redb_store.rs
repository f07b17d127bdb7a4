//! # redb-backed Store
//!
//! Molds and configs kept as persistence-format blobs in one redb file.
//! Writes are single transactions; a reader never sees a half-written entry.

use super::{IoPlugin, check_entry};
use crate::canonical::{CanonicalConfig, CanonicalMold};
use crate::formats::{config_from_bytes, config_to_bytes, mold_from_bytes, mold_to_bytes};
use crate::types::{MoldError, MoldResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Entry name -> persistence bytes
type Blobs = TableDefinition<'static, &'static str, &'static [u8]>;

const MOLDS: Blobs = TableDefinition::new("molds");

const CONFIGS: Blobs = TableDefinition::new("configs");

fn io(e: impl std::fmt::Display) -> MoldError {
    MoldError::InternalError(e.to_string())
}

pub struct RedbStorePlugin {
    db: Database,
}

impl std::fmt::Debug for RedbStorePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorePlugin").finish_non_exhaustive()
    }
}

impl RedbStorePlugin {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> MoldResult<Self> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(io)?;
        let _ = write_txn.open_table(MOLDS).map_err(io)?;
        let _ = write_txn.open_table(CONFIGS).map_err(io)?;
        write_txn.commit().map_err(io)?;

        Ok(Self { db })
    }

    fn get(&self, table: Blobs, entry: &str) -> MoldResult<Vec<u8>> {
        check_entry(entry)?;
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        let bytes = table
            .get(entry)
            .map_err(io)?
            .map(|v| v.value().to_vec())
            .ok_or_else(|| MoldError::InvalidArgument(format!("no entry '{}'", entry)))?;
        Ok(bytes)
    }

    fn put(&self, table: Blobs, entry: &str, bytes: &[u8]) -> MoldResult<()> {
        check_entry(entry)?;
        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(table).map_err(io)?;
            table.insert(entry, bytes).map_err(io)?;
        }
        write_txn.commit().map_err(io)
    }

    fn names(&self, table: Blobs) -> MoldResult<Vec<String>> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        let mut names = Vec::new();
        for item in table.iter().map_err(io)? {
            let (key, _) = item.map_err(io)?;
            names.push(key.value().to_string());
        }
        Ok(names)
    }
}

impl IoPlugin for RedbStorePlugin {
    fn mold_read(&self, entry: &str) -> MoldResult<CanonicalMold> {
        mold_from_bytes(&self.get(MOLDS, entry)?)
    }

    fn mold_write(&self, entry: &str, mold: &CanonicalMold) -> MoldResult<()> {
        self.put(MOLDS, entry, &mold_to_bytes(mold)?)
    }

    fn config_read(&self, entry: &str) -> MoldResult<CanonicalConfig> {
        config_from_bytes(&self.get(CONFIGS, entry)?)
    }

    fn config_write(&self, entry: &str, config: &CanonicalConfig) -> MoldResult<()> {
        self.put(CONFIGS, entry, &config_to_bytes(config)?)
    }

    fn mold_entries(&self) -> MoldResult<Vec<String>> {
        self.names(MOLDS)
    }

    fn config_entries(&self) -> MoldResult<Vec<String>> {
        self.names(CONFIGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::ConfigElement;
    use crate::types::{Value, Version};

    #[test]
    fn roundtrip_and_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RedbStorePlugin::open(dir.path().join("store.redb")).expect("open");
        let config = CanonicalConfig {
            version: Version::new(3, 0, 1),
            elements: vec![ConfigElement::Section {
                name: "cache".to_string(),
                elements: vec![ConfigElement::Keyval {
                    name: "size".to_string(),
                    value: Some(Value::Integer(512)),
                }],
            }],
        };
        store.config_write("worker", &config).expect("write");
        store.config_write("api", &config).expect("write");

        assert_eq!(store.config_read("worker").expect("read"), config);
        assert_eq!(store.config_entries().expect("entries"), vec!["api", "worker"]);
        assert!(store.mold_entries().expect("entries").is_empty());
        assert!(matches!(
            store.mold_read("worker"),
            Err(MoldError::InvalidArgument(_))
        ));
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.redb");
        let mold = CanonicalMold {
            version: Version::INITIAL,
            documentation: Vec::new(),
            elements: Vec::new(),
        };
        {
            let store = RedbStorePlugin::open(&path).expect("open");
            store.mold_write("empty", &mold).expect("write");
        }
        let store = RedbStorePlugin::open(&path).expect("reopen");
        assert_eq!(store.mold_read("empty").expect("read"), mold);
    }
}
