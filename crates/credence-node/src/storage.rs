//! RocksDB storage backend for the Credence node.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use credence_core::store::UpdateFn;
use credence_core::{RecordStore, StoreError, Table};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// RocksDB-backed record store, one column family per [`Table`].
///
/// Single reads and writes go straight to RocksDB. Compound operations
/// (`put_if_absent`, `take`, `update`) run under a process-wide write lock so
/// their check and write are not interleaved with another compound operation.
pub struct RocksStore {
    db: DB,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(backend)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(backend)?;
        tracing::debug!(path = %path.display(), "rocksdb opened");

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, table: Table) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(table.name())
            .ok_or(StoreError::UnknownTable(table.name()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Backend("write lock poisoned".into()))
    }
}

impl RecordStore for RocksStore {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get_cf(self.cf(table)?, key).map_err(backend)
    }

    fn put(&self, table: Table, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.db.put_cf(self.cf(table)?, key, value).map_err(backend)
    }

    fn put_if_absent(&self, table: Table, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        let cf = self.cf(table)?;
        let _guard = self.lock()?;
        if self.db.get_cf(cf, key).map_err(backend)?.is_some() {
            return Ok(false);
        }
        self.db.put_cf(cf, key, value).map_err(backend)?;
        Ok(true)
    }

    fn take(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(table)?;
        let _guard = self.lock()?;
        let current = self.db.get_cf(cf, key).map_err(backend)?;
        if current.is_some() {
            self.db.delete_cf(cf, key).map_err(backend)?;
        }
        Ok(current)
    }

    fn update(
        &self,
        table: Table,
        key: &str,
        f: &mut UpdateFn<'_>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf(table)?;
        let _guard = self.lock()?;
        let Some(current) = self.db.get_cf(cf, key).map_err(backend)? else {
            return Ok(None);
        };
        let next = f(&current)?;
        self.db.put_cf(cf, key, &next).map_err(backend)?;
        Ok(Some(next))
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let cf = self.cf(table)?;
        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(backend)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.into_vec()).map_err(backend)?;
            entries.push((key, value.into_vec()));
        }
        Ok(entries)
    }
}
