//! Keyed record storage shared by the registries and engines.
//!
//! Every piece of durable state lives in one of a fixed set of [`Table`]s.
//! Backends provide the atomic primitives the registries rely on for their
//! invariants: `put_if_absent` for uniqueness indexes, `take` for one-time
//! redemption, and `update` for read-modify-write of a single record.

use std::collections::HashMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Logical tables. Backends map each to a column family or map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Tenants,
    TenantsByUrl,
    Schemas,
    SchemaIndex,
    Definitions,
    DefinitionIndex,
    Offers,
    Credentials,
    CredentialIndex,
    PresentationRequests,
    Keys,
    Dids,
    Settings,
}

impl Table {
    pub const ALL: [Table; 13] = [
        Table::Tenants,
        Table::TenantsByUrl,
        Table::Schemas,
        Table::SchemaIndex,
        Table::Definitions,
        Table::DefinitionIndex,
        Table::Offers,
        Table::Credentials,
        Table::CredentialIndex,
        Table::PresentationRequests,
        Table::Keys,
        Table::Dids,
        Table::Settings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tenants => "tenants",
            Self::TenantsByUrl => "tenants_by_url",
            Self::Schemas => "schemas",
            Self::SchemaIndex => "schema_index",
            Self::Definitions => "definitions",
            Self::DefinitionIndex => "definition_index",
            Self::Offers => "offers",
            Self::Credentials => "credentials",
            Self::CredentialIndex => "credential_index",
            Self::PresentationRequests => "presentation_requests",
            Self::Keys => "keys",
            Self::Dids => "dids",
            Self::Settings => "settings",
        }
    }
}

/// Closure applied by [`RecordStore::update`]. Receives the current value and
/// returns the replacement.
pub type UpdateFn<'a> = dyn FnMut(&[u8]) -> Result<Vec<u8>, StoreError> + 'a;

/// Persistent keyed store with per-record atomic operations.
pub trait RecordStore: Send + Sync {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, table: Table, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Insert only if `key` is absent. Returns `false` if a value already existed.
    fn put_if_absent(&self, table: Table, key: &str, value: Vec<u8>)
        -> Result<bool, StoreError>;

    /// Atomically remove and return the value under `key`. At most one
    /// concurrent caller observes `Some` for a given key.
    fn take(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`. Returns whether a value was present.
    fn delete(&self, table: Table, key: &str) -> Result<bool, StoreError> {
        Ok(self.take(table, key)?.is_some())
    }

    /// Atomically replace the value under `key` with `f(current)`. Returns the
    /// stored value, or `None` if the key is absent (in which case `f` is not called).
    fn update(
        &self,
        table: Table,
        key: &str,
        f: &mut UpdateFn<'_>,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, table: Table, prefix: &str)
        -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// JSON helpers over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    fn get_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(table, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, table: Table, key: &str, value: &T) -> Result<(), StoreError> {
        self.put(table, key, serde_json::to_vec(value)?)
    }

    fn put_json_if_absent<T: Serialize>(
        &self,
        table: Table,
        key: &str,
        value: &T,
    ) -> Result<bool, StoreError> {
        self.put_if_absent(table, key, serde_json::to_vec(value)?)
    }

    fn take_json<T: DeserializeOwned>(&self, table: Table, key: &str) -> Result<Option<T>, StoreError> {
        match self.take(table, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Typed read-modify-write. `f` mutates the decoded record in place.
    fn update_json<T, F>(&self, table: Table, key: &str, mut f: F) -> Result<Option<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T),
    {
        let mut apply = |bytes: &[u8]| -> Result<Vec<u8>, StoreError> {
            let mut record: T = serde_json::from_slice(bytes)?;
            f(&mut record);
            Ok(serde_json::to_vec(&record)?)
        };
        match self.update(table, key, &mut apply)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every value under `prefix`.
    fn scan_json<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> Result<Vec<T>, StoreError> {
        self.scan_prefix(table, prefix)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .collect()
    }
}

impl<S: RecordStore + ?Sized> RecordStoreExt for S {}

/// In-process store backed by one [`DashMap`] per table.
///
/// Shard-level locking in `DashMap` makes each primitive atomic per key.
pub struct MemoryStore {
    tables: HashMap<Table, DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let tables = Table::ALL
            .iter()
            .map(|table| (*table, DashMap::new()))
            .collect();
        Self { tables }
    }

    fn table(&self, table: Table) -> Result<&DashMap<String, Vec<u8>>, StoreError> {
        self.tables
            .get(&table)
            .ok_or(StoreError::UnknownTable(table.name()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.table(table)?.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, table: Table, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.table(table)?.insert(key.to_string(), value);
        Ok(())
    }

    fn put_if_absent(&self, table: Table, key: &str, value: Vec<u8>) -> Result<bool, StoreError> {
        match self.table(table)?.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    fn take(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.table(table)?.remove(key).map(|(_, value)| value))
    }

    fn update(
        &self,
        table: Table,
        key: &str,
        f: &mut UpdateFn<'_>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        match self.table(table)?.get_mut(key) {
            Some(mut entry) => {
                let next = f(entry.value())?;
                *entry.value_mut() = next.clone();
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, table: Table, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .table(table)?
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Counter {
        hits: u32,
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put(Table::Schemas, "a", b"1".to_vec()).unwrap();
        assert_eq!(store.get(Table::Schemas, "a").unwrap(), Some(b"1".to_vec()));
        assert!(store.delete(Table::Schemas, "a").unwrap());
        assert!(!store.delete(Table::Schemas, "a").unwrap());
        assert_eq!(store.get(Table::Schemas, "a").unwrap(), None);
    }

    #[test]
    fn test_tables_are_isolated() {
        let store = MemoryStore::new();
        store.put(Table::Schemas, "k", b"schema".to_vec()).unwrap();
        assert_eq!(store.get(Table::Offers, "k").unwrap(), None);
    }

    #[test]
    fn test_put_if_absent() {
        let store = MemoryStore::new();
        assert!(store.put_if_absent(Table::SchemaIndex, "k", b"1".to_vec()).unwrap());
        assert!(!store.put_if_absent(Table::SchemaIndex, "k", b"2".to_vec()).unwrap());
        assert_eq!(store.get(Table::SchemaIndex, "k").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_take_is_one_shot() {
        let store = MemoryStore::new();
        store.put(Table::Offers, "code", b"offer".to_vec()).unwrap();
        assert_eq!(store.take(Table::Offers, "code").unwrap(), Some(b"offer".to_vec()));
        assert_eq!(store.take(Table::Offers, "code").unwrap(), None);
    }

    #[test]
    fn test_update_json() {
        let store = MemoryStore::new();
        store.put_json(Table::Settings, "c", &Counter { hits: 1 }).unwrap();
        let updated: Option<Counter> = store
            .update_json(Table::Settings, "c", |c: &mut Counter| c.hits += 1)
            .unwrap();
        assert_eq!(updated, Some(Counter { hits: 2 }));

        let missing: Option<Counter> = store
            .update_json(Table::Settings, "missing", |c: &mut Counter| c.hits += 1)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_scan_prefix_ordered() {
        let store = MemoryStore::new();
        store.put(Table::CredentialIndex, "t1/b", b"2".to_vec()).unwrap();
        store.put(Table::CredentialIndex, "t1/a", b"1".to_vec()).unwrap();
        store.put(Table::CredentialIndex, "t2/a", b"3".to_vec()).unwrap();

        let entries = store.scan_prefix(Table::CredentialIndex, "t1/").unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["t1/a", "t1/b"]);
    }

    #[tokio::test]
    async fn test_concurrent_take_single_winner() {
        let store = Arc::new(MemoryStore::new());
        store.put(Table::Offers, "code", b"offer".to_vec()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.take(Table::Offers, "code").unwrap().is_some()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
