//! In-memory backend.
//!
//! Uses `BTreeMap` so scans come back in id order, like redb.

use super::{BatchOp, Record, RecordKind, RecordStore, WriteBatch, decode, encode};
use crate::error::Result;
use std::collections::BTreeMap;

/// Volatile record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// kind -> (id -> encoded record)
    records: BTreeMap<RecordKind, BTreeMap<u64, Vec<u8>>>,

    /// kind -> last allocated id
    sequences: BTreeMap<RecordKind, u64>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every record and sequence out of another store.
    ///
    /// Used to stage import dry runs without touching the source.
    pub fn snapshot_of<S: RecordStore>(source: &S) -> Result<Self> {
        let mut store = Self::new();
        for kind in RecordKind::ALL {
            let entries = source.raw_entries(kind)?;
            if !entries.is_empty() {
                store.records.insert(kind, entries.into_iter().collect());
            }
            store.sequences.insert(kind, source.sequence(kind)?);
        }
        Ok(store)
    }
}

impl RecordStore for MemoryStore {
    fn allocate_id(&mut self, kind: RecordKind) -> Result<u64> {
        let next = self.sequences.entry(kind).or_insert(0);
        *next = next.saturating_add(1);
        Ok(*next)
    }

    fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        let bytes = encode(record)?;
        self.records
            .entry(R::KIND)
            .or_default()
            .insert(record.key(), bytes);
        Ok(())
    }

    fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
        self.records
            .get(&R::KIND)
            .and_then(|table| table.get(&id))
            .map(|bytes| decode(bytes))
            .transpose()
    }

    fn remove<R: Record>(&mut self, id: u64) -> Result<bool> {
        Ok(self
            .records
            .get_mut(&R::KIND)
            .is_some_and(|table| table.remove(&id).is_some()))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { kind, key, bytes } => {
                    self.records.entry(kind).or_default().insert(key, bytes);
                }
                BatchOp::Remove { kind, key } => {
                    if let Some(table) = self.records.get_mut(&kind) {
                        table.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        self.records
            .get(&R::KIND)
            .map(|table| table.values().map(|bytes| decode(bytes)).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn count(&self, kind: RecordKind) -> Result<usize> {
        Ok(self.records.get(&kind).map_or(0, BTreeMap::len))
    }

    fn raw_entries(&self, kind: RecordKind) -> Result<Vec<(u64, Vec<u8>)>> {
        Ok(self
            .records
            .get(&kind)
            .map(|table| table.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default())
    }

    fn sequence(&self, kind: RecordKind) -> Result<u64> {
        Ok(self.sequences.get(&kind).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Institution;
    use crate::primitives::InstitutionId;
    use chrono::Utc;

    fn institution(id: u64, short: &str) -> Institution {
        Institution {
            id: InstitutionId(id),
            name: format!("{short} College"),
            short_name: short.into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ids_are_sequential_per_kind() {
        let mut store = MemoryStore::new();
        assert_eq!(store.allocate_id(RecordKind::Course).ok(), Some(1));
        assert_eq!(store.allocate_id(RecordKind::Course).ok(), Some(2));
        assert_eq!(store.allocate_id(RecordKind::Term).ok(), Some(1));
    }

    #[test]
    fn put_get_remove() {
        let mut store = MemoryStore::new();
        let inst = institution(1, "MCC");
        assert!(store.put(&inst).is_ok());

        let loaded: Option<Institution> = store.get(1).ok().flatten();
        assert_eq!(loaded.map(|i| i.short_name), Some("MCC".to_string()));

        assert_eq!(store.remove::<Institution>(1).ok(), Some(true));
        assert_eq!(store.remove::<Institution>(1).ok(), Some(false));
        assert_eq!(store.count(RecordKind::Institution).ok(), Some(0));
    }

    #[test]
    fn scan_is_ordered_by_id() {
        let mut store = MemoryStore::new();
        for (id, short) in [(3, "C"), (1, "A"), (2, "B")] {
            assert!(store.put(&institution(id, short)).is_ok());
        }
        let names: Vec<String> = store
            .scan::<Institution>()
            .unwrap_or_default()
            .into_iter()
            .map(|i| i.short_name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut store = MemoryStore::new();
        let _ = store.allocate_id(RecordKind::Institution);
        assert!(store.put(&institution(1, "MCC")).is_ok());

        let mut snapshot = MemoryStore::snapshot_of(&store).unwrap_or_default();
        assert_eq!(snapshot.allocate_id(RecordKind::Institution).ok(), Some(2));
        assert!(snapshot.put(&institution(2, "CEI")).is_ok());

        assert_eq!(store.count(RecordKind::Institution).ok(), Some(1));
        assert_eq!(snapshot.count(RecordKind::Institution).ok(), Some(2));
    }
}
