//! redb backend.
//!
//! One table per [`RecordKind`] (`u64 -> postcard bytes`) plus a
//! `sequences` table holding the last allocated id of each kind. Single
//! writes run in their own transaction; a [`WriteBatch`] shares one.

use super::{BatchOp, Record, RecordKind, RecordStore, WriteBatch, decode, encode};
use crate::error::{RegistrarError, Result};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use std::fmt;
use std::path::{Path, PathBuf};

const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

const fn table(kind: RecordKind) -> TableDefinition<'static, u64, &'static [u8]> {
    TableDefinition::new(kind.table_name())
}

/// Disk-backed record store.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    /// Open the database at `path`, creating it if missing.
    pub fn create(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;
        let store = Self {
            db,
            path: path.to_path_buf(),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Open an existing database.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RegistrarError::Storage(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let db = Database::open(path)?;
        let store = Self {
            db,
            path: path.to_path_buf(),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create every table so readers never see a missing one.
    fn ensure_tables(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            txn.open_table(SEQUENCES)?;
            for kind in RecordKind::ALL {
                txn.open_table(table(kind))?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

impl RecordStore for RedbStore {
    fn allocate_id(&mut self, kind: RecordKind) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let next;
        {
            let mut sequences = txn.open_table(SEQUENCES)?;
            let current = sequences
                .get(kind.table_name())?
                .map(|guard| guard.value())
                .unwrap_or(0);
            next = current.saturating_add(1);
            sequences.insert(kind.table_name(), next)?;
        }
        txn.commit()?;
        Ok(next)
    }

    fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        let bytes = encode(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(table(R::KIND))?;
            records.insert(record.key(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(table(R::KIND))?;
        let Some(guard) = records.get(id)? else {
            return Ok(None);
        };
        decode(guard.value()).map(Some)
    }

    fn remove<R: Record>(&mut self, id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let existed;
        {
            let mut records = txn.open_table(table(R::KIND))?;
            existed = records.remove(id)?.is_some();
        }
        txn.commit()?;
        Ok(existed)
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        // Dropping the transaction on an early return aborts it.
        let txn = self.db.begin_write()?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { kind, key, bytes } => {
                    let mut records = txn.open_table(table(kind))?;
                    records.insert(key, bytes.as_slice())?;
                }
                BatchOp::Remove { kind, key } => {
                    let mut records = txn.open_table(table(kind))?;
                    records.remove(key)?;
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(table(R::KIND))?;
        let mut out = Vec::new();
        for entry in records.iter()? {
            let (_, value) = entry?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    fn count(&self, kind: RecordKind) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(table(kind))?;
        Ok(records.len()? as usize)
    }

    fn raw_entries(&self, kind: RecordKind) -> Result<Vec<(u64, Vec<u8>)>> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(table(kind))?;
        let mut out = Vec::new();
        for entry in records.iter()? {
            let (key, value) = entry?;
            out.push((key.value(), value.value().to_vec()));
        }
        Ok(out)
    }

    fn sequence(&self, kind: RecordKind) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let sequences = txn.open_table(SEQUENCES)?;
        Ok(sequences
            .get(kind.table_name())?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Program;
    use crate::primitives::{InstitutionId, ProgramId};
    use chrono::Utc;

    fn program(id: u64, institution: u64) -> Program {
        Program {
            id: ProgramId(id),
            institution_id: InstitutionId(institution),
            name: format!("Program {id}"),
            short_name: format!("P{id}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn open_missing_database_fails() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| RegistrarError::Storage(e.to_string()))?;
        let result = RedbStore::open(&dir.path().join("missing.redb"));
        assert!(matches!(result, Err(RegistrarError::Storage(_))));
        Ok(())
    }

    #[test]
    fn records_survive_reopen() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| RegistrarError::Storage(e.to_string()))?;
        let path = dir.path().join("records.redb");

        {
            let mut store = RedbStore::create(&path)?;
            assert_eq!(store.allocate_id(RecordKind::Program)?, 1);
            store.put(&program(1, 1))?;
            store.put(&program(2, 2))?;
        }

        let mut store = RedbStore::open(&path)?;
        assert_eq!(store.count(RecordKind::Program)?, 2);
        assert_eq!(store.sequence(RecordKind::Program)?, 1);
        assert_eq!(store.allocate_id(RecordKind::Program)?, 2);

        let tenant: Vec<Program> = store.scan_tenant(InstitutionId(2))?;
        assert_eq!(tenant.len(), 1);
        assert_eq!(tenant[0].id, ProgramId(2));

        assert!(store.remove::<Program>(2)?);
        assert!(store.get::<Program>(2)?.is_none());
        Ok(())
    }

    #[test]
    fn batch_commits_puts_and_removes_together() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| RegistrarError::Storage(e.to_string()))?;
        let path = dir.path().join("batch.redb");
        {
            let mut store = RedbStore::create(&path)?;
            store.put(&program(1, 1))?;

            let mut batch = WriteBatch::new();
            batch.remove::<Program>(1);
            batch.put(&program(2, 1))?;
            batch.put(&program(3, 1))?;
            assert_eq!(batch.len(), 3);
            store.apply(batch)?;
        }

        let store = RedbStore::open(&path)?;
        let ids: Vec<ProgramId> = store.scan::<Program>()?.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![ProgramId(2), ProgramId(3)]);
        Ok(())
    }

    #[test]
    fn raw_entries_match_scan() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|e| RegistrarError::Storage(e.to_string()))?;
        let mut store = RedbStore::create(&dir.path().join("raw.redb"))?;
        store.put(&program(5, 1))?;
        let raw = store.raw_entries(RecordKind::Program)?;
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].0, 5);
        Ok(())
    }
}
