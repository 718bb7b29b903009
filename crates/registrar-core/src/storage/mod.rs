//! # Storage Module
//!
//! The datastore seam. Every record kind lives in its own keyspace, keyed by
//! its `u64` id and encoded with postcard.
//!
//! Backends:
//! - [`MemoryStore`]: `BTreeMap`s, used by tests and import dry runs
//! - [`RedbStore`]: redb embedded database (ACID transactions, crash safe)

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::error::{RegistrarError, Result};
use crate::primitives::InstitutionId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// =============================================================================
// RECORD KINDS
// =============================================================================

/// The keyspaces of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    /// Institutions.
    Institution,
    /// Programs.
    Program,
    /// Users.
    User,
    /// Courses.
    Course,
    /// Learning outcomes.
    Outcome,
    /// Terms.
    Term,
    /// Offerings.
    Offering,
    /// Sections.
    Section,
    /// CLO assessments.
    Assessment,
}

impl RecordKind {
    /// Every kind, in dependency order.
    pub const ALL: [Self; 9] = [
        Self::Institution,
        Self::Program,
        Self::User,
        Self::Course,
        Self::Outcome,
        Self::Term,
        Self::Offering,
        Self::Section,
        Self::Assessment,
    ];

    /// Table name in persistent backends.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Institution => "institutions",
            Self::Program => "programs",
            Self::User => "users",
            Self::Course => "courses",
            Self::Outcome => "outcomes",
            Self::Term => "terms",
            Self::Offering => "offerings",
            Self::Section => "sections",
            Self::Assessment => "assessments",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A value the store can keep.
pub trait Record: Serialize + DeserializeOwned {
    /// Keyspace of the record.
    const KIND: RecordKind;

    /// Primary key.
    fn key(&self) -> u64;

    /// Owning tenant, `None` for site-level records.
    fn institution(&self) -> Option<InstitutionId>;
}

// =============================================================================
// WRITE BATCHES
// =============================================================================

/// One staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BatchOp {
    Put {
        kind: RecordKind,
        key: u64,
        bytes: Vec<u8>,
    },
    Remove {
        kind: RecordKind,
        key: u64,
    },
}

/// Writes that commit together through [`RecordStore::apply`].
///
/// Cascades (a section with its assessments, an offering with its sections)
/// are staged here so a failed commit leaves none of them applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert or replace.
    pub fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        self.ops.push(BatchOp::Put {
            kind: R::KIND,
            key: record.key(),
            bytes: encode(record)?,
        });
        Ok(())
    }

    /// Stage a delete.
    pub fn remove<R: Record>(&mut self, id: u64) {
        self.ops.push(BatchOp::Remove {
            kind: R::KIND,
            key: id,
        });
    }

    /// Number of staged writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

// =============================================================================
// RECORDSTORE TRAIT
// =============================================================================

/// Operations every backend provides.
pub trait RecordStore {
    /// Allocate the next id for `kind`. Ids start at 1 and are never reused.
    fn allocate_id(&mut self, kind: RecordKind) -> Result<u64>;

    /// Insert or replace a record.
    fn put<R: Record>(&mut self, record: &R) -> Result<()>;

    /// Fetch a record by id.
    fn get<R: Record>(&self, id: u64) -> Result<Option<R>>;

    /// Delete a record. Returns whether it existed.
    fn remove<R: Record>(&mut self, id: u64) -> Result<bool>;

    /// Commit every write of `batch` in order, or none of them.
    fn apply(&mut self, batch: WriteBatch) -> Result<()>;

    /// All records of a kind, ordered by id.
    fn scan<R: Record>(&self) -> Result<Vec<R>>;

    /// Number of records of a kind.
    fn count(&self, kind: RecordKind) -> Result<usize>;

    /// Raw encoded entries of a kind, ordered by id.
    fn raw_entries(&self, kind: RecordKind) -> Result<Vec<(u64, Vec<u8>)>>;

    /// Last id allocated for a kind (0 if none).
    fn sequence(&self, kind: RecordKind) -> Result<u64>;

    /// All records of a kind owned by `institution`, ordered by id.
    fn scan_tenant<R: Record>(&self, institution: InstitutionId) -> Result<Vec<R>> {
        Ok(self
            .scan::<R>()?
            .into_iter()
            .filter(|r| r.institution() == Some(institution))
            .collect())
    }
}

pub(crate) fn encode<R: Record>(record: &R) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(record)?)
}

pub(crate) fn decode<R: Record>(bytes: &[u8]) -> Result<R> {
    Ok(postcard::from_bytes(bytes)?)
}

// =============================================================================
// BACKEND SELECTION
// =============================================================================

/// Which backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Volatile in-memory store.
    Memory,
    /// redb file.
    Redb,
}

impl FromStr for BackendKind {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "redb" => Ok(Self::Redb),
            other => Err(RegistrarError::validation(format!(
                "unknown backend '{other}'. Use 'memory' or 'redb'"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redb => f.write_str("redb"),
        }
    }
}

/// A store chosen at runtime.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory store.
    Memory(MemoryStore),
    /// redb-backed store.
    Redb(RedbStore),
}

impl StoreBackend {
    /// Open (or create) a store of `kind`. `path` is ignored for memory.
    pub fn open(kind: BackendKind, path: &Path) -> Result<Self> {
        match kind {
            BackendKind::Memory => Ok(Self::Memory(MemoryStore::new())),
            BackendKind::Redb => Ok(Self::Redb(RedbStore::create(path)?)),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $body:expr) => {
        match $self {
            StoreBackend::Memory($store) => $body,
            StoreBackend::Redb($store) => $body,
        }
    };
}

impl RecordStore for StoreBackend {
    fn allocate_id(&mut self, kind: RecordKind) -> Result<u64> {
        delegate!(self, s => s.allocate_id(kind))
    }

    fn put<R: Record>(&mut self, record: &R) -> Result<()> {
        delegate!(self, s => s.put(record))
    }

    fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
        delegate!(self, s => s.get(id))
    }

    fn remove<R: Record>(&mut self, id: u64) -> Result<bool> {
        delegate!(self, s => s.remove::<R>(id))
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        delegate!(self, s => s.apply(batch))
    }

    fn scan<R: Record>(&self) -> Result<Vec<R>> {
        delegate!(self, s => s.scan())
    }

    fn count(&self, kind: RecordKind) -> Result<usize> {
        delegate!(self, s => s.count(kind))
    }

    fn raw_entries(&self, kind: RecordKind) -> Result<Vec<(u64, Vec<u8>)>> {
        delegate!(self, s => s.raw_entries(kind))
    }

    fn sequence(&self, kind: RecordKind) -> Result<u64> {
        delegate!(self, s => s.sequence(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parsing() {
        assert_eq!("REDB".parse::<BackendKind>().ok(), Some(BackendKind::Redb));
        assert_eq!("mem".parse::<BackendKind>().ok(), Some(BackendKind::Memory));
        assert!("file".parse::<BackendKind>().is_err());
    }

    #[test]
    fn table_names_are_distinct() {
        let mut names: Vec<_> = RecordKind::ALL.iter().map(|k| k.table_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RecordKind::ALL.len());
    }
}
