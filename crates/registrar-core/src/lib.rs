//! # Registrar Core
//!
//! The academic records engine behind the Registrar server.
//!
//! Institutions own programs, courses, terms, course offerings, sections and
//! instructors. Each section carries one [`Assessment`] per Course Learning
//! Outcome of its course, and those assessments move through the CLO
//! approval workflow defined in [`workflow`].
//!
//! This crate is synchronous and performs no network I/O. The HTTP server and
//! CLI live in `apps/registrar`.
//!
//! ## Layout
//!
//! - [`primitives`]: typed ids and input normalization
//! - [`models`]: the stored records
//! - [`access`]: roles, permissions and tenant scoping
//! - [`workflow`]: the CLO status machine
//! - [`storage`]: the `RecordStore` seam with memory and redb backends
//! - [`registrar`]: the service facade every caller goes through
//! - [`adapters`], [`import`], [`export`]: file interchange
//! - [`summary`]: completion reporting

pub mod access;
pub mod adapters;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod primitives;
pub mod registrar;
pub mod report;
pub mod storage;
pub mod summary;
pub mod workflow;

pub use access::{Actor, Permission, Role};
pub use adapters::{Adapter, AdapterInfo, AdapterRegistry, ExportBatch, ImportBatch};
pub use error::{RegistrarError, Result};
pub use export::{collect_export, export_with};
pub use import::{ConflictStrategy, ImportOptions, import_batch, import_file};
pub use models::{
    Assessment, Course, Institution, Offering, Outcome, Program, Section, SectionStatus,
    StatusChange, Term, User,
};
pub use primitives::{
    AssessmentId, CourseId, InstitutionId, OfferingId, OutcomeId, ProgramId, SectionId, TermId,
    UserId,
};
pub use registrar::Registrar;
pub use report::{FieldConflict, ImportReport, Resolution};
pub use storage::{
    BackendKind, MemoryStore, RecordKind, RecordStore, RedbStore, StoreBackend, WriteBatch,
};
pub use summary::InstitutionSummary;
pub use workflow::{CloStatus, WorkflowAction};

/// Returns the current version of the `registrar-core` crate.
#[must_use]
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
