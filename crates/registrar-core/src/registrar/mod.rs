//! # Registrar
//!
//! The service facade. Every read and write goes through [`Registrar`],
//! which enforces access control, tenant isolation, uniqueness and
//! referential integrity on top of a [`RecordStore`].
//!
//! Operations are grouped by area:
//! - [`directory`]: institutions, programs, users, tokens
//! - [`catalog`]: courses and learning outcomes
//! - [`schedule`]: terms, offerings, sections
//! - [`assessments`]: CLO data entry and review

pub mod assessments;
pub mod catalog;
pub mod directory;
pub mod schedule;

pub use assessments::AssessmentFilter;
pub use catalog::{CourseFilter, CourseUpdate, NewCourse, NewOutcome, OutcomeUpdate};
pub use directory::{InstitutionUpdate, NewInstitution, NewProgram, NewUser, UserUpdate};
pub use schedule::{
    NewOffering, NewSection, NewTerm, OfferingFilter, SectionFilter, SectionUpdate, TermUpdate,
};

use crate::access::Actor;
use crate::error::{RegistrarError, Result};
use crate::storage::{Record, RecordKind, RecordStore};

/// Academic records service over a store `S`.
#[derive(Debug)]
pub struct Registrar<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> Registrar<S> {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap into the underlying store.
    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Record counts per kind, in dependency order.
    pub fn counts(&self) -> Result<Vec<(RecordKind, usize)>> {
        RecordKind::ALL
            .into_iter()
            .map(|kind| Ok((kind, self.store.count(kind)?)))
            .collect()
    }

    // =========================================================================
    // INTERNAL HELPERS
    // =========================================================================

    fn next_id(&mut self, kind: RecordKind) -> Result<u64> {
        self.store.allocate_id(kind)
    }

    /// Load a record or fail with `NotFound`.
    fn load<R: Record>(&self, id: u64, kind: &'static str) -> Result<R> {
        self.store
            .get::<R>(id)?
            .ok_or_else(|| RegistrarError::not_found(kind, id))
    }

    /// Load a record the actor may see. Other tenants get `NotFound`.
    fn load_scoped<R: Record>(&self, actor: &Actor, id: u64, kind: &'static str) -> Result<R> {
        let record = self.load::<R>(id, kind)?;
        if let Some(institution) = record.institution() {
            actor.ensure_tenant(institution, kind, id)?;
        }
        Ok(record)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::Role;
    use crate::models::{Course, Institution, Section, Term, User};
    use crate::primitives::InstitutionId;
    use crate::storage::{MemoryStore, WriteBatch};
    use chrono::NaiveDate;

    /// A seeded registrar: one site admin, one institution with an admin,
    /// one program, an instructor, a course with two CLOs, a term, an
    /// offering and a section taught by the instructor.
    pub(crate) struct Fixture {
        pub registrar: Registrar<MemoryStore>,
        pub site: Actor,
        pub admin: Actor,
        pub instructor: Actor,
        pub institution: Institution,
        pub course: Course,
        pub term: Term,
        pub section: Section,
        pub instructor_user: User,
    }

    pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    pub(crate) fn fixture() -> Result<Fixture> {
        let mut registrar = Registrar::new(MemoryStore::new());
        let (root, _) = registrar.bootstrap_site_admin("root@example.edu", "Site", "Admin")?;
        let site = Actor::for_user(&root);

        let institution = registrar.create_institution(
            &site,
            NewInstitution {
                name: "Metro Community College".into(),
                short_name: "mcc".into(),
            },
        )?;
        let program = registrar.create_program(
            &site,
            institution.id,
            NewProgram {
                name: "Computer Science".into(),
                short_name: "cs".into(),
            },
        )?;
        let admin_user = registrar.create_user(
            &site,
            NewUser {
                institution_id: Some(institution.id),
                email: "dean@mcc.edu".into(),
                first_name: "Dana".into(),
                last_name: "Dean".into(),
                role: Role::InstitutionAdmin,
                program_ids: Vec::new(),
            },
        )?;
        let admin = Actor::for_user(&admin_user);
        let instructor_user = registrar.create_user(
            &admin,
            NewUser {
                institution_id: None,
                email: "ivy@mcc.edu".into(),
                first_name: "Ivy".into(),
                last_name: "Instructor".into(),
                role: Role::Instructor,
                program_ids: vec![program.id],
            },
        )?;
        let instructor = Actor::for_user(&instructor_user);

        let course = registrar.create_course(
            &admin,
            NewCourse {
                institution_id: None,
                course_number: "cs101".into(),
                title: "Intro to Programming".into(),
                department: "Computing".into(),
                credit_hours: 3,
                program_ids: vec![program.id],
            },
        )?;
        for text in ["Write programs", "Debug programs"] {
            registrar.create_outcome(
                &admin,
                course.id,
                NewOutcome {
                    clo_number: None,
                    description: text.into(),
                },
            )?;
        }
        let term = registrar.create_term(
            &admin,
            NewTerm {
                institution_id: None,
                name: "Fall 2025".into(),
                start_date: date(2025, 8, 25),
                end_date: date(2025, 12, 15),
            },
        )?;
        let offering = registrar.create_offering(
            &admin,
            NewOffering {
                course_id: course.id,
                term_id: term.id,
            },
        )?;
        let section = registrar.create_section(
            &admin,
            NewSection {
                offering_id: offering.id,
                section_number: "001".into(),
                instructor_id: Some(instructor_user.id),
                enrollment: 25,
            },
        )?;

        Ok(Fixture {
            registrar,
            site,
            admin,
            instructor,
            institution,
            course,
            term,
            section,
            instructor_user,
        })
    }

    /// A memory store whose writes start failing after `budget` of them
    /// succeed. Id allocation never fails.
    #[derive(Debug)]
    pub(crate) struct FailingWrites {
        inner: MemoryStore,
        budget: usize,
    }

    impl FailingWrites {
        pub(crate) fn after(inner: MemoryStore, budget: usize) -> Self {
            Self { inner, budget }
        }

        fn spend(&mut self) -> Result<()> {
            if self.budget == 0 {
                return Err(RegistrarError::Storage("disk full".into()));
            }
            self.budget -= 1;
            Ok(())
        }
    }

    impl RecordStore for FailingWrites {
        fn allocate_id(&mut self, kind: RecordKind) -> Result<u64> {
            self.inner.allocate_id(kind)
        }

        fn put<R: Record>(&mut self, record: &R) -> Result<()> {
            self.spend()?;
            self.inner.put(record)
        }

        fn get<R: Record>(&self, id: u64) -> Result<Option<R>> {
            self.inner.get(id)
        }

        fn remove<R: Record>(&mut self, id: u64) -> Result<bool> {
            self.spend()?;
            self.inner.remove::<R>(id)
        }

        fn apply(&mut self, batch: WriteBatch) -> Result<()> {
            self.spend()?;
            self.inner.apply(batch)
        }

        fn scan<R: Record>(&self) -> Result<Vec<R>> {
            self.inner.scan()
        }

        fn count(&self, kind: RecordKind) -> Result<usize> {
            self.inner.count(kind)
        }

        fn raw_entries(&self, kind: RecordKind) -> Result<Vec<(u64, Vec<u8>)>> {
            self.inner.raw_entries(kind)
        }

        fn sequence(&self, kind: RecordKind) -> Result<u64> {
            self.inner.sequence(kind)
        }

        fn scan_tenant<R: Record>(&self, institution: InstitutionId) -> Result<Vec<R>> {
            self.inner.scan_tenant(institution)
        }
    }

    #[test]
    fn fixture_counts() -> Result<()> {
        let fx = fixture()?;
        let counts = fx.registrar.counts()?;
        let get = |kind| {
            counts
                .iter()
                .find(|(k, _)| *k == kind)
                .map_or(0, |(_, n)| *n)
        };
        assert_eq!(get(RecordKind::Institution), 1);
        assert_eq!(get(RecordKind::User), 3);
        assert_eq!(get(RecordKind::Outcome), 2);
        assert_eq!(get(RecordKind::Assessment), 2);
        Ok(())
    }
}
